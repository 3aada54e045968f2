use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ReducerError, Result};
use crate::subreducer::Subreducer;
use crate::types::{RoutingDecision, WorkflowRequest, WorkflowType};

/// First 16 hex chars of `sha256("{workflow_type}:{instance_id}")`.
///
/// Only used to tag decisions for tracing; it never picks the subreducer.
pub fn routing_hash(workflow_type: WorkflowType, instance_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{instance_id}", workflow_type.value()).as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Running counters for the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterMetrics {
    pub total_routed: u64,
    pub failed_routes: u64,
    pub average_routing_time_ms: f64,
    pub routes_by_type: BTreeMap<WorkflowType, u64>,
}

impl RouterMetrics {
    fn record_success(&mut self, workflow_type: WorkflowType, elapsed_ms: f64) {
        self.total_routed += 1;
        let n = self.total_routed as f64;
        self.average_routing_time_ms += (elapsed_ms - self.average_routing_time_ms) / n;
        *self.routes_by_type.entry(workflow_type).or_insert(0) += 1;
    }
}

/// Maps each workflow type to exactly one registered subreducer name.
pub struct WorkflowRouter {
    routes: HashMap<WorkflowType, String>,
    subreducers: HashMap<String, Arc<dyn Subreducer>>,
    metrics: Mutex<RouterMetrics>,
}

impl Default for WorkflowRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRouter {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            subreducers: HashMap::new(),
            metrics: Mutex::new(RouterMetrics::default()),
        }
    }

    /// Map every type in `workflow_types` to `subreducer`.
    ///
    /// Nothing is changed if any of the types already belongs to a different
    /// subreducer.
    pub fn register_subreducer(
        &mut self,
        subreducer: Arc<dyn Subreducer>,
        workflow_types: &[WorkflowType],
    ) -> Result<()> {
        let name = subreducer.name().to_string();
        if workflow_types.is_empty() {
            return Err(ReducerError::Validation(format!(
                "subreducer '{name}' must be registered for at least one workflow type"
            )));
        }

        for workflow_type in workflow_types {
            if let Some(existing) = self.routes.get(workflow_type) {
                if *existing != name {
                    return Err(ReducerError::DuplicateRegistration {
                        workflow_type: *workflow_type,
                        existing: existing.clone(),
                        requested: name,
                    });
                }
            }
        }

        for workflow_type in workflow_types {
            self.routes.insert(*workflow_type, name.clone());
        }
        tracing::info!(subreducer = %name, types = ?workflow_types, "registered subreducer route");
        self.subreducers.insert(name, subreducer);
        Ok(())
    }

    /// Pick the subreducer for `request`.
    pub fn route(&self, request: &WorkflowRequest) -> Result<RoutingDecision> {
        let start = Instant::now();
        let workflow_type = request.workflow_type();

        let Some(name) = self.routes.get(&workflow_type) else {
            self.lock_metrics().failed_routes += 1;
            return Err(ReducerError::UnsupportedWorkflowType {
                requested: workflow_type,
                supported: self
                    .supported_types()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        };

        let hash = routing_hash(workflow_type, request.instance_id());
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut routing_metadata = Map::new();
        routing_metadata.insert("routing_strategy".into(), Value::from("hash_based"));
        routing_metadata.insert("routed_at".into(), Value::from(Utc::now().to_rfc3339()));
        routing_metadata.insert("routing_time_ms".into(), Value::from(elapsed_ms));

        self.lock_metrics().record_success(workflow_type, elapsed_ms);

        tracing::debug!(
            workflow_id = %request.workflow_id(),
            workflow_type = %workflow_type,
            routing_hash = %hash,
            subreducer = %name,
            "routed workflow"
        );

        Ok(RoutingDecision {
            workflow_id: request.workflow_id(),
            workflow_type,
            instance_id: request.instance_id().to_string(),
            subreducer_name: name.clone(),
            routing_hash: hash,
            routing_metadata,
        })
    }

    pub fn get_subreducer(&self, name: &str) -> Option<Arc<dyn Subreducer>> {
        self.subreducers.get(name).cloned()
    }

    /// Registered types in a stable order.
    pub fn supported_types(&self) -> Vec<WorkflowType> {
        let mut types: Vec<WorkflowType> = self.routes.keys().copied().collect();
        types.sort();
        types
    }

    pub fn metrics(&self) -> RouterMetrics {
        self.lock_metrics().clone()
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, RouterMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
