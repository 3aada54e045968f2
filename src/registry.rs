//! Lifecycle of subreducer instances: construction, caching and health.
//!
//! Routing decides *which* subreducer name handles a type; the registry owns
//! *how* the instance for a type is built and kept.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::error::{ReducerError, Result};
use crate::subreducer::{Subreducer, SubreducerFactory};
use crate::types::WorkflowType;

struct Registration {
    factory: SubreducerFactory,
    name: String,
    metadata: Map<String, Value>,
}

/// One instance per workflow type, built lazily from its factory.
pub struct SubreducerRegistry {
    registrations: HashMap<WorkflowType, Registration>,
    instances: Mutex<HashMap<WorkflowType, Arc<dyn Subreducer>>>,
}

impl Default for SubreducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubreducerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Register `factory` for `workflow_type`.
    ///
    /// A probe instance is built and must report that it supports the type.
    /// Replacing an existing registration drops its cached instance.
    pub fn register_subreducer(
        &mut self,
        workflow_type: WorkflowType,
        factory: SubreducerFactory,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let probe = factory();
        let name = probe.name().to_string();
        if !probe.supports_workflow_type(workflow_type) {
            return Err(ReducerError::InvalidSubreducer {
                name,
                workflow_type,
            });
        }

        tracing::debug!(subreducer = %name, workflow_type = %workflow_type, "registered subreducer factory");
        self.lock_instances().remove(&workflow_type);
        self.registrations.insert(
            workflow_type,
            Registration {
                factory,
                name,
                metadata,
            },
        );
        Ok(())
    }

    /// Cached instance for `workflow_type`, built on first use.
    pub fn get_subreducer_instance(&self, workflow_type: WorkflowType) -> Option<Arc<dyn Subreducer>> {
        let registration = self.registrations.get(&workflow_type)?;
        let mut instances = self.lock_instances();
        let instance = instances
            .entry(workflow_type)
            .or_insert_with(|| (registration.factory)());
        Some(Arc::clone(instance))
    }

    pub fn is_registered(&self, workflow_type: WorkflowType) -> bool {
        self.registrations.contains_key(&workflow_type)
    }

    pub fn registered_types(&self) -> Vec<WorkflowType> {
        let mut types: Vec<WorkflowType> = self.registrations.keys().copied().collect();
        types.sort();
        types
    }

    pub fn subreducer_name(&self, workflow_type: WorkflowType) -> Option<&str> {
        self.registrations
            .get(&workflow_type)
            .map(|r| r.name.as_str())
    }

    pub fn metadata(&self, workflow_type: WorkflowType) -> Option<&Map<String, Value>> {
        self.registrations.get(&workflow_type).map(|r| &r.metadata)
    }

    /// Whether each registered type's instance still supports its type.
    ///
    /// Advisory only: unhealthy entries stay registered.
    pub fn health_check_subreducers(&self) -> BTreeMap<WorkflowType, bool> {
        self.registered_types()
            .into_iter()
            .map(|workflow_type| {
                let healthy = self
                    .get_subreducer_instance(workflow_type)
                    .is_some_and(|s| s.supports_workflow_type(workflow_type));
                if !healthy {
                    tracing::warn!(workflow_type = %workflow_type, "subreducer failed health check");
                }
                (workflow_type, healthy)
            })
            .collect()
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<WorkflowType, Arc<dyn Subreducer>>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::subreducer::{DataAnalysisSubreducer, ReportGenerationSubreducer, factory};
    use crate::types::{SubreducerResult, WorkflowRequest};

    #[test]
    fn rejects_factory_for_unsupported_type() {
        let mut registry = SubreducerRegistry::new();
        let err = registry
            .register_subreducer(
                WorkflowType::ReportGeneration,
                factory(DataAnalysisSubreducer::default),
                Map::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ReducerError::InvalidSubreducer { .. }));
        assert!(!registry.is_registered(WorkflowType::ReportGeneration));
    }

    #[test]
    fn unregistered_type_has_no_instance() {
        let registry = SubreducerRegistry::new();
        assert!(registry.get_subreducer_instance(WorkflowType::DataAnalysis).is_none());
    }

    #[test]
    fn instance_is_built_once_and_cached() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let mut registry = SubreducerRegistry::new();
        registry
            .register_subreducer(
                WorkflowType::DataAnalysis,
                factory(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    DataAnalysisSubreducer::default()
                }),
                Map::new(),
            )
            .unwrap();
        // One probe build at registration.
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let a = registry.get_subreducer_instance(WorkflowType::DataAnalysis).unwrap();
        let b = registry.get_subreducer_instance(WorkflowType::DataAnalysis).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(registry.subreducer_name(WorkflowType::DataAnalysis), Some("data_analysis"));
    }

    #[test]
    fn metadata_is_kept() {
        let mut registry = SubreducerRegistry::new();
        let mut metadata = Map::new();
        metadata.insert("version".into(), "1.0.0".into());
        registry
            .register_subreducer(
                WorkflowType::ReportGeneration,
                factory(ReportGenerationSubreducer::default),
                metadata,
            )
            .unwrap();
        assert_eq!(
            registry.metadata(WorkflowType::ReportGeneration).unwrap()["version"],
            "1.0.0"
        );
    }

    /// Supports DATA_ANALYSIS until `broken` flips.
    struct Flaky {
        broken: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Subreducer for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn supports_workflow_type(&self, workflow_type: WorkflowType) -> bool {
            workflow_type == WorkflowType::DataAnalysis && !self.broken.load(Ordering::SeqCst)
        }
        async fn process(&self, request: &WorkflowRequest) -> SubreducerResult {
            SubreducerResult::success(request.workflow_id(), "flaky", Value::Null, 0.0)
        }
    }

    #[test]
    fn health_check_is_idempotent_and_advisory() {
        let broken = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&broken);
        let mut registry = SubreducerRegistry::new();
        registry
            .register_subreducer(
                WorkflowType::DataAnalysis,
                factory(move || Flaky {
                    broken: Arc::clone(&flag),
                }),
                Map::new(),
            )
            .unwrap();
        registry
            .register_subreducer(
                WorkflowType::ReportGeneration,
                factory(ReportGenerationSubreducer::default),
                Map::new(),
            )
            .unwrap();

        let first = registry.health_check_subreducers();
        let second = registry.health_check_subreducers();
        assert_eq!(first, second);
        assert!(first.values().all(|healthy| *healthy));

        broken.store(true, Ordering::SeqCst);
        let after = registry.health_check_subreducers();
        assert_eq!(after[&WorkflowType::DataAnalysis], false);
        assert_eq!(after[&WorkflowType::ReportGeneration], true);
        assert!(registry.is_registered(WorkflowType::DataAnalysis));
    }
}
