use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::RouterMetrics;
use crate::types::WorkflowType;

/// Counters and timing for one workflow type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTypeMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active: u64,
    pub average_processing_time_ms: f64,
    pub min_processing_time_ms: Option<f64>,
    pub max_processing_time_ms: Option<f64>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl WorkflowTypeMetrics {
    pub fn completed(&self) -> u64 {
        self.successful + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.successful as f64 / n as f64,
        }
    }

    fn record_completion(&mut self, success: bool, processing_time_ms: f64) {
        self.active = self.active.saturating_sub(1);
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        let n = self.completed() as f64;
        self.average_processing_time_ms += (processing_time_ms - self.average_processing_time_ms) / n;
        self.min_processing_time_ms = Some(
            self.min_processing_time_ms
                .map_or(processing_time_ms, |m| m.min(processing_time_ms)),
        );
        self.max_processing_time_ms = Some(
            self.max_processing_time_ms
                .map_or(processing_time_ms, |m| m.max(processing_time_ms)),
        );
        self.last_processed_at = Some(Utc::now());
    }
}

/// Point-in-time copy of everything the engine counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerMetricsSnapshot {
    pub total_workflows: u64,
    pub successful_workflows: u64,
    pub failed_workflows: u64,
    pub cancelled_workflows: u64,
    pub active_workflows: u64,
    pub success_rate: f64,
    pub average_processing_time_ms: f64,
    pub by_type: BTreeMap<WorkflowType, WorkflowTypeMetrics>,
    pub router: RouterMetrics,
    pub collected_at: DateTime<Utc>,
}

/// Per-type workflow metrics with running averages.
#[derive(Debug, Default)]
pub struct ReducerMetricsCollector {
    by_type: Mutex<BTreeMap<WorkflowType, WorkflowTypeMetrics>>,
}

impl ReducerMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_workflow_start(&self, workflow_type: WorkflowType) {
        let mut by_type = self.lock();
        let metrics = by_type.entry(workflow_type).or_default();
        metrics.total += 1;
        metrics.active += 1;
    }

    pub fn record_workflow_completion(
        &self,
        workflow_type: WorkflowType,
        success: bool,
        processing_time_ms: f64,
    ) {
        self.lock()
            .entry(workflow_type)
            .or_default()
            .record_completion(success, processing_time_ms);
    }

    pub fn record_workflow_cancellation(&self, workflow_type: WorkflowType) {
        let mut by_type = self.lock();
        let metrics = by_type.entry(workflow_type).or_default();
        metrics.active = metrics.active.saturating_sub(1);
        metrics.cancelled += 1;
        metrics.last_processed_at = Some(Utc::now());
    }

    pub fn type_metrics(&self, workflow_type: WorkflowType) -> Option<WorkflowTypeMetrics> {
        self.lock().get(&workflow_type).cloned()
    }

    pub fn snapshot(&self, router: RouterMetrics) -> ReducerMetricsSnapshot {
        let by_type = self.lock().clone();

        let total_workflows = by_type.values().map(|m| m.total).sum();
        let successful_workflows: u64 = by_type.values().map(|m| m.successful).sum();
        let failed_workflows: u64 = by_type.values().map(|m| m.failed).sum();
        let cancelled_workflows = by_type.values().map(|m| m.cancelled).sum();
        let active_workflows = by_type.values().map(|m| m.active).sum();
        let completed = successful_workflows + failed_workflows;

        let (success_rate, average_processing_time_ms) = if completed == 0 {
            (0.0, 0.0)
        } else {
            let weighted: f64 = by_type
                .values()
                .map(|m| m.average_processing_time_ms * m.completed() as f64)
                .sum();
            (
                successful_workflows as f64 / completed as f64,
                weighted / completed as f64,
            )
        };

        ReducerMetricsSnapshot {
            total_workflows,
            successful_workflows,
            failed_workflows,
            cancelled_workflows,
            active_workflows,
            success_rate,
            average_processing_time_ms,
            by_type,
            router,
            collected_at: Utc::now(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<WorkflowType, WorkflowTypeMetrics>> {
        self.by_type
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
