use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ReducerConfig;
use crate::error::{ReducerError, Result};
use crate::metrics::{ReducerMetricsCollector, ReducerMetricsSnapshot};
use crate::registry::SubreducerRegistry;
use crate::router::WorkflowRouter;
use crate::state_machine::{WorkflowState, WorkflowStateModel};
use crate::subreducer::{
    DataAnalysisSubreducer, DocumentRegenerationSubreducer, ReportGenerationSubreducer,
    SubreducerFactory, elapsed_ms, factory,
};
use crate::types::{
    ErrorDetail, RoutingDecision, WorkflowRequest, WorkflowResponse, WorkflowStatus, WorkflowType,
};

/// Decides whether a routed workflow should be cancelled before dispatch.
///
/// Nothing in the engine cancels on its own; this is the only way in.
pub trait CancellationHook: Send + Sync {
    /// Return a reason to cancel, or `None` to let the workflow run.
    fn should_cancel(
        &self,
        _state: &WorkflowStateModel,
        _decision: &RoutingDecision,
    ) -> Option<String> {
        None
    }
}

/// Never cancels.
pub struct NoCancellation;

impl CancellationHook for NoCancellation {}

/// Drives each request through routing, dispatch and the state machine.
///
/// `process_workflow` always returns a response; failures are reported in
/// its `status` and `error`.
pub struct ReducerPatternEngine {
    router: WorkflowRouter,
    registry: SubreducerRegistry,
    metrics: ReducerMetricsCollector,
    /// Every workflow seen, kept after completion for audit lookups.
    workflow_states: DashMap<String, WorkflowStateModel>,
    /// In-flight workflows and when they started.
    active_workflows: DashMap<String, DateTime<Utc>>,
    max_retries: u32,
    cancellation: Arc<dyn CancellationHook>,
}

impl Default for ReducerPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReducerPatternEngine {
    pub fn new() -> Self {
        Self {
            router: WorkflowRouter::new(),
            registry: SubreducerRegistry::new(),
            metrics: ReducerMetricsCollector::new(),
            workflow_states: DashMap::new(),
            active_workflows: DashMap::new(),
            max_retries: 3,
            cancellation: Arc::new(NoCancellation),
        }
    }

    /// Engine with the built-in subreducers for every enabled workflow type.
    pub fn with_defaults(config: &ReducerConfig) -> Result<Self> {
        config.validate()?;
        let mut engine = Self::new().with_max_retries(config.max_retries);

        if config.is_enabled(WorkflowType::DocumentRegeneration) {
            engine.register_subreducer(
                factory(DocumentRegenerationSubreducer::default),
                &[WorkflowType::DocumentRegeneration],
            )?;
        }
        if config.is_enabled(WorkflowType::DataAnalysis) {
            let precision = config.data_analysis.precision;
            engine.register_subreducer(
                factory(move || DataAnalysisSubreducer::with_precision(precision)),
                &[WorkflowType::DataAnalysis],
            )?;
        }
        if config.is_enabled(WorkflowType::ReportGeneration) {
            let format = config.report.default_format.clone();
            engine.register_subreducer(
                factory(move || ReportGenerationSubreducer::with_default_format(format.clone())),
                &[WorkflowType::ReportGeneration],
            )?;
        }

        Ok(engine)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cancellation_hook(mut self, hook: Arc<dyn CancellationHook>) -> Self {
        self.cancellation = hook;
        self
    }

    /// Register a subreducer with both the router and the registry.
    ///
    /// The factory's probe instance must support every listed type; nothing is
    /// registered otherwise.
    pub fn register_subreducer(
        &mut self,
        factory: SubreducerFactory,
        workflow_types: &[WorkflowType],
    ) -> Result<()> {
        let probe = factory();
        if let Some(unsupported) = workflow_types
            .iter()
            .find(|t| !probe.supports_workflow_type(**t))
        {
            return Err(ReducerError::InvalidSubreducer {
                name: probe.name().to_string(),
                workflow_type: *unsupported,
            });
        }

        self.router.register_subreducer(probe, workflow_types)?;
        let mut metadata = Map::new();
        metadata.insert("registered_at".into(), Value::from(Utc::now().to_rfc3339()));
        for workflow_type in workflow_types {
            self.registry
                .register_subreducer(*workflow_type, Arc::clone(&factory), metadata.clone())?;
        }
        Ok(())
    }

    /// Process one workflow end to end.
    pub async fn process_workflow(&self, request: WorkflowRequest) -> WorkflowResponse {
        let started = Instant::now();
        let key = request.workflow_id().to_string();
        let workflow_type = request.workflow_type();

        // An id already seen keeps its audit trail; the new request is refused.
        let fresh = match self.workflow_states.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(WorkflowStateModel::from_request(&request, self.max_retries));
                true
            }
        };
        if !fresh {
            let err = ReducerError::DuplicateWorkflow(request.workflow_id());
            tracing::warn!(workflow_id = %key, "workflow id already in use");
            let mut response = WorkflowResponse::for_request(&request, WorkflowStatus::Failed);
            response.processing_time_ms = elapsed_ms(started);
            response.error = Some(ErrorDetail::from_reducer_error(&err));
            return response;
        }

        self.active_workflows.insert(key.clone(), Utc::now());
        self.metrics.record_workflow_start(workflow_type);
        tracing::info!(
            workflow_id = %key,
            workflow_type = %workflow_type,
            instance_id = %request.instance_id(),
            "workflow started"
        );

        let outcome = AssertUnwindSafe(self.execute(&key, &request, started))
            .catch_unwind()
            .await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                self.fail_workflow(&key, &request, ErrorDetail::from_reducer_error(&err), started)
            }
            Err(_) => self.fail_workflow(
                &key,
                &request,
                ErrorDetail::system("Panic", "subreducer panicked"),
                started,
            ),
        };

        self.active_workflows.remove(&key);
        tracing::info!(
            workflow_id = %key,
            status = %response.status,
            processing_time_ms = response.processing_time_ms,
            "workflow finished"
        );
        response
    }

    /// Parse a request from JSON and process it.
    ///
    /// Only an invalid request is returned as `Err`; everything after parsing
    /// is reported through the response.
    pub async fn reduce(&self, input: Value) -> Result<WorkflowResponse> {
        let request: WorkflowRequest = serde_json::from_value(input)?;
        Ok(self.process_workflow(request).await)
    }

    async fn execute(
        &self,
        key: &str,
        request: &WorkflowRequest,
        started: Instant,
    ) -> Result<WorkflowResponse> {
        let workflow_type = request.workflow_type();
        self.with_state(key, |s| {
            s.transition_to(WorkflowState::Processing, "processing started", Map::new())
        })?;

        let decision = self.router.route(request)?;

        // No map guard is held while the hook runs.
        let snapshot = self.with_state(key, |s| Ok(s.clone()))?;
        let cancel_reason = self.cancellation.should_cancel(&snapshot, &decision);
        if let Some(reason) = cancel_reason {
            return self.cancel_workflow(key, request, &decision, reason, started);
        }

        let subreducer = self
            .registry
            .get_subreducer_instance(workflow_type)
            .ok_or(ReducerError::SubreducerNotFound(workflow_type))?;

        let result = subreducer.process(request).await;
        let elapsed = elapsed_ms(started);

        let mut response = WorkflowResponse::for_request(request, WorkflowStatus::Completed);
        response.subreducer_name = Some(result.subreducer_name.clone());
        response.processing_time_ms = elapsed;

        if result.success {
            self.with_state(key, |s| {
                s.transition_to(WorkflowState::Completed, "subreducer succeeded", Map::new())
            })?;
            self.metrics
                .record_workflow_completion(workflow_type, true, elapsed);
            response.result = result.result;
        } else {
            let error = result.error.unwrap_or_else(|| {
                ErrorDetail::system(
                    "SubreducerFailure",
                    "subreducer reported failure without details",
                )
            });
            self.with_state(key, |s| {
                s.set_error(error.error_message.clone(), error.details.clone())
            })?;
            self.metrics
                .record_workflow_completion(workflow_type, false, elapsed);
            tracing::warn!(
                workflow_id = %key,
                error_type = %error.error_type,
                "subreducer reported failure"
            );
            response.status = WorkflowStatus::Failed;
            response.error = Some(error);
        }

        Ok(response)
    }

    fn cancel_workflow(
        &self,
        key: &str,
        request: &WorkflowRequest,
        decision: &RoutingDecision,
        reason: String,
        started: Instant,
    ) -> Result<WorkflowResponse> {
        self.with_state(key, |s| {
            s.transition_to(WorkflowState::Cancelled, reason.clone(), Map::new())
        })?;
        self.metrics
            .record_workflow_cancellation(request.workflow_type());
        tracing::info!(workflow_id = %key, reason = %reason, "workflow cancelled");

        let mut response = WorkflowResponse::for_request(request, WorkflowStatus::Cancelled);
        response.subreducer_name = Some(decision.subreducer_name.clone());
        response.processing_time_ms = elapsed_ms(started);
        response.error = Some(ErrorDetail::system("Cancelled", reason));
        Ok(response)
    }

    /// Record `error` on the workflow's state and build the FAILED response.
    fn fail_workflow(
        &self,
        key: &str,
        request: &WorkflowRequest,
        error: ErrorDetail,
        started: Instant,
    ) -> WorkflowResponse {
        let elapsed = elapsed_ms(started);
        let mut details = error.details.clone();
        details.insert("error_type".into(), Value::from(error.error_type.clone()));

        if let Some(mut state) = self.workflow_states.get_mut(key) {
            if let Err(e) = state.set_error(error.error_message.clone(), details) {
                tracing::warn!(workflow_id = %key, error = %e, "could not move workflow to FAILED");
            }
        }
        self.metrics
            .record_workflow_completion(request.workflow_type(), false, elapsed);
        tracing::error!(workflow_id = %key, error_type = %error.error_type, "workflow failed");

        let mut response = WorkflowResponse::for_request(request, WorkflowStatus::Failed);
        response.processing_time_ms = elapsed;
        response.subreducer_name = self
            .registry
            .subreducer_name(request.workflow_type())
            .map(str::to_string);
        response.error = Some(error);
        response
    }

    fn with_state<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut WorkflowStateModel) -> Result<T>,
    ) -> Result<T> {
        let mut state = self
            .workflow_states
            .get_mut(key)
            .ok_or_else(|| ReducerError::Validation(format!("unknown workflow {key}")))?;
        f(state.value_mut())
    }

    /// State of any workflow this engine has seen, finished or not.
    pub fn get_workflow_state(&self, workflow_id: Uuid) -> Option<WorkflowStateModel> {
        self.workflow_states
            .get(&workflow_id.to_string())
            .map(|s| s.value().clone())
    }

    pub fn is_active(&self, workflow_id: Uuid) -> bool {
        self.active_workflows.contains_key(&workflow_id.to_string())
    }

    pub fn active_workflow_count(&self) -> usize {
        self.active_workflows.len()
    }

    pub fn metrics(&self) -> ReducerMetricsSnapshot {
        self.metrics.snapshot(self.router.metrics())
    }

    pub fn health_check(&self) -> BTreeMap<WorkflowType, bool> {
        self.registry.health_check_subreducers()
    }

    pub fn router(&self) -> &WorkflowRouter {
        &self.router
    }

    pub fn registry(&self) -> &SubreducerRegistry {
        &self.registry
    }
}
