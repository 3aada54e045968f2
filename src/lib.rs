//! Reducer pattern engine: routes typed workflow requests to subreducers,
//! tracks each workflow through a validated state machine and collects
//! metrics along the way.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod state_machine;
pub mod subreducer;
pub mod support;
pub mod types;

pub use config::ReducerConfig;
pub use engine::{CancellationHook, NoCancellation, ReducerPatternEngine};
pub use error::{FailureKind, ReducerError, Result};
pub use metrics::{ReducerMetricsCollector, ReducerMetricsSnapshot, WorkflowTypeMetrics};
pub use registry::SubreducerRegistry;
pub use router::{RouterMetrics, WorkflowRouter};
pub use state_machine::{StateTransitionValidator, WorkflowState, WorkflowStateModel};
pub use subreducer::{Subreducer, SubreducerFactory};
pub use types::{
    ErrorDetail, RoutingDecision, SubreducerResult, WorkflowRequest, WorkflowResponse,
    WorkflowStatus, WorkflowType,
};
