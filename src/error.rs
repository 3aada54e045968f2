use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::WorkflowState;
use crate::types::WorkflowType;

pub type Result<T> = std::result::Result<T, ReducerError>;

#[derive(Debug, Error)]
pub enum ReducerError {
    #[error("Unsupported workflow type {requested}; supported types: [{}]", .supported.join(", "))]
    UnsupportedWorkflowType {
        requested: WorkflowType,
        supported: Vec<String>,
    },

    #[error(
        "Workflow type {workflow_type} is already mapped to subreducer '{existing}', cannot register '{requested}'"
    )]
    DuplicateRegistration {
        workflow_type: WorkflowType,
        existing: String,
        requested: String,
    },

    #[error("Subreducer '{name}' does not support workflow type {workflow_type}")]
    InvalidSubreducer {
        name: String,
        workflow_type: WorkflowType,
    },

    #[error("No subreducer registered for workflow type {0}")]
    SubreducerNotFound(WorkflowType),

    #[error("Workflow {0} has already been submitted to this engine")]
    DuplicateWorkflow(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReducerError {
    /// Stable variant name, safe to hand back to callers in place of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ReducerError::UnsupportedWorkflowType { .. } => "UnsupportedWorkflowType",
            ReducerError::DuplicateRegistration { .. } => "DuplicateRegistration",
            ReducerError::InvalidSubreducer { .. } => "InvalidSubreducer",
            ReducerError::SubreducerNotFound(_) => "SubreducerNotFound",
            ReducerError::DuplicateWorkflow(_) => "DuplicateWorkflow",
            ReducerError::InvalidTransition { .. } => "InvalidTransition",
            ReducerError::Validation(_) => "Validation",
            ReducerError::Config(_) => "Config",
            ReducerError::Json(_) => "Json",
        }
    }

    /// Errors built from our own fields (types, states, names) carry no request
    /// data and can be shown verbatim. Wrapped foreign errors cannot.
    pub fn is_domain_error(&self) -> bool {
        !matches!(self, ReducerError::Json(_))
    }
}

/// Classifies a subreducer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The payload was unusable (missing field, non-numeric data).
    Business,
    /// Something outside the payload broke (panic, missing dependency).
    System,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
