//! Request, routing and response types shared by the router, the registry,
//! the subreducers and the engine.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FailureKind, ReducerError, Result};
use crate::state_machine::WorkflowState;

/// 1-128 chars of `[A-Za-z0-9_-]`, first and last alphanumeric.
static INSTANCE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]{0,126}[A-Za-z0-9])?$")
        .expect("instance id pattern is valid")
});

/// The kinds of workflow the engine knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    DocumentRegeneration,
    DataAnalysis,
    ReportGeneration,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 3] = [
        WorkflowType::DocumentRegeneration,
        WorkflowType::DataAnalysis,
        WorkflowType::ReportGeneration,
    ];

    /// Lowercase value used in routing keys.
    pub fn value(&self) -> &'static str {
        match self {
            WorkflowType::DocumentRegeneration => "document_regeneration",
            WorkflowType::DataAnalysis => "data_analysis",
            WorkflowType::ReportGeneration => "report_generation",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::DocumentRegeneration => write!(f, "DOCUMENT_REGENERATION"),
            WorkflowType::DataAnalysis => write!(f, "DATA_ANALYSIS"),
            WorkflowType::ReportGeneration => write!(f, "REPORT_GENERATION"),
        }
    }
}

/// A validated, immutable unit of work.
///
/// Construct with [`WorkflowRequest::new`] and the `with_*` builders, or
/// deserialize from JSON; both paths run the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowRequest")]
pub struct WorkflowRequest {
    workflow_id: Uuid,
    workflow_type: WorkflowType,
    instance_id: String,
    correlation_id: Uuid,
    payload: Map<String, Value>,
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWorkflowRequest {
    #[serde(default = "Uuid::new_v4")]
    workflow_id: Uuid,
    workflow_type: WorkflowType,
    instance_id: String,
    #[serde(default = "Uuid::new_v4")]
    correlation_id: Uuid,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<RawWorkflowRequest> for WorkflowRequest {
    type Error = ReducerError;

    fn try_from(raw: RawWorkflowRequest) -> Result<Self> {
        validate_instance_id(&raw.instance_id)?;
        Ok(Self {
            workflow_id: raw.workflow_id,
            workflow_type: raw.workflow_type,
            instance_id: raw.instance_id,
            correlation_id: raw.correlation_id,
            payload: raw.payload,
            metadata: raw.metadata,
            created_at: raw.created_at,
        })
    }
}

fn validate_instance_id(instance_id: &str) -> Result<()> {
    if INSTANCE_ID_PATTERN.is_match(instance_id) {
        Ok(())
    } else {
        Err(ReducerError::Validation(format!(
            "instance_id must be 1-128 characters of letters, digits, '-' or '_', \
             starting and ending with a letter or digit (got {} chars)",
            instance_id.chars().count()
        )))
    }
}

fn into_object(value: Value, field: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ReducerError::Validation(format!(
            "{field} must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl WorkflowRequest {
    pub fn new(workflow_type: WorkflowType, instance_id: impl Into<String>) -> Result<Self> {
        let instance_id = instance_id.into();
        validate_instance_id(&instance_id)?;
        Ok(Self {
            workflow_id: Uuid::new_v4(),
            workflow_type,
            instance_id,
            correlation_id: Uuid::new_v4(),
            payload: Map::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        })
    }

    /// Replace the payload. Anything but a JSON object (or null) is rejected.
    pub fn with_payload(mut self, payload: Value) -> Result<Self> {
        self.payload = into_object(payload, "payload")?;
        Ok(self)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Result<Self> {
        self.metadata = into_object(metadata, "metadata")?;
        Ok(self)
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.workflow_type
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Which subreducer a request was routed to, and the trace hash for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub workflow_id: Uuid,
    pub workflow_type: WorkflowType,
    pub instance_id: String,
    pub subreducer_name: String,
    pub routing_hash: String,
    pub routing_metadata: Map<String, Value>,
}

/// Structured error carried by failed results and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ErrorDetail {
    pub fn business(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Business,
            error_type: error_type.into(),
            error_message: message.into(),
            details: Map::new(),
        }
    }

    pub fn system(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::System,
            error_type: error_type.into(),
            error_message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Engine-level errors only expose their message when it is built from our
    /// own fields; foreign errors are reduced to their kind.
    pub fn from_reducer_error(err: &ReducerError) -> Self {
        let message = if err.is_domain_error() {
            err.to_string()
        } else {
            err.kind().to_string()
        };
        Self::system(err.kind(), message)
    }
}

/// What a subreducer hands back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubreducerResult {
    pub workflow_id: Uuid,
    pub subreducer_name: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorDetail>,
    pub processing_time_ms: f64,
}

impl SubreducerResult {
    pub fn success(
        workflow_id: Uuid,
        subreducer_name: impl Into<String>,
        result: Value,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            workflow_id,
            subreducer_name: subreducer_name.into(),
            success: true,
            result: Some(result),
            error: None,
            processing_time_ms,
        }
    }

    pub fn failure(
        workflow_id: Uuid,
        subreducer_name: impl Into<String>,
        error: ErrorDetail,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            workflow_id,
            subreducer_name: subreducer_name.into(),
            success: false,
            result: None,
            error: Some(error),
            processing_time_ms,
        }
    }
}

/// User-facing workflow status. Mirrors [`WorkflowState`] without `Retrying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// `None` for `Retrying`, which is never reported to callers.
    pub fn from_state(state: WorkflowState) -> Option<Self> {
        match state {
            WorkflowState::Pending => Some(WorkflowStatus::Pending),
            WorkflowState::Processing => Some(WorkflowStatus::Processing),
            WorkflowState::Completed => Some(WorkflowStatus::Completed),
            WorkflowState::Failed => Some(WorkflowStatus::Failed),
            WorkflowState::Cancelled => Some(WorkflowStatus::Cancelled),
            WorkflowState::Retrying => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "PENDING"),
            WorkflowStatus::Processing => write!(f, "PROCESSING"),
            WorkflowStatus::Completed => write!(f, "COMPLETED"),
            WorkflowStatus::Failed => write!(f, "FAILED"),
            WorkflowStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Terminal result of `process_workflow`. Failure is encoded in `status` and
/// `error`, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub workflow_id: Uuid,
    pub workflow_type: WorkflowType,
    pub instance_id: String,
    pub correlation_id: Uuid,
    pub status: WorkflowStatus,
    pub result: Option<Value>,
    pub error: Option<ErrorDetail>,
    pub processing_time_ms: f64,
    pub subreducer_name: Option<String>,
}

impl WorkflowResponse {
    pub(crate) fn for_request(request: &WorkflowRequest, status: WorkflowStatus) -> Self {
        Self {
            workflow_id: request.workflow_id(),
            workflow_type: request.workflow_type(),
            instance_id: request.instance_id().to_string(),
            correlation_id: request.correlation_id(),
            status,
            result: None,
            error: None,
            processing_time_ms: 0.0,
            subreducer_name: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_valid_instance_ids() {
        for id in ["a", "abc-123", "A_b-C", "x9", &"a".repeat(128)] {
            assert!(
                WorkflowRequest::new(WorkflowType::DataAnalysis, id).is_ok(),
                "{id} should be valid"
            );
        }
    }

    #[test]
    fn rejects_invalid_instance_ids() {
        for id in ["", "-abc", "abc_", "has space", "dot.ted", &"a".repeat(129)] {
            let err = WorkflowRequest::new(WorkflowType::DataAnalysis, id).unwrap_err();
            assert!(matches!(err, ReducerError::Validation(_)), "{id:?}");
        }
    }

    #[test]
    fn payload_must_be_object() {
        let req = WorkflowRequest::new(WorkflowType::DataAnalysis, "abc").unwrap();
        assert!(req.clone().with_payload(json!([1, 2, 3])).is_err());
        let req = req.with_payload(json!({"data": [1, 2]})).unwrap();
        assert_eq!(req.payload()["data"], json!([1, 2]));
    }

    #[test]
    fn deserialize_fills_defaults_and_validates() {
        let req: WorkflowRequest = serde_json::from_value(json!({
            "workflow_type": "REPORT_GENERATION",
            "instance_id": "weekly-report",
            "payload": {"title": "Weekly"}
        }))
        .unwrap();
        assert_eq!(req.workflow_type(), WorkflowType::ReportGeneration);
        assert_eq!(req.instance_id(), "weekly-report");
        assert!(req.metadata().is_empty());

        let bad = serde_json::from_value::<WorkflowRequest>(json!({
            "workflow_type": "REPORT_GENERATION",
            "instance_id": "_bad"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn workflow_type_display_and_value() {
        assert_eq!(WorkflowType::DataAnalysis.to_string(), "DATA_ANALYSIS");
        assert_eq!(WorkflowType::DataAnalysis.value(), "data_analysis");
        assert_eq!(
            serde_json::to_value(WorkflowType::DocumentRegeneration).unwrap(),
            json!("DOCUMENT_REGENERATION")
        );
    }

    #[test]
    fn status_has_no_retrying() {
        assert_eq!(WorkflowStatus::from_state(WorkflowState::Retrying), None);
        assert_eq!(
            WorkflowStatus::from_state(WorkflowState::Failed),
            Some(WorkflowStatus::Failed)
        );
    }

    #[test]
    fn foreign_errors_are_reduced_to_kind() {
        let json: ReducerError = serde_json::from_str::<u32>("\"card 4111\"").unwrap_err().into();
        let detail = ErrorDetail::from_reducer_error(&json);
        assert_eq!(detail.error_type, "Json");
        assert_eq!(detail.error_message, "Json");
        assert_eq!(detail.kind, FailureKind::System);
    }
}
