use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::state::{StateTransitionValidator, WorkflowState};
use crate::error::Result;
use crate::types::{WorkflowRequest, WorkflowType};

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCategory {
    Normal,
    Error,
    Retry,
    Cancellation,
}

/// One entry of the append-only transition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: WorkflowState,
    pub to_state: WorkflowState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub category: TransitionCategory,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowIdentity {
    pub workflow_id: Uuid,
    pub workflow_type: WorkflowType,
    pub instance_id: String,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTiming {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`, set when an attempt ends.
    pub processing_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub has_error: bool,
    pub error_message: Option<String>,
    pub error_details: Map<String, Value>,
    pub error_count: u32,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Mutable state of one workflow for the duration of its processing.
///
/// Every move goes through [`WorkflowStateModel::transition_to`], which checks
/// the adjacency table first; the transition history is only ever appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateModel {
    identity: WorkflowIdentity,
    current_state: WorkflowState,
    previous_state: Option<WorkflowState>,
    timing: WorkflowTiming,
    retry_count: u32,
    max_retries: u32,
    error_info: ErrorInfo,
    transition_history: Vec<StateTransition>,
}

impl WorkflowStateModel {
    pub fn new(identity: WorkflowIdentity, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            identity,
            current_state: WorkflowState::Pending,
            previous_state: None,
            timing: WorkflowTiming {
                created_at: now,
                updated_at: now,
                started_at: None,
                completed_at: None,
                processing_time_ms: None,
            },
            retry_count: 0,
            max_retries,
            error_info: ErrorInfo::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn from_request(request: &WorkflowRequest, max_retries: u32) -> Self {
        Self::new(
            WorkflowIdentity {
                workflow_id: request.workflow_id(),
                workflow_type: request.workflow_type(),
                instance_id: request.instance_id().to_string(),
                correlation_id: request.correlation_id(),
            },
            max_retries,
        )
    }

    pub fn identity(&self) -> &WorkflowIdentity {
        &self.identity
    }

    pub fn current_state(&self) -> WorkflowState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<WorkflowState> {
        self.previous_state
    }

    pub fn timing(&self) -> &WorkflowTiming {
        &self.timing
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn error_info(&self) -> &ErrorInfo {
        &self.error_info
    }

    pub fn transition_history(&self) -> &[StateTransition] {
        &self.transition_history
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Move to `new_state` if the table allows it.
    pub fn transition_to(
        &mut self,
        new_state: WorkflowState,
        reason: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let category = match new_state {
            WorkflowState::Retrying => TransitionCategory::Retry,
            WorkflowState::Cancelled => TransitionCategory::Cancellation,
            _ => TransitionCategory::Normal,
        };
        self.apply(new_state, reason.into(), category, metadata)
    }

    fn apply(
        &mut self,
        new_state: WorkflowState,
        reason: String,
        category: TransitionCategory,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        StateTransitionValidator::validate(self.current_state, new_state)?;

        let now = Utc::now();
        self.transition_history.push(StateTransition {
            from_state: self.current_state,
            to_state: new_state,
            timestamp: now,
            reason,
            category,
            metadata,
        });
        self.previous_state = Some(self.current_state);
        self.current_state = new_state;
        self.timing.updated_at = now;

        match new_state {
            WorkflowState::Processing => {
                self.timing.started_at = Some(now);
                self.timing.completed_at = None;
                self.timing.processing_time_ms = None;
            }
            WorkflowState::Retrying => self.retry_count += 1,
            _ => {}
        }

        if new_state.ends_attempt() {
            self.timing.completed_at = Some(now);
            self.timing.processing_time_ms = self
                .timing
                .started_at
                .map(|started| elapsed_ms(started, now));
        }

        Ok(())
    }

    /// True only while FAILED with retries left.
    pub fn can_retry(&self) -> bool {
        self.current_state == WorkflowState::Failed && self.retry_count < self.max_retries
    }

    /// Record an error and, unless already FAILED, move to FAILED.
    ///
    /// The error is recorded even when the move itself is not allowed from the
    /// current state; that case returns the transition error.
    pub fn set_error(&mut self, message: impl Into<String>, details: Map<String, Value>) -> Result<()> {
        let message = message.into();
        let now = Utc::now();
        self.error_info.has_error = true;
        self.error_info.error_message = Some(message.clone());
        self.error_info.error_details = details;
        self.error_info.error_count += 1;
        self.error_info.last_error_at = Some(now);
        self.timing.updated_at = now;

        if self.current_state == WorkflowState::Failed {
            return Ok(());
        }
        self.apply(
            WorkflowState::Failed,
            message,
            TransitionCategory::Error,
            Map::new(),
        )
    }

    pub fn summary(&self) -> WorkflowStateSummary {
        WorkflowStateSummary::from_state(self)
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Flat audit view of a workflow, produced for logs and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStateSummary {
    pub workflow_id: Uuid,
    pub workflow_type: WorkflowType,
    pub instance_id: String,
    pub current_state: WorkflowState,
    pub state_path: Vec<WorkflowState>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<f64>,
}

impl WorkflowStateSummary {
    pub fn from_state(state: &WorkflowStateModel) -> Self {
        let mut path: Vec<WorkflowState> = state
            .transition_history
            .iter()
            .map(|t| t.from_state)
            .collect();
        path.push(state.current_state);

        Self {
            workflow_id: state.identity.workflow_id,
            workflow_type: state.identity.workflow_type,
            instance_id: state.identity.instance_id.clone(),
            current_state: state.current_state,
            state_path: path,
            retry_count: state.retry_count,
            max_retries: state.max_retries,
            has_error: state.error_info.has_error,
            error_message: state.error_info.error_message.clone(),
            created_at: state.timing.created_at,
            completed_at: state.timing.completed_at,
            processing_time_ms: state.timing.processing_time_ms,
        }
    }
}
