use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReducerError, Result};

/// The six states of a workflow.
///
/// PENDING → PROCESSING → COMPLETED / FAILED / CANCELLED, with RETRYING as a
/// loop back from FAILED to PROCESSING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::Pending,
        WorkflowState::Processing,
        WorkflowState::Completed,
        WorkflowState::Failed,
        WorkflowState::Cancelled,
        WorkflowState::Retrying,
    ];

    /// No outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Cancelled)
    }

    /// Entering this state closes the current processing attempt.
    pub fn ends_attempt(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Pending => write!(f, "PENDING"),
            WorkflowState::Processing => write!(f, "PROCESSING"),
            WorkflowState::Completed => write!(f, "COMPLETED"),
            WorkflowState::Failed => write!(f, "FAILED"),
            WorkflowState::Cancelled => write!(f, "CANCELLED"),
            WorkflowState::Retrying => write!(f, "RETRYING"),
        }
    }
}

/// Checks moves against the fixed adjacency table.
pub struct StateTransitionValidator;

impl StateTransitionValidator {
    /// States reachable in one step from `from`.
    pub fn allowed_targets(from: WorkflowState) -> &'static [WorkflowState] {
        use WorkflowState::*;
        match from {
            Pending => &[Processing, Cancelled],
            Processing => &[Completed, Failed, Cancelled],
            Failed => &[Retrying, Cancelled],
            Retrying => &[Processing, Failed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn is_valid(from: WorkflowState, to: WorkflowState) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    pub fn validate(from: WorkflowState, to: WorkflowState) -> Result<()> {
        if Self::is_valid(from, to) {
            Ok(())
        } else {
            Err(ReducerError::InvalidTransition { from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_ten_edges() {
        let edges: usize = WorkflowState::ALL
            .iter()
            .map(|s| StateTransitionValidator::allowed_targets(*s).len())
            .sum();
        assert_eq!(edges, 10);
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for state in WorkflowState::ALL {
            assert_eq!(
                state.is_terminal(),
                StateTransitionValidator::allowed_targets(state).is_empty(),
                "{state}"
            );
        }
    }

    #[test]
    fn rejects_edges_outside_table() {
        use WorkflowState::*;
        assert!(StateTransitionValidator::validate(Pending, Processing).is_ok());
        assert!(StateTransitionValidator::validate(Retrying, Processing).is_ok());

        let err = StateTransitionValidator::validate(Pending, Completed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition from PENDING to COMPLETED"
        );
        assert!(StateTransitionValidator::validate(Completed, Processing).is_err());
        assert!(StateTransitionValidator::validate(Processing, Processing).is_err());
        assert!(StateTransitionValidator::validate(Failed, Processing).is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(WorkflowState::Pending.to_string(), "PENDING");
        assert_eq!(WorkflowState::Retrying.to_string(), "RETRYING");
        assert_eq!(WorkflowState::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn failed_ends_attempt_but_is_not_terminal() {
        assert!(WorkflowState::Failed.ends_attempt());
        assert!(!WorkflowState::Failed.is_terminal());
        assert!(!WorkflowState::Retrying.ends_attempt());
    }
}
