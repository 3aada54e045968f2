mod state;
mod workflow;

pub use state::{StateTransitionValidator, WorkflowState};
pub use workflow::{
    ErrorInfo, StateTransition, TransitionCategory, WorkflowIdentity, WorkflowStateModel,
    WorkflowStateSummary, WorkflowTiming,
};
