use uuid::Uuid;

use crate::types::ProcessState;

/// Errors surfaced to callers of the dispatcher and state machine.
///
/// Malformed or failed collaborator responses never appear here; the decision
/// rules absorb them as branches.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process instance {0} not found")]
    InstanceNotFound(Uuid),

    #[error("Correction task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Instance {instance_id} rejected {trigger}: state {state}, waiting on {pending}")]
    CorrelationMismatch {
        instance_id: Uuid,
        state: ProcessState,
        trigger: String,
        pending: String,
    },

    #[error("Task {task_id}: '{user}' cannot {operation} while {phase}")]
    TaskLifecycle {
        task_id: Uuid,
        operation: &'static str,
        user: String,
        phase: String,
    },

    #[error("Unknown process id '{0}'")]
    UnknownProcess(String),

    #[error("Invalid process variables: {0}")]
    InvalidVariables(String),

    #[error("Transition {from} -> {to} is not part of the process topology")]
    IllegalTransition { from: ProcessState, to: ProcessState },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ProcessError {
    /// True for errors that leave the instance untouched because the trigger
    /// did not match what the instance was waiting on.
    pub fn is_correlation_mismatch(&self) -> bool {
        matches!(self, Self::CorrelationMismatch { .. })
    }
}
