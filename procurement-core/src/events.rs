use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::human_task::HumanTask;
use crate::types::*;

/// Serializable description of a pending action for the event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionDesc {
    Call {
        url: String,
        method: HttpMethod,
        body: String,
    },
    HumanCorrection {
        task_id: TaskId,
    },
    AwaitSignal {
        name: String,
    },
}

impl From<&ActionKind> for ActionDesc {
    fn from(kind: &ActionKind) -> Self {
        match kind {
            ActionKind::Call(call) => ActionDesc::Call {
                url: call.url.clone(),
                method: call.method,
                body: call.body.clone(),
            },
            ActionKind::HumanCorrection(task) => ActionDesc::HumanCorrection {
                task_id: task.task_id,
            },
            ActionKind::AwaitSignal { name } => ActionDesc::AwaitSignal { name: name.clone() },
        }
    }
}

/// Audit trail of every process instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    InstanceStarted {
        process_id: String,
        variables: ProcessVariables,
    },
    ActionEmitted {
        seq: ActionSeq,
        state: ProcessState,
        action: ActionDesc,
    },
    CallCompleted {
        seq: ActionSeq,
        response_kind: String,
    },
    DecisionTaken {
        rule: String,
        from: ProcessState,
        to: ProcessState,
        reason: String,
    },
    TaskClaimed {
        task_id: TaskId,
        user: String,
    },
    TaskStarted {
        task_id: TaskId,
        user: String,
    },
    TaskReleased {
        task_id: TaskId,
        user: String,
    },
    /// The task in its final `Completed` phase.
    TaskCompleted {
        task: HumanTask,
    },
    SignalReceived {
        name: String,
    },
    /// A trigger that did not match the pending action. Instance unchanged.
    CorrelationRejected {
        trigger: String,
        detail: String,
    },
    /// The outbound collaborator refused a call; absorbed as a null result.
    SubmissionFailed {
        seq: ActionSeq,
        message: String,
    },
    Completed {
        at: DateTime<Utc>,
    },
}

impl RuntimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstanceStarted { .. } => "instance_started",
            Self::ActionEmitted { .. } => "action_emitted",
            Self::CallCompleted { .. } => "call_completed",
            Self::DecisionTaken { .. } => "decision_taken",
            Self::TaskClaimed { .. } => "task_claimed",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskReleased { .. } => "task_released",
            Self::TaskCompleted { .. } => "task_completed",
            Self::SignalReceived { .. } => "signal_received",
            Self::CorrelationRejected { .. } => "correlation_rejected",
            Self::SubmissionFailed { .. } => "submission_failed",
            Self::Completed { .. } => "completed",
        }
    }
}
