//! Correction task lifecycle.
//!
//! A task opened on entry to `FixDetails` moves through
//! Unclaimed → Claimed(user) → InProgress(user) → Completed(result).
//! A claimant may release a claimed task back to Unclaimed. Only the user
//! holding the task may start, release or complete it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;
use crate::types::{Correction, InstanceId, TaskId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Unclaimed,
    Claimed { user: String },
    InProgress { user: String },
    Completed { user: String, correction: Correction },
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed { .. } => "claimed",
            Self::InProgress { .. } => "in_progress",
            Self::Completed { .. } => "completed",
        }
    }

    /// The user currently holding the task, if any.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Unclaimed => None,
            Self::Claimed { user } | Self::InProgress { user } | Self::Completed { user, .. } => {
                Some(user)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanTask {
    pub task_id: TaskId,
    pub instance_id: InstanceId,
    pub phase: TaskPhase,
    pub created_at: DateTime<Utc>,
}

impl HumanTask {
    pub fn new(task_id: TaskId, instance_id: InstanceId) -> Self {
        Self {
            task_id,
            instance_id,
            phase: TaskPhase::Unclaimed,
            created_at: Utc::now(),
        }
    }

    pub fn claim(&mut self, user: &str) -> Result<(), ProcessError> {
        match &self.phase {
            TaskPhase::Unclaimed => {
                self.phase = TaskPhase::Claimed {
                    user: user.to_string(),
                };
                Ok(())
            }
            _ => Err(self.lifecycle_error("claim", user)),
        }
    }

    pub fn start(&mut self, user: &str) -> Result<(), ProcessError> {
        match &self.phase {
            TaskPhase::Claimed { user: owner } if owner == user => {
                self.phase = TaskPhase::InProgress {
                    user: user.to_string(),
                };
                Ok(())
            }
            _ => Err(self.lifecycle_error("start", user)),
        }
    }

    pub fn release(&mut self, user: &str) -> Result<(), ProcessError> {
        match &self.phase {
            TaskPhase::Claimed { user: owner } if owner == user => {
                self.phase = TaskPhase::Unclaimed;
                Ok(())
            }
            _ => Err(self.lifecycle_error("release", user)),
        }
    }

    pub fn complete(&mut self, user: &str, correction: Correction) -> Result<(), ProcessError> {
        match &self.phase {
            TaskPhase::InProgress { user: owner } if owner == user => {
                self.phase = TaskPhase::Completed {
                    user: user.to_string(),
                    correction,
                };
                Ok(())
            }
            _ => Err(self.lifecycle_error("complete", user)),
        }
    }

    fn lifecycle_error(&self, operation: &'static str, user: &str) -> ProcessError {
        let phase = match self.phase.owner() {
            Some(owner) => format!("{} by '{}'", self.phase.as_str(), owner),
            None => self.phase.as_str().to_string(),
        };
        ProcessError::TaskLifecycle {
            task_id: self.task_id,
            operation,
            user: user.to_string(),
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn correction() -> Correction {
        Correction {
            quantity: 10,
            part_code: "B".to_string(),
            branch_code: Some("BC-1".to_string()),
        }
    }

    fn task() -> HumanTask {
        HumanTask::new(Uuid::now_v7(), Uuid::now_v7())
    }

    #[test]
    fn test_full_lifecycle() {
        let mut t = task();
        assert_eq!(t.phase, TaskPhase::Unclaimed);

        t.claim("john").unwrap();
        assert_eq!(t.phase.owner(), Some("john"));

        t.start("john").unwrap();
        assert_eq!(t.phase.as_str(), "in_progress");

        t.complete("john", correction()).unwrap();
        assert!(matches!(
            &t.phase,
            TaskPhase::Completed { user, correction } if user == "john" && correction.quantity == 10
        ));
    }

    #[test]
    fn test_second_claim_rejected() {
        let mut t = task();
        t.claim("john").unwrap();
        let err = t.claim("mary").unwrap_err();
        assert!(matches!(
            err,
            ProcessError::TaskLifecycle { operation: "claim", .. }
        ));
        assert_eq!(t.phase.owner(), Some("john"));
    }

    #[test]
    fn test_only_claimant_may_start() {
        let mut t = task();
        t.claim("john").unwrap();
        assert!(t.start("mary").is_err());
        assert_eq!(t.phase.as_str(), "claimed");
    }

    #[test]
    fn test_complete_requires_start() {
        let mut t = task();
        t.claim("john").unwrap();
        assert!(t.complete("john", correction()).is_err());
        assert_eq!(t.phase.as_str(), "claimed");
    }

    #[test]
    fn test_release_returns_to_unclaimed() {
        let mut t = task();
        t.claim("john").unwrap();
        assert!(t.release("mary").is_err());
        t.release("john").unwrap();
        assert_eq!(t.phase, TaskPhase::Unclaimed);
        t.claim("mary").unwrap();
        assert_eq!(t.phase.owner(), Some("mary"));
    }

    #[test]
    fn test_lifecycle_error_names_owner() {
        let mut t = task();
        t.claim("john").unwrap();
        let msg = t.start("mary").unwrap_err().to_string();
        assert!(msg.contains("'mary' cannot start"), "{msg}");
        assert!(msg.contains("claimed by 'john'"), "{msg}");
    }
}
