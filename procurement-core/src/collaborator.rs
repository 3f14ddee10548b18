//! Contracts for the two external collaborators the dispatcher talks to.
//!
//! - **Outbound calls**: `CallCollaborator::submit` hands off a `CallRequest`;
//!   the result comes back later through `Dispatcher::complete_call`.
//! - **Human tasks**: `TaskCollaborator::assign` announces a new correction
//!   task; claim/start/complete flow back through the dispatcher.
//!
//! Submissions must not block on the external action itself.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::types::{CallRequest, TaskAssignment};

#[async_trait]
pub trait CallCollaborator: Send + Sync {
    async fn submit(&self, request: CallRequest) -> Result<()>;
}

#[async_trait]
pub trait TaskCollaborator: Send + Sync {
    async fn assign(&self, assignment: TaskAssignment) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Channel-backed implementations
// ---------------------------------------------------------------------------

/// Queues call requests on a bounded channel for a `CallWorker` to drain.
#[derive(Clone)]
pub struct ChannelCallCollaborator {
    tx: mpsc::Sender<CallRequest>,
}

impl ChannelCallCollaborator {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CallRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CallCollaborator for ChannelCallCollaborator {
    async fn submit(&self, request: CallRequest) -> Result<()> {
        let call_id = request.call_id;
        self.tx
            .send(request)
            .await
            .map_err(|_| anyhow!("call queue closed, dropping call {}", call_id))
    }
}

/// Publishes task assignments on an unbounded channel (inbox for task UIs).
#[derive(Clone)]
pub struct ChannelTaskCollaborator {
    tx: mpsc::UnboundedSender<TaskAssignment>,
}

impl ChannelTaskCollaborator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskAssignment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskCollaborator for ChannelTaskCollaborator {
    async fn assign(&self, assignment: TaskAssignment) -> Result<()> {
        let task_id = assignment.task_id;
        self.tx
            .send(assignment)
            .map_err(|_| anyhow!("task inbox closed, dropping task {}", task_id))
    }
}

/// Logs assignments only. Tasks remain discoverable via
/// `Dispatcher::correction_tasks`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingTaskCollaborator;

#[async_trait]
impl TaskCollaborator for LoggingTaskCollaborator {
    async fn assign(&self, assignment: TaskAssignment) -> Result<()> {
        info!(
            task_id = %assignment.task_id,
            instance_id = %assignment.instance_id,
            "Correction task opened"
        );
        Ok(())
    }
}
