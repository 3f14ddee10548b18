use crate::events::RuntimeEvent;
use crate::types::{InstanceId, InstanceSnapshot};
use anyhow::Result;
use async_trait::async_trait;

/// Persistence contract for the procurement engine.
///
/// The dispatcher records every event and the final snapshot of each
/// completed instance through this trait. Live instance state stays in the
/// registry; durable backends plug in here.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    // ── Event log (append-only) ──

    /// Append an event and return its per-instance sequence number.
    async fn append_event(&self, instance_id: InstanceId, event: &RuntimeEvent) -> Result<u64>;
    async fn read_events(
        &self,
        instance_id: InstanceId,
        from_seq: u64,
    ) -> Result<Vec<(u64, RuntimeEvent)>>;

    // ── Snapshots ──

    async fn save_snapshot(&self, snapshot: &InstanceSnapshot) -> Result<()>;
    async fn load_snapshot(&self, instance_id: InstanceId) -> Result<Option<InstanceSnapshot>>;
}
