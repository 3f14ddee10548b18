use crate::events::RuntimeEvent;
use crate::store::ProcessStore;
use crate::types::{InstanceId, InstanceSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// In-memory ProcessStore for tests and the runner.
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<InstanceId, Vec<RuntimeEvent>>>,
    snapshots: RwLock<HashMap<InstanceId, InstanceSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances with at least one recorded event.
    pub fn instance_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn append_event(&self, instance_id: InstanceId, event: &RuntimeEvent) -> Result<u64> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let log = events.entry(instance_id).or_default();
        log.push(event.clone());
        Ok(log.len() as u64)
    }

    async fn read_events(
        &self,
        instance_id: InstanceId,
        from_seq: u64,
    ) -> Result<Vec<(u64, RuntimeEvent)>> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .get(&instance_id)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(i, e)| (i as u64 + 1, e.clone()))
                    .filter(|(seq, _)| *seq >= from_seq)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, snapshot: &InstanceSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.id(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, instance_id: InstanceId) -> Result<Option<InstanceSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&instance_id)
            .cloned())
    }
}
