//! InstanceRegistry: concurrent map of live process instances.
//!
//! The index maps are held only for lookups; each instance sits behind its own
//! `tokio::sync::Mutex` so a slow transition on one instance never blocks
//! another.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::error::ProcessError;
use crate::machine::ProcessMachine;
use crate::types::{InstanceId, InstanceSnapshot, PendingKind, TaskId};

pub type InstanceEntry = Arc<Mutex<ProcessMachine>>;

#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<InstanceId, InstanceEntry>>,
    /// Open correction task → owning instance.
    tasks: RwLock<HashMap<TaskId, InstanceId>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, machine: ProcessMachine) -> InstanceEntry {
        let id = machine.id();
        let entry = Arc::new(Mutex::new(machine));
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry.clone());
        entry
    }

    pub fn get(&self, id: InstanceId) -> Result<InstanceEntry, ProcessError> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(ProcessError::InstanceNotFound(id))
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Drop a completed instance and any task index entries pointing at it.
    pub fn remove(&self, id: InstanceId) -> Option<InstanceEntry> {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| *owner != id);
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn index_task(&self, task_id: TaskId, instance_id: InstanceId) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, instance_id);
    }

    pub fn unindex_task(&self, task_id: TaskId) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
    }

    pub fn instance_for_task(&self, task_id: TaskId) -> Result<InstanceId, ProcessError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .copied()
            .ok_or(ProcessError::TaskNotFound(task_id))
    }

    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of live instances, optionally filtered by what they wait on.
    ///
    /// Entries are cloned out of the index first so no index lock is held
    /// across an instance lock.
    pub async fn snapshots(&self, kind: Option<PendingKind>) -> Vec<InstanceSnapshot> {
        let entries: Vec<InstanceEntry> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let snapshot = entry.lock().await.snapshot();
            if kind.is_none() || snapshot.pending_kind() == kind {
                out.push(snapshot);
            }
        }
        out.sort_by_key(InstanceSnapshot::id);
        out
    }
}
