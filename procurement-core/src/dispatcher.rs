//! Dispatcher: the public surface of the procurement engine.
//!
//! Routes every external input (start, call result, task operation, signal)
//! to the owning instance, records the resulting events, and hands the next
//! pending action to the matching collaborator. A caller returns as soon as
//! the new pending action has been handed off; nothing here waits for the
//! external action itself.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collaborator::{CallCollaborator, TaskCollaborator};
use crate::config::ProcessDefaults;
use crate::error::ProcessError;
use crate::events::RuntimeEvent;
use crate::human_task::HumanTask;
use crate::machine::{ProcessMachine, Trigger};
use crate::registry::InstanceRegistry;
use crate::store::ProcessStore;
use crate::types::*;

/// Outcome of one locked transition, acted on after the lock is released.
struct Step {
    instance_id: InstanceId,
    outbound: Option<CallRequest>,
    opened_task: Option<TaskAssignment>,
    completed: Option<InstanceSnapshot>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    registry: InstanceRegistry,
    store: Arc<dyn ProcessStore>,
    calls: Arc<dyn CallCollaborator>,
    tasks: Arc<dyn TaskCollaborator>,
    defaults: ProcessDefaults,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ProcessStore>,
        calls: Arc<dyn CallCollaborator>,
        tasks: Arc<dyn TaskCollaborator>,
        defaults: ProcessDefaults,
    ) -> Self {
        Self {
            registry: InstanceRegistry::new(),
            store,
            calls,
            tasks,
            defaults,
        }
    }

    // ── Start ──

    /// Create an instance and emit its first inventory call.
    pub async fn start(&self, request: StartRequest) -> Result<InstanceId, ProcessError> {
        let process_id = request
            .process_id
            .unwrap_or_else(|| self.defaults.process_id.clone());
        let version = ProcessVersion::parse(&process_id)
            .ok_or_else(|| ProcessError::UnknownProcess(process_id.clone()))?;

        let mut variables = request.variables;
        if variables.quantity < 0 {
            return Err(ProcessError::InvalidVariables(format!(
                "quantity must be non-negative, got {}",
                variables.quantity
            )));
        }
        self.defaults.fill(&mut variables);

        let instance_id = Uuid::now_v7();
        let (machine, events) = ProcessMachine::start(instance_id, version, variables);
        let entry = self.registry.insert(machine);

        let step = {
            let machine = entry.lock().await;
            self.record(instance_id, &events).await;
            Step {
                instance_id,
                outbound: machine.outbound_request(),
                opened_task: None,
                completed: None,
            }
        };

        info!(
            instance_id = %instance_id,
            process_id = %process_id,
            "Process instance started"
        );

        self.after_transition(step).await?;
        Ok(instance_id)
    }

    // ── Triggers ──

    /// Route an outbound call result to the instance that issued the call.
    pub async fn complete_call(&self, completion: CallCompletion) -> Result<(), ProcessError> {
        let CallCompletion { call_id, result } = completion;
        let step = self
            .transition(call_id.instance_id, Trigger::CallCompleted {
                seq: call_id.seq,
                result,
            })
            .await?;
        self.after_transition(step).await
    }

    /// Deliver an external signal, e.g. `receivedMaterials`.
    pub async fn signal(&self, instance_id: InstanceId, name: &str) -> Result<(), ProcessError> {
        let step = self
            .transition(instance_id, Trigger::Signal {
                name: name.to_string(),
            })
            .await?;
        self.after_transition(step).await
    }

    // ── Correction tasks ──

    pub async fn claim_task(&self, task_id: TaskId, user: &str) -> Result<HumanTask, ProcessError> {
        self.task_operation(task_id, |m| m.claim_task(task_id, user))
            .await
    }

    pub async fn start_task(&self, task_id: TaskId, user: &str) -> Result<HumanTask, ProcessError> {
        self.task_operation(task_id, |m| m.start_task(task_id, user))
            .await
    }

    pub async fn release_task(
        &self,
        task_id: TaskId,
        user: &str,
    ) -> Result<HumanTask, ProcessError> {
        self.task_operation(task_id, |m| m.release_task(task_id, user))
            .await
    }

    /// Complete a started correction task and fold its output into the
    /// instance variables. A negative quantity is refused and the task stays
    /// in progress.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        user: &str,
        correction: Correction,
    ) -> Result<(), ProcessError> {
        let instance_id = self.registry.instance_for_task(task_id)?;
        if correction.quantity < 0 {
            return Err(ProcessError::InvalidVariables(format!(
                "corrected quantity must be non-negative, got {}",
                correction.quantity
            )));
        }
        let step = self
            .transition(instance_id, Trigger::TaskCompleted {
                task_id,
                user: user.to_string(),
                correction,
            })
            .await?;
        self.after_transition(step).await
    }

    // ── Queries ──

    /// Live instance state, or the final snapshot of a completed instance.
    pub async fn status(&self, instance_id: InstanceId) -> Result<InstanceSnapshot, ProcessError> {
        if let Ok(entry) = self.registry.get(instance_id) {
            return Ok(entry.lock().await.snapshot());
        }
        self.store
            .load_snapshot(instance_id)
            .await?
            .ok_or(ProcessError::InstanceNotFound(instance_id))
    }

    /// Open correction tasks across all live instances.
    pub async fn correction_tasks(&self) -> Vec<CorrectionTaskView> {
        self.registry
            .snapshots(Some(PendingKind::HumanCorrection))
            .await
            .into_iter()
            .filter_map(|snapshot| {
                let task = snapshot.pending.as_ref()?.task()?.clone();
                let vars = &snapshot.instance.variables;
                Some(CorrectionTaskView {
                    task,
                    instance_id: snapshot.instance.id,
                    part_code: vars.part_code.clone(),
                    quantity: vars.quantity,
                    branch_code: vars.branch_code.clone(),
                    last_response: vars.ws_json_response.clone(),
                })
            })
            .collect()
    }

    pub async fn active_instances(&self) -> Vec<InstanceSnapshot> {
        self.registry.snapshots(None).await
    }

    pub async fn instances_waiting_on(&self, kind: PendingKind) -> Vec<InstanceSnapshot> {
        self.registry.snapshots(Some(kind)).await
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Full audit trail of an instance.
    pub async fn events(&self, instance_id: InstanceId) -> Result<Vec<RuntimeEvent>, ProcessError> {
        Ok(self
            .store
            .read_events(instance_id, 0)
            .await?
            .into_iter()
            .map(|(_, event)| event)
            .collect())
    }

    // ── Internals ──

    /// Apply a trigger under the instance lock.
    async fn transition(
        &self,
        instance_id: InstanceId,
        trigger: Trigger,
    ) -> Result<Step, ProcessError> {
        let entry = self.registry.get(instance_id)?;
        let mut machine = entry.lock().await;
        let previous_task = machine.pending_task().map(|t| t.task_id);
        let trigger_label = trigger.describe();

        let events = match machine.apply(trigger) {
            Ok(events) => events,
            Err(err) => {
                if err.is_correlation_mismatch() {
                    warn!(
                        instance_id = %instance_id,
                        state = %machine.state(),
                        trigger = %trigger_label,
                        "Correlation mismatch, trigger rejected"
                    );
                    self.record(instance_id, &[RuntimeEvent::CorrelationRejected {
                        trigger: trigger_label,
                        detail: err.to_string(),
                    }])
                    .await;
                }
                return Err(err);
            }
        };
        self.record(instance_id, &events).await;

        debug!(
            instance_id = %instance_id,
            state = %machine.state(),
            "Instance advanced"
        );

        if let Some(task_id) = previous_task {
            self.registry.unindex_task(task_id);
        }
        let opened_task = machine.pending_task().map(|task| {
            self.registry.index_task(task.task_id, instance_id);
            TaskAssignment {
                task_id: task.task_id,
                instance_id,
                created_at: task.created_at,
            }
        });

        Ok(Step {
            instance_id,
            outbound: machine.outbound_request(),
            opened_task,
            completed: machine.is_completed().then(|| machine.snapshot()),
        })
    }

    /// Deliver the pending action produced by a transition.
    ///
    /// A refused call submission is fed back as a null result, which the
    /// decision rules route like any other empty response.
    async fn after_transition(&self, mut step: Step) -> Result<(), ProcessError> {
        loop {
            if let Some(snapshot) = step.completed.take() {
                return self.finish(snapshot).await;
            }

            if let Some(assignment) = step.opened_task.take() {
                let task_id = assignment.task_id;
                if let Err(err) = self.tasks.assign(assignment).await {
                    warn!(
                        task_id = %task_id,
                        instance_id = %step.instance_id,
                        error = %format!("{err:#}"),
                        "Task assignment failed; task stays listed as open"
                    );
                }
            }

            let Some(request) = step.outbound.take() else {
                return Ok(());
            };
            let call_id = request.call_id;
            match self.calls.submit(request).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(
                        instance_id = %call_id.instance_id,
                        seq = call_id.seq,
                        error = %message,
                        "Call submission failed, treating as empty result"
                    );
                    self.record(call_id.instance_id, &[RuntimeEvent::SubmissionFailed {
                        seq: call_id.seq,
                        message,
                    }])
                    .await;
                    step = self
                        .transition(call_id.instance_id, Trigger::CallCompleted {
                            seq: call_id.seq,
                            result: None,
                        })
                        .await?;
                }
            }
        }
    }

    async fn task_operation<F>(&self, task_id: TaskId, op: F) -> Result<HumanTask, ProcessError>
    where
        F: FnOnce(&mut ProcessMachine) -> Result<RuntimeEvent, ProcessError>,
    {
        let instance_id = self.registry.instance_for_task(task_id)?;
        let entry = self.registry.get(instance_id)?;
        let mut machine = entry.lock().await;
        let event = op(&mut *machine)?;
        self.record(instance_id, std::slice::from_ref(&event)).await;
        debug!(
            instance_id = %instance_id,
            task_id = %task_id,
            event = event.name(),
            "Correction task updated"
        );
        machine
            .pending_task()
            .cloned()
            .ok_or(ProcessError::TaskNotFound(task_id))
    }

    /// Persist the final snapshot, then drop the instance from the registry.
    /// If the save fails the instance stays registered so `status` still
    /// answers for it.
    async fn finish(&self, snapshot: InstanceSnapshot) -> Result<(), ProcessError> {
        let instance_id = snapshot.id();
        if let Err(err) = self.store.save_snapshot(&snapshot).await {
            error!(
                instance_id = %instance_id,
                error = %format!("{err:#}"),
                "Failed to save final snapshot; instance kept in registry"
            );
            return Err(err.into());
        }
        self.registry.remove(instance_id);
        info!(
            instance_id = %instance_id,
            part_code = %snapshot.instance.variables.part_code,
            "Process instance completed"
        );
        Ok(())
    }

    /// Append events to the store. The live instance stays authoritative, so a
    /// store failure is logged and does not undo the transition.
    async fn record(&self, instance_id: InstanceId, events: &[RuntimeEvent]) {
        for event in events {
            if let Err(err) = self.store.append_event(instance_id, event).await {
                error!(
                    instance_id = %instance_id,
                    event = event.name(),
                    error = %format!("{err:#}"),
                    "Failed to record runtime event"
                );
            }
        }
    }
}
