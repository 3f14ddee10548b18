//! Process state machine for one parts-procurement instance.
//!
//! The machine owns the authoritative state, variables and the single pending
//! action. It accepts three trigger kinds (call result, correction completion,
//! signal), validates each against the pending action, applies the decision
//! rules and emits the next pending action. It performs no I/O; the
//! dispatcher delivers its outputs.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::ProcessError;
use crate::events::{ActionDesc, RuntimeEvent};
use crate::human_task::HumanTask;
use crate::payload::{
    parse_response, render_assign_request_for, render_inventory_request,
    render_purchase_order_request, ParsedResponse,
};
use crate::rules::{self, Decision};
use crate::topology::topology;
use crate::types::*;

/// External input that can advance a waiting instance.
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    CallCompleted {
        seq: ActionSeq,
        result: Option<String>,
    },
    TaskCompleted {
        task_id: TaskId,
        user: String,
        correction: Correction,
    },
    Signal {
        name: String,
    },
}

impl Trigger {
    pub fn describe(&self) -> String {
        match self {
            Self::CallCompleted { seq, .. } => format!("call result #{}", seq),
            Self::TaskCompleted { task_id, .. } => format!("completion of task {}", task_id),
            Self::Signal { name } => format!("signal '{}'", name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessMachine {
    instance: ProcessInstance,
    pending: Option<PendingAction>,
    next_seq: ActionSeq,
}

impl ProcessMachine {
    /// Create an instance and enter the initial state.
    ///
    /// Returns the machine (already waiting on the inventory call) and the
    /// events produced on the way in.
    pub fn start(
        id: InstanceId,
        version: ProcessVersion,
        variables: ProcessVariables,
    ) -> (Self, Vec<RuntimeEvent>) {
        let now = Utc::now();
        let mut machine = Self {
            instance: ProcessInstance {
                id,
                version,
                state: topology().initial(),
                variables,
                created_at: now,
                updated_at: now,
            },
            pending: None,
            next_seq: 1,
        };
        let mut events = vec![RuntimeEvent::InstanceStarted {
            process_id: version.process_id().to_string(),
            variables: machine.instance.variables.clone(),
        }];
        machine.enter(topology().initial(), &mut events);
        (machine, events)
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn instance(&self) -> &ProcessInstance {
        &self.instance
    }

    pub fn state(&self) -> ProcessState {
        self.instance.state
    }

    pub fn variables(&self) -> &ProcessVariables {
        &self.instance.variables
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.instance.state.is_terminal()
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            instance: self.instance.clone(),
            pending: self.pending.clone(),
        }
    }

    pub fn pending_task(&self) -> Option<&HumanTask> {
        self.pending.as_ref().and_then(PendingAction::task)
    }

    /// The call request for the pending action, if it is an outbound call.
    pub fn outbound_request(&self) -> Option<CallRequest> {
        let pending = self.pending.as_ref()?;
        let call = pending.call()?;
        Some(CallRequest {
            call_id: CallId {
                instance_id: self.instance.id,
                seq: pending.seq,
            },
            url: call.url.clone(),
            method: call.method,
            body: call.body.clone(),
        })
    }

    /// Apply a trigger. On error the instance is unchanged.
    pub fn apply(&mut self, trigger: Trigger) -> Result<Vec<RuntimeEvent>, ProcessError> {
        let (decision, mut events) = self.decide(&trigger)?;

        let from = self.instance.state;
        if !topology().allows(from, decision.next) {
            return Err(ProcessError::IllegalTransition {
                from,
                to: decision.next,
            });
        }

        if let Trigger::CallCompleted { result, .. } = trigger {
            self.instance.variables.ws_json_response = result.unwrap_or_default();
        }
        decision.apply_to(&mut self.instance.variables);

        debug!(
            instance_id = %self.instance.id,
            rule = decision.rule,
            from = %from,
            to = %decision.next,
            reason = %decision.reason,
            "Decision taken"
        );
        events.push(RuntimeEvent::DecisionTaken {
            rule: decision.rule.to_string(),
            from,
            to: decision.next,
            reason: decision.reason,
        });

        self.enter(decision.next, &mut events);
        Ok(events)
    }

    pub fn claim_task(&mut self, task_id: TaskId, user: &str) -> Result<RuntimeEvent, ProcessError> {
        self.pending_task_mut(task_id)?.claim(user)?;
        Ok(RuntimeEvent::TaskClaimed {
            task_id,
            user: user.to_string(),
        })
    }

    pub fn start_task(&mut self, task_id: TaskId, user: &str) -> Result<RuntimeEvent, ProcessError> {
        self.pending_task_mut(task_id)?.start(user)?;
        Ok(RuntimeEvent::TaskStarted {
            task_id,
            user: user.to_string(),
        })
    }

    pub fn release_task(
        &mut self,
        task_id: TaskId,
        user: &str,
    ) -> Result<RuntimeEvent, ProcessError> {
        self.pending_task_mut(task_id)?.release(user)?;
        Ok(RuntimeEvent::TaskReleased {
            task_id,
            user: user.to_string(),
        })
    }

    fn pending_task_mut(&mut self, task_id: TaskId) -> Result<&mut HumanTask, ProcessError> {
        match self.pending.as_mut() {
            Some(PendingAction {
                kind: ActionKind::HumanCorrection(task),
                ..
            }) if task.task_id == task_id => Ok(task),
            _ => Err(ProcessError::TaskNotFound(task_id)),
        }
    }

    /// Match the trigger against the pending action and pick the rule.
    fn decide(&self, trigger: &Trigger) -> Result<(Decision, Vec<RuntimeEvent>), ProcessError> {
        let pending = self.pending.as_ref().ok_or_else(|| self.mismatch(trigger))?;

        match (&pending.kind, trigger) {
            (ActionKind::Call(_), Trigger::CallCompleted { seq, result }) if *seq == pending.seq => {
                let parsed = parse_response(result.as_deref());
                let decision = self.call_decision(&parsed, trigger)?;
                let event = RuntimeEvent::CallCompleted {
                    seq: *seq,
                    response_kind: parsed.kind().to_string(),
                };
                Ok((decision, vec![event]))
            }
            (
                ActionKind::HumanCorrection(task),
                Trigger::TaskCompleted {
                    task_id,
                    user,
                    correction,
                },
            ) if task.task_id == *task_id => {
                let mut done = task.clone();
                done.complete(user, correction.clone())?;
                let event = RuntimeEvent::TaskCompleted { task: done };
                Ok((rules::correction_decision(correction), vec![event]))
            }
            (ActionKind::AwaitSignal { name }, Trigger::Signal { name: received })
                if name == received =>
            {
                let event = RuntimeEvent::SignalReceived {
                    name: received.clone(),
                };
                Ok((rules::materials_received_decision(), vec![event]))
            }
            _ => Err(self.mismatch(trigger)),
        }
    }

    fn call_decision(
        &self,
        parsed: &ParsedResponse,
        trigger: &Trigger,
    ) -> Result<Decision, ProcessError> {
        let vars = &self.instance.variables;
        match self.instance.state {
            ProcessState::RequestInventory => Ok(rules::inventory_decision(vars, parsed)),
            ProcessState::AssignParts => Ok(rules::assign_decision(vars, parsed)),
            ProcessState::PurchaseOrder => Ok(rules::purchase_order_decision(parsed)),
            _ => Err(self.mismatch(trigger)),
        }
    }

    fn mismatch(&self, trigger: &Trigger) -> ProcessError {
        ProcessError::CorrelationMismatch {
            instance_id: self.instance.id,
            state: self.instance.state,
            trigger: trigger.describe(),
            pending: self
                .pending
                .as_ref()
                .map(PendingAction::describe)
                .unwrap_or_else(|| "nothing".to_string()),
        }
    }

    /// Enter `state` and emit its pending action.
    fn enter(&mut self, state: ProcessState, events: &mut Vec<RuntimeEvent>) {
        self.instance.state = state;
        self.instance.updated_at = Utc::now();

        let vars = &self.instance.variables;
        let kind = match state {
            ProcessState::RequestInventory => Some((
                vars.get_inventory_url.clone(),
                HttpMethod::Get,
                render_inventory_request(&vars.part_code),
            )),
            ProcessState::AssignParts => Some((
                vars.assign_parts_url.clone(),
                HttpMethod::Post,
                render_assign_request_for(
                    self.instance.version,
                    &vars.part_code,
                    vars.quantity,
                    vars.repair_request_id.as_deref(),
                    vars.branch_code.as_deref(),
                ),
            )),
            ProcessState::PurchaseOrder => Some((
                vars.create_purchase_order_url.clone(),
                HttpMethod::Post,
                render_purchase_order_request(
                    &vars.part_code,
                    vars.order_quantity.unwrap_or(vars.quantity),
                ),
            )),
            _ => None,
        }
        .map(|(url, method, body)| {
            self.instance.variables.ws_json_request = body.clone();
            ActionKind::Call(OutboundCall { url, method, body })
        })
        .or_else(|| match state {
            ProcessState::AwaitMaterials => Some(ActionKind::AwaitSignal {
                name: RECEIVED_MATERIALS.to_string(),
            }),
            ProcessState::FixDetails => Some(ActionKind::HumanCorrection(HumanTask::new(
                Uuid::now_v7(),
                self.instance.id,
            ))),
            _ => None,
        });

        match kind {
            Some(kind) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                events.push(RuntimeEvent::ActionEmitted {
                    seq,
                    state,
                    action: ActionDesc::from(&kind),
                });
                self.pending = Some(PendingAction { seq, kind });
            }
            None => {
                self.pending = None;
                events.push(RuntimeEvent::Completed {
                    at: self.instance.updated_at,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::human_task::TaskPhase;

    fn start_vars() -> ProcessVariables {
        ProcessVariables {
            repair_request_id: Some("RR-1".to_string()),
            branch_code: Some("BC-1".to_string()),
            part_code: "A".to_string(),
            quantity: 1,
            get_inventory_url: "inventoryUrl".to_string(),
            assign_parts_url: "assignPartsUrl".to_string(),
            create_purchase_order_url: "purchaseOrderUrl".to_string(),
            ..Default::default()
        }
    }

    fn started(vars: ProcessVariables) -> ProcessMachine {
        ProcessMachine::start(Uuid::now_v7(), ProcessVersion::V1_1, vars).0
    }

    fn reply(machine: &mut ProcessMachine, body: Option<&str>) -> Vec<RuntimeEvent> {
        let seq = machine.pending().unwrap().seq;
        machine
            .apply(Trigger::CallCompleted {
                seq,
                result: body.map(str::to_string),
            })
            .unwrap()
    }

    fn pending_call(machine: &ProcessMachine) -> OutboundCall {
        machine.pending().unwrap().call().unwrap().clone()
    }

    #[test]
    fn test_start_emits_inventory_call() {
        let (machine, events) =
            ProcessMachine::start(Uuid::now_v7(), ProcessVersion::V1_1, start_vars());

        assert_eq!(machine.state(), ProcessState::RequestInventory);
        let call = pending_call(&machine);
        assert_eq!(call.url, "inventoryUrl");
        assert_eq!(call.method, HttpMethod::Get);
        assert_eq!(call.body, r#"{"partCode":"A"}"#);
        assert_eq!(machine.variables().ws_json_request, call.body);
        assert_eq!(machine.variables().parts_available, None);
        assert_eq!(machine.pending().unwrap().seq, 1);

        let names: Vec<_> = events.iter().map(RuntimeEvent::name).collect();
        assert_eq!(names, vec!["instance_started", "action_emitted"]);
    }

    #[test]
    fn test_happy_path_reaches_completed() {
        let mut m = started(start_vars());

        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));
        assert_eq!(m.state(), ProcessState::AssignParts);
        assert_eq!(m.variables().parts_available, Some(true));
        let call = pending_call(&m);
        assert_eq!(call.url, "assignPartsUrl");
        assert_eq!(call.method, HttpMethod::Post);
        assert_eq!(
            call.body,
            r#"{"partCode":"A","quantity":1,"repairRequestId":"RR-1","branchCode":"BC-1"}"#
        );
        assert_eq!(
            m.variables().ws_json_response,
            r#"{"partCode":"A","availableQuantity":20}"#
        );

        let events = reply(&mut m, Some(r#"{"reservationId":"abc-ABC-123","remainingParts":0}"#));
        assert!(m.is_completed());
        assert!(m.pending().is_none());
        assert!(matches!(events.last(), Some(RuntimeEvent::Completed { .. })));
    }

    #[test]
    fn test_shortage_loop_through_purchase_order() {
        let mut m = started(ProcessVariables {
            quantity: 5,
            ..start_vars()
        });

        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":0}"#));
        assert_eq!(m.state(), ProcessState::PurchaseOrder);
        assert_eq!(m.variables().parts_available, Some(false));
        let call = pending_call(&m);
        assert_eq!(call.url, "purchaseOrderUrl");
        assert_eq!(call.method, HttpMethod::Post);
        assert_eq!(call.body, r#"{"partCode":"A","quantity":5}"#);

        reply(&mut m, Some(r#"{"purchaseOrderReceiverId":"PO-77"}"#));
        assert_eq!(m.state(), ProcessState::AwaitMaterials);
        assert_eq!(m.pending().unwrap().pending_kind(), PendingKind::Signal);

        m.apply(Trigger::Signal {
            name: RECEIVED_MATERIALS.to_string(),
        })
        .unwrap();
        assert_eq!(m.state(), ProcessState::RequestInventory);
        assert_eq!(pending_call(&m).body, r#"{"partCode":"A"}"#);
    }

    #[test]
    fn test_nok_assignment_retries_inventory_unchanged() {
        let mut m = started(start_vars());
        let first_inventory = pending_call(&m);

        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));
        let before = m.variables().clone();

        reply(&mut m, Some(r#"{"responseCode":"NOK"}"#));
        assert_eq!(m.state(), ProcessState::RequestInventory);
        assert_eq!(pending_call(&m), first_inventory);

        let after = m.variables();
        assert_eq!(after.part_code, before.part_code);
        assert_eq!(after.quantity, before.quantity);
        assert_eq!(after.branch_code, before.branch_code);
        assert_eq!(after.parts_available, before.parts_available);
    }

    #[test]
    fn test_null_assign_result_routes_to_correction() {
        let mut m = started(start_vars());
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));

        reply(&mut m, None);
        assert_eq!(m.state(), ProcessState::FixDetails);
        assert_eq!(m.variables().ws_json_response, "");
        assert_eq!(m.variables().parts_available, Some(true));

        let task_id = m.pending_task().unwrap().task_id;
        m.claim_task(task_id, "john").unwrap();
        m.start_task(task_id, "john").unwrap();
        let events = m
            .apply(Trigger::TaskCompleted {
                task_id,
                user: "john".to_string(),
                correction: Correction {
                    quantity: 10,
                    part_code: "B".to_string(),
                    branch_code: Some("BC-1".to_string()),
                },
            })
            .unwrap();

        let done = events
            .iter()
            .find_map(|e| match e {
                RuntimeEvent::TaskCompleted { task } => Some(task),
                _ => None,
            })
            .unwrap();
        assert_eq!(done.task_id, task_id);
        assert!(matches!(
            &done.phase,
            TaskPhase::Completed { user, correction } if user == "john" && correction.part_code == "B"
        ));
        assert!(m.pending_task().is_none());

        assert_eq!(m.state(), ProcessState::RequestInventory);
        assert_eq!(m.variables().quantity, 10);
        assert_eq!(m.variables().part_code, "B");
        assert_eq!(m.variables().branch_code.as_deref(), Some("BC-1"));
        assert_eq!(m.variables().parts_available, None);
        assert_eq!(pending_call(&m).body, r#"{"partCode":"B"}"#);
    }

    #[test]
    fn test_unparsable_inventory_clears_availability() {
        let mut m = started(ProcessVariables {
            parts_available: Some(true),
            ..start_vars()
        });
        reply(&mut m, Some("GET INVENTORY RESPONSE"));
        assert_eq!(m.state(), ProcessState::FixDetails);
        assert_eq!(m.variables().parts_available, None);
        assert_eq!(m.variables().ws_json_response, "GET INVENTORY RESPONSE");
    }

    #[test]
    fn test_absent_branch_code_renders_null_string() {
        let mut m = started(ProcessVariables {
            branch_code: None,
            ..start_vars()
        });
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":1}"#));
        assert_eq!(
            pending_call(&m).body,
            r#"{"partCode":"A","quantity":1,"repairRequestId":"RR-1","branchCode":"null"}"#
        );
    }

    #[test]
    fn test_v1_0_assign_body() {
        let (mut m, events) =
            ProcessMachine::start(Uuid::now_v7(), ProcessVersion::V1_0, start_vars());
        assert!(matches!(
            &events[0],
            RuntimeEvent::InstanceStarted { process_id, .. }
                if process_id == "machinery-repair.parts-procurement_v1_0"
        ));
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":1}"#));
        assert_eq!(pending_call(&m).body, r#"{"partCode":"A","quantity":1}"#);
    }

    #[test]
    fn test_stale_call_result_rejected() {
        let mut m = started(start_vars());
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));
        let before = m.snapshot();

        let err = m
            .apply(Trigger::CallCompleted {
                seq: 1,
                result: Some(r#"{"reservationId":"r"}"#.to_string()),
            })
            .unwrap_err();
        assert!(err.is_correlation_mismatch());
        assert_eq!(m.snapshot(), before);
    }

    #[test]
    fn test_wrong_trigger_kind_rejected() {
        let mut m = started(start_vars());
        let before = m.snapshot();

        let err = m
            .apply(Trigger::Signal {
                name: RECEIVED_MATERIALS.to_string(),
            })
            .unwrap_err();
        assert!(err.is_correlation_mismatch());
        assert!(err.to_string().contains("signal 'receivedMaterials'"));
        assert_eq!(m.snapshot(), before);

        let err = m
            .apply(Trigger::TaskCompleted {
                task_id: Uuid::now_v7(),
                user: "john".to_string(),
                correction: Correction {
                    quantity: 1,
                    part_code: "A".to_string(),
                    branch_code: None,
                },
            })
            .unwrap_err();
        assert!(err.is_correlation_mismatch());
    }

    #[test]
    fn test_wrong_signal_name_rejected() {
        let mut m = started(ProcessVariables {
            quantity: 5,
            ..start_vars()
        });
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":0}"#));
        reply(&mut m, Some(r#"{"purchaseOrderReceiverId":"PO-1"}"#));

        let err = m
            .apply(Trigger::Signal {
                name: "cancelled".to_string(),
            })
            .unwrap_err();
        assert!(err.is_correlation_mismatch());
        assert_eq!(m.state(), ProcessState::AwaitMaterials);
    }

    #[test]
    fn test_completed_instance_accepts_nothing() {
        let mut m = started(start_vars());
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));
        reply(&mut m, Some(r#"{"reservationId":"r"}"#));

        let err = m
            .apply(Trigger::CallCompleted {
                seq: 3,
                result: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("waiting on nothing"));
    }

    #[test]
    fn test_task_completion_requires_started_task() {
        let mut m = started(start_vars());
        reply(&mut m, None);
        let task_id = m.pending_task().unwrap().task_id;
        m.claim_task(task_id, "john").unwrap();

        let err = m
            .apply(Trigger::TaskCompleted {
                task_id,
                user: "john".to_string(),
                correction: Correction {
                    quantity: 1,
                    part_code: "A".to_string(),
                    branch_code: None,
                },
            })
            .unwrap_err();
        assert!(matches!(err, ProcessError::TaskLifecycle { .. }));
        assert_eq!(m.state(), ProcessState::FixDetails);
    }

    #[test]
    fn test_unknown_task_operations() {
        let mut m = started(start_vars());
        let err = m.claim_task(Uuid::now_v7(), "john").unwrap_err();
        assert!(matches!(err, ProcessError::TaskNotFound(_)));
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut m = started(start_vars());
        assert_eq!(m.pending().unwrap().seq, 1);
        reply(&mut m, Some(r#"{"partCode":"A","availableQuantity":20}"#));
        assert_eq!(m.pending().unwrap().seq, 2);
        reply(&mut m, Some(r#"{"responseCode":"NOK"}"#));
        assert_eq!(m.pending().unwrap().seq, 3);

        let request = m.outbound_request().unwrap();
        assert_eq!(request.call_id.seq, 3);
        assert_eq!(request.call_id.instance_id, m.id());
    }
}
