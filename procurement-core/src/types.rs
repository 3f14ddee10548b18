use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::human_task::HumanTask;

// ─── Scalar aliases ───────────────────────────────────────────

/// Process instance identifier.
pub type InstanceId = Uuid;

/// Human correction task identifier.
pub type TaskId = Uuid;

/// Per-instance action sequence number. Monotonic, starts at 1.
pub type ActionSeq = u64;

/// Name of the signal that resumes an instance parked in `AwaitMaterials`.
pub const RECEIVED_MATERIALS: &str = "receivedMaterials";

// ─── Process versions ─────────────────────────────────────────

/// Named revision of the parts-procurement process.
///
/// Both revisions produce the same external call sequence. v1.1 added the
/// `repairRequestId`/`branchCode` fields to the assign request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessVersion {
    V1_0,
    #[default]
    V1_1,
}

impl ProcessVersion {
    pub const ALL: [ProcessVersion; 2] = [ProcessVersion::V1_0, ProcessVersion::V1_1];

    pub fn process_id(&self) -> &'static str {
        match self {
            Self::V1_0 => "machinery-repair.parts-procurement_v1_0",
            Self::V1_1 => "machinery-repair.parts-procurement_v1_1",
        }
    }

    pub fn parse(process_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.process_id() == process_id)
    }

    /// Whether the assign request carries repair request and branch fields.
    pub fn renders_repair_fields(&self) -> bool {
        matches!(self, Self::V1_1)
    }
}

// ─── Process state ────────────────────────────────────────────

/// The node an instance currently occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessState {
    RequestInventory,
    AssignParts,
    PurchaseOrder,
    AwaitMaterials,
    FixDetails,
    Completed,
}

impl ProcessState {
    pub const ALL: [ProcessState; 6] = [
        ProcessState::RequestInventory,
        ProcessState::AssignParts,
        ProcessState::PurchaseOrder,
        ProcessState::AwaitMaterials,
        ProcessState::FixDetails,
        ProcessState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestInventory => "RequestInventory",
            Self::AssignParts => "AssignParts",
            Self::PurchaseOrder => "PurchaseOrder",
            Self::AwaitMaterials => "AwaitMaterials",
            Self::FixDetails => "FixDetails",
            Self::Completed => "Completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ─── Variables ────────────────────────────────────────────────

/// The variable set carried by one process instance.
///
/// Field names serialize to the camelCase names used on the wire
/// (`partCode`, `wsJsonRequest`, `getInventoryUrl`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessVariables {
    pub repair_request_id: Option<String>,
    pub branch_code: Option<String>,
    pub part_code: String,
    pub quantity: i64,
    /// Unset until an inventory response has been parsed.
    pub parts_available: Option<bool>,
    /// Shortfall to order, set when inventory cannot cover `quantity`.
    pub order_quantity: Option<i64>,
    pub ws_json_request: String,
    pub ws_json_response: String,
    pub get_inventory_url: String,
    pub assign_parts_url: String,
    pub create_purchase_order_url: String,
}

/// Corrected fields supplied by the user completing a `FixDetails` task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub quantity: i64,
    pub part_code: String,
    #[serde(default)]
    pub branch_code: Option<String>,
}

// ─── Pending actions ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An outbound REST call. `url` is an opaque destination handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCall {
    pub url: String,
    pub method: HttpMethod,
    pub body: String,
}

/// What the instance is blocked on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    Call(OutboundCall),
    HumanCorrection(HumanTask),
    AwaitSignal { name: String },
}

/// Discriminant of `ActionKind`, used for registry enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingKind {
    Call,
    HumanCorrection,
    Signal,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::HumanCorrection => "human_correction",
            Self::Signal => "signal",
        }
    }
}

/// The single outstanding action of an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub seq: ActionSeq,
    pub kind: ActionKind,
}

impl PendingAction {
    pub fn pending_kind(&self) -> PendingKind {
        match &self.kind {
            ActionKind::Call(_) => PendingKind::Call,
            ActionKind::HumanCorrection(_) => PendingKind::HumanCorrection,
            ActionKind::AwaitSignal { .. } => PendingKind::Signal,
        }
    }

    pub fn call(&self) -> Option<&OutboundCall> {
        match &self.kind {
            ActionKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn task(&self) -> Option<&HumanTask> {
        match &self.kind {
            ActionKind::HumanCorrection(task) => Some(task),
            _ => None,
        }
    }

    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Call(call) => format!("call #{} {} {}", self.seq, call.method, call.url),
            ActionKind::HumanCorrection(task) => {
                format!("correction task #{} ({})", self.seq, task.task_id)
            }
            ActionKind::AwaitSignal { name } => format!("signal #{} '{}'", self.seq, name),
        }
    }
}

// ─── Collaborator wire types ──────────────────────────────────

/// Correlates an outbound call with its result: instance plus action sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId {
    pub instance_id: InstanceId,
    pub seq: ActionSeq,
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.instance_id, self.seq)
    }
}

/// Delivered to the outbound call collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub call_id: CallId,
    pub url: String,
    pub method: HttpMethod,
    pub body: String,
}

/// Returned by the outbound call collaborator. `None` means no body came back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCompletion {
    pub call_id: CallId,
    pub result: Option<String>,
}

/// Delivered to the human-task collaborator when a correction task opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub instance_id: InstanceId,
    pub created_at: DateTime<Utc>,
}

// ─── Instances ────────────────────────────────────────────────

/// A single process instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: InstanceId,
    pub version: ProcessVersion,
    pub state: ProcessState,
    pub variables: ProcessVariables,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time view of an instance and what it is waiting on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub instance: ProcessInstance,
    pub pending: Option<PendingAction>,
}

impl InstanceSnapshot {
    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn state(&self) -> ProcessState {
        self.instance.state
    }

    pub fn pending_kind(&self) -> Option<PendingKind> {
        self.pending.as_ref().map(PendingAction::pending_kind)
    }
}

/// Caller input for starting an instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StartRequest {
    /// Named process version; the configured default when absent.
    #[serde(default)]
    pub process_id: Option<String>,
    #[serde(default)]
    pub variables: ProcessVariables,
}

/// An open correction task, as listed for users.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionTaskView {
    pub task: HumanTask,
    pub instance_id: InstanceId,
    pub part_code: String,
    pub quantity: i64,
    pub branch_code: Option<String>,
    pub last_response: String,
}
