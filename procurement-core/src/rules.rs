//! Decision rules: parsed response (plus current variables) → next state and
//! variable updates. Pure; the state machine applies the result.

use serde::{Deserialize, Serialize};

use crate::payload::ParsedResponse;
use crate::types::{Correction, ProcessState, ProcessVariables};

/// A single variable mutation produced by a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableUpdate {
    PartsAvailable(Option<bool>),
    OrderQuantity(Option<i64>),
    PartCode(String),
    Quantity(i64),
    BranchCode(Option<String>),
}

impl VariableUpdate {
    pub fn apply(&self, vars: &mut ProcessVariables) {
        match self {
            Self::PartsAvailable(v) => vars.parts_available = *v,
            Self::OrderQuantity(v) => vars.order_quantity = *v,
            Self::PartCode(v) => vars.part_code = v.clone(),
            Self::Quantity(v) => vars.quantity = *v,
            Self::BranchCode(v) => vars.branch_code = v.clone(),
        }
    }
}

/// Outcome of a rule: where to go next and what to change on the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub rule: &'static str,
    pub next: ProcessState,
    pub updates: Vec<VariableUpdate>,
    pub reason: String,
}

impl Decision {
    fn new(rule: &'static str, next: ProcessState, reason: impl Into<String>) -> Self {
        Self {
            rule,
            next,
            updates: Vec::new(),
            reason: reason.into(),
        }
    }

    fn with(mut self, update: VariableUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn apply_to(&self, vars: &mut ProcessVariables) {
        for update in &self.updates {
            update.apply(vars);
        }
    }
}

/// Inventory response → AssignParts / PurchaseOrder / FixDetails.
pub fn inventory_decision(vars: &ProcessVariables, response: &ParsedResponse) -> Decision {
    const RULE: &str = "inventory";
    match response {
        ParsedResponse::InventorySuccess {
            available_quantity, ..
        } => {
            let available = *available_quantity;
            if available >= vars.quantity {
                Decision::new(
                    RULE,
                    ProcessState::AssignParts,
                    format!("available {} covers requested {}", available, vars.quantity),
                )
                .with(VariableUpdate::PartsAvailable(Some(true)))
                .with(VariableUpdate::OrderQuantity(None))
            } else {
                let shortfall = vars.quantity - available.max(0);
                Decision::new(
                    RULE,
                    ProcessState::PurchaseOrder,
                    format!(
                        "available {} short of requested {}, ordering {}",
                        available, vars.quantity, shortfall
                    ),
                )
                .with(VariableUpdate::PartsAvailable(Some(false)))
                .with(VariableUpdate::OrderQuantity(Some(shortfall)))
            }
        }
        other => Decision::new(
            RULE,
            ProcessState::FixDetails,
            format!("inventory response {}", other.kind()),
        )
        .with(VariableUpdate::PartsAvailable(None)),
    }
}

/// Assign response → Completed / RequestInventory (retry) / FixDetails.
pub fn assign_decision(_vars: &ProcessVariables, response: &ParsedResponse) -> Decision {
    const RULE: &str = "assign";
    match response {
        ParsedResponse::AssignSuccess { reservation_id, .. } => Decision::new(
            RULE,
            ProcessState::Completed,
            format!("reservation {}", reservation_id),
        ),
        ParsedResponse::Failure { reason } => Decision::new(
            RULE,
            ProcessState::RequestInventory,
            format!("assignment refused ({}), re-checking inventory", reason),
        ),
        other => Decision::new(
            RULE,
            ProcessState::FixDetails,
            format!("assign response {}", other.kind()),
        ),
    }
}

/// Any purchase-order result is taken as acknowledgement.
pub fn purchase_order_decision(response: &ParsedResponse) -> Decision {
    let reason = match response {
        ParsedResponse::PurchaseOrderAck { receiver_id } => {
            format!("purchase order received by {}", receiver_id)
        }
        other => format!("purchase order acknowledged ({})", other.kind()),
    };
    Decision::new("purchase_order", ProcessState::AwaitMaterials, reason)
}

/// Fold a completed correction into the variables and re-check inventory.
pub fn correction_decision(correction: &Correction) -> Decision {
    Decision::new(
        "correction",
        ProcessState::RequestInventory,
        format!(
            "corrected to part {} x{}",
            correction.part_code, correction.quantity
        ),
    )
    .with(VariableUpdate::PartCode(correction.part_code.clone()))
    .with(VariableUpdate::Quantity(correction.quantity))
    .with(VariableUpdate::BranchCode(correction.branch_code.clone()))
    .with(VariableUpdate::PartsAvailable(None))
}

pub fn materials_received_decision() -> Decision {
    Decision::new(
        "materials_received",
        ProcessState::RequestInventory,
        "materials received, re-checking inventory",
    )
}
