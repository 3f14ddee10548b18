//! Request rendering and response classification.
//!
//! Rendered bodies are byte-exact: no whitespace, fixed key order. An absent
//! `repairRequestId` or `branchCode` renders as the string `"null"`, not a
//! JSON null.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ProcessVersion;

const ABSENT_STRING: &str = "null";

/// Classified collaborator response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsedResponse {
    InventorySuccess {
        part_code: String,
        available_quantity: i64,
    },
    /// `Fail` key present, or `responseCode == "NOK"`.
    Failure { reason: String },
    AssignSuccess {
        reservation_id: String,
        remaining_parts: Option<i64>,
    },
    PurchaseOrderAck { receiver_id: String },
    /// A JSON object with none of the recognised shapes.
    Unrecognized,
    /// Null, empty, not JSON, or not a JSON object.
    Unparsable,
}

impl ParsedResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InventorySuccess { .. } => "inventory_success",
            Self::Failure { .. } => "failure",
            Self::AssignSuccess { .. } => "assign_success",
            Self::PurchaseOrderAck { .. } => "purchase_order_ack",
            Self::Unrecognized => "unrecognized",
            Self::Unparsable => "unparsable",
        }
    }
}

/// `{"partCode":"<partCode>"}`
pub fn render_inventory_request(part_code: &str) -> String {
    format!("{{\"partCode\":{}}}", json_string(part_code))
}

/// `{"partCode":"<p>","quantity":<q>,"repairRequestId":"<r>","branchCode":"<b>"}`
pub fn render_assign_request(
    part_code: &str,
    quantity: i64,
    repair_request_id: Option<&str>,
    branch_code: Option<&str>,
) -> String {
    format!(
        "{{\"partCode\":{},\"quantity\":{},\"repairRequestId\":{},\"branchCode\":{}}}",
        json_string(part_code),
        quantity,
        json_string(repair_request_id.unwrap_or(ABSENT_STRING)),
        json_string(branch_code.unwrap_or(ABSENT_STRING)),
    )
}

/// Assign request as rendered by the given process revision.
pub fn render_assign_request_for(
    version: ProcessVersion,
    part_code: &str,
    quantity: i64,
    repair_request_id: Option<&str>,
    branch_code: Option<&str>,
) -> String {
    if version.renders_repair_fields() {
        render_assign_request(part_code, quantity, repair_request_id, branch_code)
    } else {
        format!(
            "{{\"partCode\":{},\"quantity\":{}}}",
            json_string(part_code),
            quantity
        )
    }
}

/// `{"partCode":"<p>","quantity":<shortfall>}`
pub fn render_purchase_order_request(part_code: &str, order_quantity: i64) -> String {
    format!(
        "{{\"partCode\":{},\"quantity\":{}}}",
        json_string(part_code),
        order_quantity
    )
}

/// Classify a collaborator result. Never fails; every malformed shape maps to
/// a variant.
pub fn parse_response(body: Option<&str>) -> ParsedResponse {
    let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) else {
        return ParsedResponse::Unparsable;
    };
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return ParsedResponse::Unparsable;
    };

    if let Some(fail) = obj.get("Fail") {
        return ParsedResponse::Failure {
            reason: text_of(fail),
        };
    }
    if obj.get("responseCode").and_then(Value::as_str) == Some("NOK") {
        return ParsedResponse::Failure {
            reason: "responseCode NOK".to_string(),
        };
    }
    if let Some(reservation) = obj.get("reservationId") {
        return ParsedResponse::AssignSuccess {
            reservation_id: text_of(reservation),
            remaining_parts: obj.get("remainingParts").and_then(Value::as_i64),
        };
    }
    if let Some(receiver) = obj.get("purchaseOrderReceiverId") {
        return ParsedResponse::PurchaseOrderAck {
            receiver_id: text_of(receiver),
        };
    }
    inventory_success(&obj).unwrap_or(ParsedResponse::Unrecognized)
}

fn inventory_success(obj: &Map<String, Value>) -> Option<ParsedResponse> {
    let part_code = obj.get("partCode")?.as_str()?;
    let available_quantity = obj.get("availableQuantity")?.as_i64()?;
    Some(ParsedResponse::InventorySuccess {
        part_code: part_code.to_string(),
        available_quantity,
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
