//! Simulated inventory, reservation and purchasing services.
//!
//! Calls are routed by the configured endpoint handles. A purchase order
//! schedules a restock; once it lands and the ordering instance is waiting
//! for it, the backend sends `receivedMaterials`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use procurement_core::config::ProcessDefaults;
use procurement_core::{
    CallRequest, Dispatcher, InstanceId, PendingKind, ProcessState, RestClient,
    RECEIVED_MATERIALS,
};

const SIGNAL_POLL_MS: u64 = 10;

/// A purchase order waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restock {
    pub instance_id: InstanceId,
    pub part_code: String,
    pub quantity: i64,
}

pub struct SimulatedBackend {
    inventory_url: String,
    assign_url: String,
    purchase_order_url: String,
    stock: Mutex<HashMap<String, i64>>,
    restocks: mpsc::UnboundedSender<Restock>,
}

impl SimulatedBackend {
    pub fn new(
        endpoints: &ProcessDefaults,
        stock: BTreeMap<String, i64>,
        restocks: mpsc::UnboundedSender<Restock>,
    ) -> Self {
        Self {
            inventory_url: endpoints.get_inventory_url.clone(),
            assign_url: endpoints.assign_parts_url.clone(),
            purchase_order_url: endpoints.create_purchase_order_url.clone(),
            stock: Mutex::new(stock.into_iter().collect()),
            restocks,
        }
    }

    pub fn on_hand(&self, part_code: &str) -> Option<i64> {
        self.stock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(part_code)
            .copied()
    }

    pub fn deliver(&self, restock: &Restock) {
        let mut stock = self.stock.lock().unwrap_or_else(PoisonError::into_inner);
        *stock.entry(restock.part_code.clone()).or_insert(0) += restock.quantity;
    }

    fn inventory(&self, part_code: &str) -> Value {
        match self.on_hand(part_code) {
            Some(available) => json!({ "partCode": part_code, "availableQuantity": available }),
            None => json!({ "Fail": format!("unknown part {}", part_code) }),
        }
    }

    fn assign(&self, part_code: &str, quantity: i64) -> Value {
        let mut stock = self.stock.lock().unwrap_or_else(PoisonError::into_inner);
        match stock.get_mut(part_code) {
            Some(on_hand) if *on_hand >= quantity => {
                *on_hand -= quantity;
                json!({ "reservationId": Uuid::now_v7().to_string(), "remainingParts": *on_hand })
            }
            _ => json!({ "responseCode": "NOK" }),
        }
    }

    fn purchase_order(&self, request: &CallRequest, part_code: &str, quantity: i64) -> Value {
        let restock = Restock {
            instance_id: request.call_id.instance_id,
            part_code: part_code.to_string(),
            quantity,
        };
        if self.restocks.send(restock).is_err() {
            warn!(part_code, "Restock channel closed; order will never arrive");
        }
        json!({ "purchaseOrderReceiverId": format!("PO-{}", request.call_id) })
    }
}

#[async_trait]
impl RestClient for SimulatedBackend {
    async fn execute(&self, request: &CallRequest) -> Result<Option<String>> {
        let body: Value = serde_json::from_str(&request.body)?;
        let part_code = body["partCode"].as_str().unwrap_or_default();
        let quantity = body["quantity"].as_i64().unwrap_or(0);

        let reply = if request.url == self.inventory_url {
            self.inventory(part_code)
        } else if request.url == self.assign_url {
            self.assign(part_code, quantity)
        } else if request.url == self.purchase_order_url {
            self.purchase_order(request, part_code, quantity)
        } else {
            return Err(anyhow!("no simulated endpoint at '{}'", request.url));
        };

        debug!(
            call_id = %request.call_id,
            method = %request.method,
            url = %request.url,
            reply = %reply,
            "Simulated call"
        );
        Ok(Some(reply.to_string()))
    }
}

/// Deliver restocks after `delay`, then signal the ordering instance once it
/// waits on the signal. With a short delay the purchase-order result may not
/// have been applied yet when the restock lands.
pub async fn run_restocker(
    mut rx: mpsc::UnboundedReceiver<Restock>,
    backend: Arc<SimulatedBackend>,
    dispatcher: Arc<Dispatcher>,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let restock = tokio::select! {
            restock = rx.recv() => match restock {
                Some(restock) => restock,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        backend.deliver(&restock);
        info!(
            instance_id = %restock.instance_id,
            part_code = %restock.part_code,
            quantity = restock.quantity,
            "Materials delivered"
        );

        let waiting = tokio::select! {
            waiting = awaiting_materials(&dispatcher, restock.instance_id) => waiting,
            _ = shutdown.changed() => break,
        };
        if !waiting {
            warn!(instance_id = %restock.instance_id, "Instance no longer expects materials");
            continue;
        }
        if let Err(err) = dispatcher.signal(restock.instance_id, RECEIVED_MATERIALS).await {
            warn!(instance_id = %restock.instance_id, error = %err, "Signal not applied");
        }
    }
}

/// Poll until the instance waits on `receivedMaterials`. False once it has
/// left the purchase-order path or is gone.
async fn awaiting_materials(dispatcher: &Dispatcher, instance_id: InstanceId) -> bool {
    loop {
        let Ok(snapshot) = dispatcher.status(instance_id).await else {
            return false;
        };
        if snapshot.pending_kind() == Some(PendingKind::Signal) {
            return true;
        }
        if snapshot.state() != ProcessState::PurchaseOrder {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(SIGNAL_POLL_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurement_core::{
        CallCompletion, CallId, ChannelCallCollaborator, HttpMethod, LoggingTaskCollaborator,
        MemoryStore, ProcessVariables, StartRequest,
    };

    fn endpoints() -> ProcessDefaults {
        ProcessDefaults {
            get_inventory_url: "sim://inventory".to_string(),
            assign_parts_url: "sim://assign".to_string(),
            create_purchase_order_url: "sim://purchase-order".to_string(),
            ..Default::default()
        }
    }

    fn backend(stock: &[(&str, i64)]) -> (SimulatedBackend, mpsc::UnboundedReceiver<Restock>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stock = stock.iter().map(|(p, q)| (p.to_string(), *q)).collect();
        (SimulatedBackend::new(&endpoints(), stock, tx), rx)
    }

    fn call(url: &str, body: &str) -> CallRequest {
        CallRequest {
            call_id: CallId {
                instance_id: Uuid::now_v7(),
                seq: 1,
            },
            url: url.to_string(),
            method: HttpMethod::Post,
            body: body.to_string(),
        }
    }

    async fn reply(backend: &SimulatedBackend, url: &str, body: &str) -> Value {
        let raw = backend.execute(&call(url, body)).await.unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_inventory_known_and_unknown_parts() {
        let (backend, _rx) = backend(&[("A", 4)]);
        let known = reply(&backend, "sim://inventory", r#"{"partCode":"A"}"#).await;
        assert_eq!(known["availableQuantity"], 4);

        let unknown = reply(&backend, "sim://inventory", r#"{"partCode":"Q"}"#).await;
        assert!(unknown.get("Fail").is_some());
    }

    #[tokio::test]
    async fn test_assign_decrements_or_refuses() {
        let (backend, _rx) = backend(&[("A", 3)]);
        let ok = reply(&backend, "sim://assign", r#"{"partCode":"A","quantity":2}"#).await;
        assert_eq!(ok["remainingParts"], 1);
        assert!(ok["reservationId"].is_string());

        let refused = reply(&backend, "sim://assign", r#"{"partCode":"A","quantity":2}"#).await;
        assert_eq!(refused["responseCode"], "NOK");
        assert_eq!(backend.on_hand("A"), Some(1));
    }

    #[tokio::test]
    async fn test_purchase_order_schedules_restock() {
        let (backend, mut rx) = backend(&[("A", 0)]);
        let request = call("sim://purchase-order", r#"{"partCode":"A","quantity":5}"#);
        backend.execute(&request).await.unwrap();

        let restock = rx.recv().await.unwrap();
        assert_eq!(restock.instance_id, request.call_id.instance_id);
        assert_eq!(restock.quantity, 5);

        backend.deliver(&restock);
        assert_eq!(backend.on_hand("A"), Some(5));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_an_error() {
        let (backend, _rx) = backend(&[]);
        assert!(backend
            .execute(&call("sim://elsewhere", r#"{"partCode":"A"}"#))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_restock_signal_waits_for_purchase_order_result() {
        let (calls, mut calls_rx) = ChannelCallCollaborator::new(8);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(calls),
            Arc::new(LoggingTaskCollaborator),
            endpoints(),
        ));
        let (backend, _rx) = backend(&[("A", 0)]);
        let backend = Arc::new(backend);

        let id = dispatcher
            .start(StartRequest {
                process_id: None,
                variables: ProcessVariables {
                    part_code: "A".to_string(),
                    quantity: 2,
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        let inventory = calls_rx.recv().await.unwrap();
        dispatcher
            .complete_call(CallCompletion {
                call_id: inventory.call_id,
                result: Some(r#"{"partCode":"A","availableQuantity":0}"#.to_string()),
            })
            .await
            .unwrap();
        let po = calls_rx.recv().await.unwrap();

        let (restock_tx, restock_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_restocker(
            restock_rx,
            backend.clone(),
            dispatcher.clone(),
            Duration::ZERO,
            shutdown_rx,
        ));
        restock_tx
            .send(Restock {
                instance_id: id,
                part_code: "A".to_string(),
                quantity: 2,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.on_hand("A"), Some(2));
        assert_eq!(
            dispatcher.status(id).await.unwrap().state(),
            ProcessState::PurchaseOrder
        );

        dispatcher
            .complete_call(CallCompletion {
                call_id: po.call_id,
                result: Some(r#"{"purchaseOrderReceiverId":"PO-1"}"#.to_string()),
            })
            .await
            .unwrap();

        let again = tokio::time::timeout(Duration::from_secs(1), calls_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.url, "sim://inventory");
        assert_eq!(
            dispatcher.status(id).await.unwrap().state(),
            ProcessState::RequestInventory
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
