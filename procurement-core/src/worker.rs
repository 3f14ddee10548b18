//! CallWorker: drains the outbound call queue and feeds results back.
//!
//! Each request runs on its own task. A semaphore permit is taken before the
//! next request is read, so at most `max_inflight` calls leave the queue and
//! the rest wait there against its capacity. Whatever the
//! client returns (or fails with) goes back through
//! `Dispatcher::complete_call`; a client error becomes a null result.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::types::{CallCompletion, CallRequest};

/// Executes one outbound call. `Ok(None)` means the endpoint sent no body.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn execute(&self, request: &CallRequest) -> Result<Option<String>>;
}

pub struct CallWorker {
    rx: mpsc::Receiver<CallRequest>,
    client: Arc<dyn RestClient>,
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
}

impl CallWorker {
    pub fn new(
        rx: mpsc::Receiver<CallRequest>,
        client: Arc<dyn RestClient>,
        dispatcher: Arc<Dispatcher>,
        max_inflight: usize,
    ) -> Self {
        Self {
            rx,
            client,
            dispatcher,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Run until the shutdown flag is raised or the queue closes. Calls still
    /// in flight at shutdown are cancelled; their instances keep waiting.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Call worker started");
        let mut inflight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                Some(_) = inflight.join_next(), if !inflight.is_empty() => continue,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                request = self.rx.recv() => {
                    let Some(request) = request else {
                        debug!("Call queue closed");
                        break;
                    };
                    inflight.spawn(execute_call(
                        request,
                        self.client.clone(),
                        self.dispatcher.clone(),
                        permit,
                    ));
                }
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        inflight.shutdown().await;
        info!("Call worker shutting down");
    }
}

async fn execute_call(
    request: CallRequest,
    client: Arc<dyn RestClient>,
    dispatcher: Arc<Dispatcher>,
    permit: OwnedSemaphorePermit,
) {
    let call_id = request.call_id;
    let result = match client.execute(&request).await {
        Ok(body) => body,
        Err(err) => {
            warn!(
                call_id = %call_id,
                url = %request.url,
                error = %format!("{err:#}"),
                "Outbound call failed, reporting empty result"
            );
            None
        }
    };
    drop(permit);

    if let Err(err) = dispatcher
        .complete_call(CallCompletion { call_id, result })
        .await
    {
        warn!(call_id = %call_id, error = %err, "Call result not applied");
    }
}
