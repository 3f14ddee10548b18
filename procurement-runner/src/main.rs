//! Procurement Runner
//!
//! Plays a scenario of repair requests against the procurement engine with a
//! simulated inventory/purchasing backend, then reports where every instance
//! ended up.
//!
//! Usage:
//! ```bash
//! procurement-runner                              # bundled scenario
//! procurement-runner --config my-scenario.yaml
//! RUST_LOG=procurement_core=trace procurement-runner
//! ```

mod backend;
mod scenario;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use procurement_core::{
    CallWorker, ChannelCallCollaborator, Dispatcher, InstanceId, LoggingTaskCollaborator,
    MemoryStore, PendingKind,
};

use crate::backend::{run_restocker, SimulatedBackend};
use crate::scenario::RunnerConfig;

pub(crate) const DEFAULT_CONFIG: &str = include_str!("../config/procurement.yaml");

const POLL_INTERVAL_MS: u64 = 20;

/// Parts-procurement scenario runner
#[derive(Parser, Debug)]
#[command(name = "procurement-runner")]
#[command(about = "Run repair requests through the parts-procurement process")]
struct Args {
    /// Runner configuration (YAML). Uses the bundled scenario when omitted.
    #[arg(long, short = 'c', env = "PROCUREMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Give up waiting for instances to settle after this many seconds
    #[arg(long, short = 't', default_value_t = 30)]
    timeout_secs: u64,

    /// Print the audit trail of every instance
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RunnerConfig::load_from_file(path)?,
        None => RunnerConfig::from_yaml_str(DEFAULT_CONFIG)?,
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.engine.logging.filter)
            .with_context(|| format!("Invalid log filter '{}'", config.engine.logging.filter))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = &config.engine;
    let store = Arc::new(MemoryStore::new());
    let (calls, calls_rx) = ChannelCallCollaborator::new(engine.dispatch.call_queue_capacity);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        Arc::new(calls),
        Arc::new(LoggingTaskCollaborator),
        engine.process.clone(),
    ));

    let (restock_tx, restock_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(SimulatedBackend::new(
        &engine.process,
        config.scenario.stock.clone(),
        restock_tx,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = CallWorker::new(
        calls_rx,
        backend.clone(),
        dispatcher.clone(),
        engine.dispatch.max_inflight_calls,
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));
    let restocker_handle = tokio::spawn(run_restocker(
        restock_rx,
        backend.clone(),
        dispatcher.clone(),
        Duration::from_millis(config.scenario.restock_delay_ms),
        shutdown_rx,
    ));

    let mut started: Vec<(InstanceId, String)> = Vec::new();
    for request in &config.scenario.requests {
        match dispatcher.start(request.to_start_request()).await {
            Ok(id) => started.push((id, request.part_code.clone())),
            Err(err) => warn!(part_code = %request.part_code, error = %err, "Request rejected"),
        }
    }
    info!(count = started.len(), "Repair requests started");

    let settled = wait_until_settled(&dispatcher, Duration::from_secs(args.timeout_secs)).await;
    if !settled {
        warn!(
            active = dispatcher.active_count(),
            "Timed out waiting for instances to settle"
        );
    }

    report(&dispatcher, &started, args.verbose).await?;
    info!(instances = store.instance_count(), "Event log written");

    shutdown_tx.send(true).context("Stopping workers")?;
    worker_handle.await.context("Call worker panicked")?;
    restocker_handle.await.context("Restocker panicked")?;
    Ok(())
}

/// Wait until every live instance is blocked on a correction task.
async fn wait_until_settled(dispatcher: &Dispatcher, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let active = dispatcher.active_instances().await;
        if active
            .iter()
            .all(|s| s.pending_kind() == Some(PendingKind::HumanCorrection))
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

async fn report(
    dispatcher: &Dispatcher,
    started: &[(InstanceId, String)],
    verbose: bool,
) -> Result<()> {
    println!();
    println!("{:<38} {:<12} {:<18} {}", "INSTANCE", "PART", "STATE", "LAST RESPONSE");
    for (id, part_code) in started {
        let snapshot = dispatcher.status(*id).await?;
        println!(
            "{:<38} {:<12} {:<18} {}",
            id.to_string(),
            part_code,
            snapshot.state(),
            snapshot.instance.variables.ws_json_response
        );
        if verbose {
            for event in dispatcher.events(*id).await? {
                println!("    {}", serde_json::to_string(&event)?);
            }
        }
    }

    let tasks = dispatcher.correction_tasks().await;
    if !tasks.is_empty() {
        println!();
        println!("Open correction tasks:");
        for view in tasks {
            println!(
                "  task {} (instance {}): part {} x{}, branch {}, phase {}",
                view.task.task_id,
                view.instance_id,
                view.part_code,
                view.quantity,
                view.branch_code.as_deref().unwrap_or("-"),
                view.task.phase.as_str()
            );
        }
    }
    Ok(())
}
