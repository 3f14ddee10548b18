//! Parts-procurement workflow engine.
//!
//! One process, many instances: check inventory, reserve parts or raise a
//! purchase order and wait for restock, with a human correction task when an
//! external call comes back unusable.
//!
//! - [`machine`]: authoritative state of one instance
//! - [`dispatcher`]: public entry point, routes triggers and pending actions
//! - [`worker`]: executes outbound calls through a [`worker::RestClient`]

pub mod collaborator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod human_task;
pub mod machine;
pub mod payload;
pub mod registry;
pub mod rules;
pub mod store;
pub mod store_memory;
pub mod topology;
pub mod types;
pub mod worker;

pub use collaborator::{
    CallCollaborator, ChannelCallCollaborator, ChannelTaskCollaborator, LoggingTaskCollaborator,
    TaskCollaborator,
};
pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use error::ProcessError;
pub use events::RuntimeEvent;
pub use human_task::{HumanTask, TaskPhase};
pub use machine::{ProcessMachine, Trigger};
pub use store::ProcessStore;
pub use store_memory::MemoryStore;
pub use types::*;
pub use worker::{CallWorker, RestClient};
