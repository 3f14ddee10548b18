//! Engine configuration: load from YAML, fill start defaults.
//!
//! Every section is optional in the file; missing sections and fields fall
//! back to `Default`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{ProcessVariables, ProcessVersion};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Root engine configuration loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub process: ProcessDefaults,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Parsing engine configuration")
    }

    /// Load from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
    }
}

/// Defaults applied when an instance is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDefaults {
    /// Process id used when a start request names none.
    pub process_id: String,
    pub get_inventory_url: String,
    pub assign_parts_url: String,
    pub create_purchase_order_url: String,
}

impl Default for ProcessDefaults {
    fn default() -> Self {
        Self {
            process_id: ProcessVersion::default().process_id().to_string(),
            get_inventory_url: String::new(),
            assign_parts_url: String::new(),
            create_purchase_order_url: String::new(),
        }
    }
}

impl ProcessDefaults {
    /// Fill empty endpoint handles from the configured defaults.
    pub fn fill(&self, vars: &mut ProcessVariables) {
        fill_if_empty(&mut vars.get_inventory_url, &self.get_inventory_url);
        fill_if_empty(&mut vars.assign_parts_url, &self.assign_parts_url);
        fill_if_empty(
            &mut vars.create_purchase_order_url,
            &self.create_purchase_order_url,
        );
    }
}

fn fill_if_empty(slot: &mut String, default: &str) {
    if slot.is_empty() {
        *slot = default.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bound of the outbound call queue.
    pub call_queue_capacity: usize,
    /// Calls the worker executes concurrently.
    pub max_inflight_calls: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_queue_capacity: 256,
            max_inflight_calls: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
