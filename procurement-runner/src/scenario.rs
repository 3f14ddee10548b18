//! Runner configuration: engine settings plus the scenario to play.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use procurement_core::{EngineConfig, ProcessVariables, StartRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scenario: Scenario,
}

impl RunnerConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Parsing runner configuration")
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Initial stock per part code. Parts not listed are unknown to the
    /// inventory service.
    pub stock: BTreeMap<String, i64>,
    /// Delay between a purchase order and the matching restock.
    pub restock_delay_ms: u64,
    pub requests: Vec<RepairRequest>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            stock: BTreeMap::new(),
            restock_delay_ms: 200,
            requests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRequest {
    #[serde(default)]
    pub process_id: Option<String>,
    #[serde(default)]
    pub repair_request_id: Option<String>,
    #[serde(default)]
    pub branch_code: Option<String>,
    pub part_code: String,
    pub quantity: i64,
}

impl RepairRequest {
    pub fn to_start_request(&self) -> StartRequest {
        StartRequest {
            process_id: self.process_id.clone(),
            variables: ProcessVariables {
                repair_request_id: self.repair_request_id.clone(),
                branch_code: self.branch_code.clone(),
                part_code: self.part_code.clone(),
                quantity: self.quantity,
                ..Default::default()
            },
        }
    }
}
