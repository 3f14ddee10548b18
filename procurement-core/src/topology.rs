//! The process model as an explicit transition graph.
//!
//! Every state change the machine makes must be an edge here.

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::ProcessState;

/// (from, to) pairs of the parts-procurement process.
pub const TRANSITIONS: &[(ProcessState, ProcessState)] = &[
    (ProcessState::RequestInventory, ProcessState::AssignParts),
    (ProcessState::RequestInventory, ProcessState::PurchaseOrder),
    (ProcessState::RequestInventory, ProcessState::FixDetails),
    (ProcessState::PurchaseOrder, ProcessState::AwaitMaterials),
    (ProcessState::AwaitMaterials, ProcessState::RequestInventory),
    (ProcessState::AssignParts, ProcessState::Completed),
    (ProcessState::AssignParts, ProcessState::RequestInventory),
    (ProcessState::AssignParts, ProcessState::FixDetails),
    (ProcessState::FixDetails, ProcessState::RequestInventory),
];

pub struct ProcessTopology {
    graph: DiGraph<ProcessState, ()>,
    nodes: HashMap<ProcessState, NodeIndex>,
}

impl ProcessTopology {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let nodes: HashMap<ProcessState, NodeIndex> = ProcessState::ALL
            .iter()
            .map(|state| (*state, graph.add_node(*state)))
            .collect();
        for (from, to) in TRANSITIONS {
            graph.add_edge(nodes[from], nodes[to], ());
        }
        Self { graph, nodes }
    }

    pub fn initial(&self) -> ProcessState {
        ProcessState::RequestInventory
    }

    pub fn allows(&self, from: ProcessState, to: ProcessState) -> bool {
        self.graph.contains_edge(self.nodes[&from], self.nodes[&to])
    }

    pub fn successors(&self, state: ProcessState) -> Vec<ProcessState> {
        let mut next: Vec<ProcessState> = self
            .graph
            .neighbors_directed(self.nodes[&state], Direction::Outgoing)
            .map(|idx| self.graph[idx])
            .collect();
        next.sort();
        next
    }

    /// All states reachable from `state`, including itself.
    pub fn reachable_from(&self, state: ProcessState) -> Vec<ProcessState> {
        let mut bfs = Bfs::new(&self.graph, self.nodes[&state]);
        let mut seen = Vec::new();
        while let Some(idx) = bfs.next(&self.graph) {
            seen.push(self.graph[idx]);
        }
        seen.sort();
        seen
    }

    /// Whether `Completed` can still be reached from `state`.
    pub fn can_complete_from(&self, state: ProcessState) -> bool {
        has_path_connecting(
            &self.graph,
            self.nodes[&state],
            self.nodes[&ProcessState::Completed],
            None,
        )
    }
}

impl Default for ProcessTopology {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared topology instance.
pub fn topology() -> &'static ProcessTopology {
    static TOPOLOGY: OnceLock<ProcessTopology> = OnceLock::new();
    TOPOLOGY.get_or_init(ProcessTopology::new)
}
