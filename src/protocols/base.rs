use std::collections::BTreeMap;

use serde_json::Value;

/// Result of applying a routing advertisement: whether any table entry
/// changed (the caller recomputes) and which origins were heard from (the
/// caller refreshes their liveness clocks).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InfoOutcome {
    pub changed: bool,
    pub origins: Vec<String>,
}

impl InfoOutcome {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Capability set shared by every routing discipline. Hooks report whether
/// state changed; the node loop is the single caller of `recompute`, so the
/// next-hop table is rebuilt and swapped in exactly once per batch of
/// events.
pub trait RoutingAlgorithm: Send {
    fn name(&self) -> &'static str;

    fn on_init(&mut self, me: &str, neighbors: &BTreeMap<String, f64>);

    /// A confirmed hello from a directly configured neighbor.
    fn on_hello(&mut self, neighbor: &str, metric: f64) -> bool {
        let _ = (neighbor, metric);
        false
    }

    /// A routing advertisement relayed by `from`.
    fn on_info(&mut self, from: &str, payload: &Value) -> InfoOutcome {
        let _ = (from, payload);
        InfoOutcome::unchanged()
    }

    /// A flooded adjacency observation: the edge `src -> dst` exists at
    /// `cost`.
    fn on_message(&mut self, src: &str, dst: &str, cost: f64) -> bool {
        let _ = (src, dst, cost);
        false
    }

    fn recompute(&mut self) {}

    fn next_hop(&self, dest: &str) -> Option<String>;

    /// Periodic advertisement payload; `None` disables the info emitter.
    fn build_info(&mut self) -> Option<Value> {
        None
    }

    /// Drop every trace of a dead node. Returns true when tables changed.
    fn purge_node(&mut self, node: &str) -> bool {
        let _ = node;
        false
    }

    /// Non-local nodes currently present in the routing database, for the
    /// aging sweep.
    fn known_origins(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the discipline learns topology from flooded adjacency
    /// messages (and should flood one on first neighbor confirmation).
    fn learns_adjacency(&self) -> bool {
        false
    }

    /// Whether periodic info payloads are flooded (wrapped as an LSP)
    /// rather than sent point-to-point to each active neighbor.
    fn floods_info(&self) -> bool {
        false
    }
}
