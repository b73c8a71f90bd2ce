use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::protocols::base::{InfoOutcome, RoutingAlgorithm};
use crate::protocols::route_compute::{next_hops, shortest_paths, Graph};

/// Link-State Routing. Nodes are born with an empty database and populate
/// their own entry only as hellos confirm each configured neighbor. Remote
/// entries arrive through flooded advertisements in either of two wire
/// dialects (deduplicated per origin by sequence number) or through flooded
/// adjacency messages describing a single observed edge.
pub struct LinkState {
    me: String,
    neighbors_costs: BTreeMap<String, f64>,
    lsdb: BTreeMap<String, BTreeMap<String, f64>>,
    seen_seq: BTreeMap<String, i64>,
    seq: i64,
    dist: BTreeMap<String, f64>,
    next: BTreeMap<String, Option<String>>,
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            me: String::new(),
            neighbors_costs: BTreeMap::new(),
            lsdb: BTreeMap::new(),
            seen_seq: BTreeMap::new(),
            seq: 0,
            dist: BTreeMap::new(),
            next: BTreeMap::new(),
        }
    }

    fn is_neighbor_known(&self, neighbor: &str) -> bool {
        self.neighbors_costs.contains_key(neighbor)
    }

    /// Install `neighbor` in the node's own LSDB entry. Returns true when
    /// the entry changed.
    fn mark_neighbor_active(&mut self, neighbor: &str, metric: f64) -> bool {
        let entry = self.lsdb.entry(self.me.clone()).or_default();
        let old = entry.get(neighbor);
        if old.is_some_and(|current| *current == metric) {
            return false;
        }
        entry.insert(neighbor.to_string(), metric);
        true
    }

    fn apply_entry(&mut self, origin: &str, links: BTreeMap<String, f64>) -> bool {
        let entry = self.lsdb.entry(origin.to_string()).or_default();
        if *entry == links {
            return false;
        }
        *entry = links;
        true
    }

    fn build_graph(&self) -> Graph {
        let mut graph = Graph::new(true);
        graph.add_node(&self.me);
        for (origin, links) in &self.lsdb {
            for (neighbor, cost) in links {
                graph.add_edge(origin, neighbor, *cost);
            }
        }
        graph
    }

    fn apply_batch(&mut self, advertised: &Map<String, Value>) -> InfoOutcome {
        let mut outcome = InfoOutcome::unchanged();
        for (origin, links) in advertised {
            let Some(links) = links.as_object() else {
                continue;
            };
            let parsed = parse_links(links);
            if self.apply_entry(origin, parsed) {
                outcome.changed = true;
            }
            outcome.origins.push(origin.clone());
        }
        outcome
    }

    fn apply_singleton(&mut self, from: &str, body: &Map<String, Value>) -> InfoOutcome {
        let origin = body
            .get("self")
            .and_then(Value::as_str)
            .unwrap_or(from)
            .to_string();
        let seq = body.get("seq").and_then(Value::as_i64).unwrap_or(-1);
        if seq <= self.seen_seq.get(&origin).copied().unwrap_or(i64::MIN) {
            return InfoOutcome::unchanged();
        }
        self.seen_seq.insert(origin.clone(), seq);

        let links = body
            .get("neighbors")
            .and_then(Value::as_object)
            .map(parse_links)
            .unwrap_or_default();
        let changed = self.apply_entry(&origin, links);
        InfoOutcome {
            changed,
            origins: vec![origin],
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_links(raw: &Map<String, Value>) -> BTreeMap<String, f64> {
    raw.iter()
        .filter_map(|(neighbor, cost)| {
            let cost = cost.as_f64()?;
            if !cost.is_finite() || cost < 0.0 {
                return None;
            }
            Some((neighbor.clone(), cost))
        })
        .collect()
}

impl RoutingAlgorithm for LinkState {
    fn name(&self) -> &'static str {
        "lsr"
    }

    fn on_init(&mut self, me: &str, neighbors: &BTreeMap<String, f64>) {
        self.me = me.to_string();
        self.neighbors_costs = neighbors.clone();
        // born empty: lsdb[me] stays absent until hellos confirm neighbors
        self.lsdb.clear();
        self.seen_seq.clear();
        self.dist.clear();
        self.next.clear();
    }

    fn on_hello(&mut self, neighbor: &str, metric: f64) -> bool {
        if !self.is_neighbor_known(neighbor) {
            return false;
        }
        self.neighbors_costs.insert(neighbor.to_string(), metric);
        let changed = self.mark_neighbor_active(neighbor, metric);
        if changed {
            self.seq += 1;
        }
        changed
    }

    fn on_info(&mut self, from: &str, payload: &Value) -> InfoOutcome {
        // an advertisement may arrive wrapped as {"lsp": ...}
        let body = payload.get("lsp").unwrap_or(payload);
        let Some(body) = body.as_object() else {
            return InfoOutcome::unchanged();
        };

        if let Some(advertised) = body.get("lsdb").and_then(Value::as_object) {
            return self.apply_batch(advertised);
        }
        if body.contains_key("self") || body.contains_key("neighbors") {
            return self.apply_singleton(from, body);
        }
        InfoOutcome::unchanged()
    }

    fn on_message(&mut self, src: &str, dst: &str, cost: f64) -> bool {
        if !cost.is_finite() || cost < 0.0 {
            return false;
        }
        let mut changed = false;
        for (a, b) in [(src, dst), (dst, src)] {
            let entry = self.lsdb.entry(a.to_string()).or_default();
            if entry.get(b) != Some(&cost) {
                entry.insert(b.to_string(), cost);
                changed = true;
            }
        }
        if changed {
            debug!("{} learned link {} <-> {} cost={}", self.me, src, dst, cost);
        }
        changed
    }

    fn recompute(&mut self) {
        let graph = self.build_graph();
        let result = shortest_paths(&graph, &self.me);
        self.next = next_hops(&result.prev, &self.me);
        self.dist = result.dist;
    }

    fn next_hop(&self, dest: &str) -> Option<String> {
        self.next.get(dest).cloned().flatten()
    }

    fn build_info(&mut self) -> Option<Value> {
        self.seq += 1;
        let live_links: Map<String, Value> = self
            .lsdb
            .get(&self.me)
            .map(|links| {
                links
                    .iter()
                    .map(|(neighbor, cost)| (neighbor.clone(), json!(cost)))
                    .collect()
            })
            .unwrap_or_default();
        Some(json!({
            "self": self.me,
            "neighbors": live_links,
            "seq": self.seq,
        }))
    }

    fn purge_node(&mut self, node: &str) -> bool {
        let mut changed = self.lsdb.remove(node).is_some();
        for links in self.lsdb.values_mut() {
            changed |= links.remove(node).is_some();
        }
        // a restarted origin may come back with a reset sequence
        self.seen_seq.remove(node);
        changed
    }

    fn known_origins(&self) -> Vec<String> {
        self.lsdb
            .keys()
            .filter(|origin| *origin != &self.me)
            .cloned()
            .collect()
    }

    fn learns_adjacency(&self) -> bool {
        true
    }

    fn floods_info(&self) -> bool {
        true
    }
}
