use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::protocols::base::{InfoOutcome, RoutingAlgorithm};

#[derive(Debug, Clone, PartialEq)]
pub struct DvEntry {
    pub cost: f64,
    pub next: Option<String>,
}

/// Distance-Vector routing: each neighbor periodically advertises its full
/// vector and the node relaxes every destination over its direct links.
/// The table is rebuilt from scratch on every recompute, so withdrawn or
/// purged neighbors take their routes with them.
pub struct DistanceVector {
    me: String,
    configured: BTreeSet<String>,
    cost: BTreeMap<String, f64>,
    dv: BTreeMap<String, DvEntry>,
    recv: BTreeMap<String, BTreeMap<String, f64>>,
}

impl DistanceVector {
    pub fn new() -> Self {
        Self {
            me: String::new(),
            configured: BTreeSet::new(),
            cost: BTreeMap::new(),
            dv: BTreeMap::new(),
            recv: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    fn entry(&self, dest: &str) -> Option<&DvEntry> {
        self.dv.get(dest)
    }
}

impl Default for DistanceVector {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_vector(raw: &Map<String, Value>) -> BTreeMap<String, f64> {
    raw.iter()
        .filter_map(|(dest, cost)| {
            let cost = cost.as_f64()?;
            // advertised costs must be finite and non-negative
            if !cost.is_finite() || cost < 0.0 {
                return None;
            }
            Some((dest.clone(), cost))
        })
        .collect()
}

impl RoutingAlgorithm for DistanceVector {
    fn name(&self) -> &'static str {
        "dvr"
    }

    fn on_init(&mut self, me: &str, neighbors: &BTreeMap<String, f64>) {
        self.me = me.to_string();
        self.configured = neighbors.keys().cloned().collect();
        self.cost = neighbors.clone();
        self.dv.clear();
        self.recv.clear();
        self.dv.insert(
            self.me.clone(),
            DvEntry {
                cost: 0.0,
                next: None,
            },
        );
    }

    fn on_hello(&mut self, neighbor: &str, metric: f64) -> bool {
        if self.cost.contains_key(neighbor) {
            return false;
        }
        self.cost.insert(neighbor.to_string(), metric);
        true
    }

    fn on_info(&mut self, from: &str, payload: &Value) -> InfoOutcome {
        let Some(vector) = payload.get("vector").and_then(Value::as_object) else {
            return InfoOutcome::unchanged();
        };
        let parsed = parse_vector(vector);
        let changed = self.recv.get(from) != Some(&parsed);
        self.recv.insert(from.to_string(), parsed);
        InfoOutcome {
            changed,
            origins: vec![from.to_string()],
        }
    }

    fn recompute(&mut self) {
        let mut destinations: BTreeSet<String> = self.dv.keys().cloned().collect();
        destinations.insert(self.me.clone());
        for vector in self.recv.values() {
            destinations.extend(vector.keys().cloned());
        }

        let mut next_dv: BTreeMap<String, DvEntry> = BTreeMap::new();
        next_dv.insert(
            self.me.clone(),
            DvEntry {
                cost: 0.0,
                next: None,
            },
        );

        for dest in destinations {
            if dest == self.me {
                continue;
            }
            // relax over every neighbor; strictly smaller wins, ties keep
            // the earlier (deterministically ordered) candidate
            let mut best: Option<(f64, String)> = None;
            for (neighbor, link_cost) in &self.cost {
                let Some(advertised) = self.recv.get(neighbor).and_then(|v| v.get(&dest)) else {
                    continue;
                };
                let candidate = link_cost + advertised;
                if best
                    .as_ref()
                    .is_none_or(|(best_cost, _)| candidate < *best_cost)
                {
                    best = Some((candidate, neighbor.clone()));
                }
            }
            if let Some((cost, next)) = best {
                next_dv.insert(
                    dest,
                    DvEntry {
                        cost,
                        next: Some(next),
                    },
                );
            }
        }

        self.dv = next_dv;
    }

    fn next_hop(&self, dest: &str) -> Option<String> {
        let entry = self.dv.get(dest)?;
        if !entry.cost.is_finite() {
            return None;
        }
        entry.next.clone()
    }

    fn build_info(&mut self) -> Option<Value> {
        let vector: Map<String, Value> = self
            .dv
            .iter()
            .filter(|(_, entry)| entry.cost.is_finite())
            .map(|(dest, entry)| (dest.clone(), json!(entry.cost)))
            .collect();
        Some(json!({ "vector": vector }))
    }

    fn purge_node(&mut self, node: &str) -> bool {
        let mut changed = self.recv.remove(node).is_some();
        if !self.configured.contains(node) {
            changed |= self.cost.remove(node).is_some();
        }
        changed
    }
}
