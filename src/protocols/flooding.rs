use std::collections::BTreeMap;

use crate::protocols::base::RoutingAlgorithm;

/// Pure flooding keeps no routing state: the forwarder relays every packet
/// to all neighbors except the previous hop, and dedup plus TTL bound the
/// storm. There is never a next hop to offer.
pub struct Flooding;

impl RoutingAlgorithm for Flooding {
    fn name(&self) -> &'static str {
        "flooding"
    }

    fn on_init(&mut self, _me: &str, _neighbors: &BTreeMap<String, f64>) {}

    fn next_hop(&self, _dest: &str) -> Option<String> {
        None
    }
}
