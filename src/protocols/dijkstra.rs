use std::collections::BTreeMap;

use crate::protocols::base::RoutingAlgorithm;
use crate::protocols::route_compute::{next_hops, shortest_paths, Graph};

/// Static shortest-path routing: the whole topology is loaded once from the
/// topology file and never exchanged. Hello and info traffic is ignored.
pub struct StaticDijkstra {
    me: String,
    graph: Graph,
    dist: BTreeMap<String, f64>,
    next: BTreeMap<String, Option<String>>,
}

impl StaticDijkstra {
    pub fn new(graph: Graph) -> Self {
        Self {
            me: String::new(),
            graph,
            dist: BTreeMap::new(),
            next: BTreeMap::new(),
        }
    }
}

impl RoutingAlgorithm for StaticDijkstra {
    fn name(&self) -> &'static str {
        "dijkstra"
    }

    fn on_init(&mut self, me: &str, _neighbors: &BTreeMap<String, f64>) {
        self.me = me.to_string();
        // with no topology configured the node routes for itself alone
        self.graph.add_node(me);
    }

    fn recompute(&mut self) {
        let result = shortest_paths(&self.graph, &self.me);
        self.next = next_hops(&result.prev, &self.me);
        self.dist = result.dist;
    }

    fn next_hop(&self, dest: &str) -> Option<String> {
        self.next.get(dest).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> Graph {
        let mut graph = Graph::new(true);
        graph.add_edge("A", "B", 1.0);
        graph.add_edge("B", "C", 1.0);
        graph
    }

    fn started(me: &str, graph: Graph) -> StaticDijkstra {
        let mut algorithm = StaticDijkstra::new(graph);
        algorithm.on_init(me, &BTreeMap::new());
        algorithm.recompute();
        algorithm
    }

    #[test]
    fn routes_follow_the_static_topology() {
        let algorithm = started("A", line_graph());
        assert_eq!(algorithm.next_hop("B").as_deref(), Some("B"));
        assert_eq!(algorithm.next_hop("C").as_deref(), Some("B"));
        assert!(algorithm.next_hop("A").is_none());
    }

    #[test]
    fn missing_topology_leaves_only_the_local_node() {
        let algorithm = started("A", Graph::new(true));
        assert!(algorithm.next_hop("B").is_none());
    }

    #[test]
    fn control_traffic_is_ignored() {
        let mut algorithm = started("A", line_graph());
        assert!(!algorithm.on_hello("B", 1.0));
        assert!(!algorithm
            .on_info("B", &serde_json::json!({"vector": {"B": 0.0}}))
            .changed);
        assert!(algorithm.build_info().is_none());
        assert_eq!(algorithm.next_hop("C").as_deref(), Some("B"));
    }

    #[test]
    fn weighted_detour_beats_a_costly_direct_link() {
        let mut graph = Graph::new(true);
        graph.add_edge("A", "B", 10.0);
        graph.add_edge("A", "C", 1.0);
        graph.add_edge("C", "B", 1.0);

        let algorithm = started("A", graph);
        assert_eq!(algorithm.next_hop("B").as_deref(), Some("C"));
    }
}
