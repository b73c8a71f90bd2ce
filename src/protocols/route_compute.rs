use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Adjacency-list graph over node ids. Costs are non-negative reals;
/// duplicate edges keep the cheapest cost. The undirected flag is a
/// per-instance property.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    undirected: bool,
    adj: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Graph {
    pub fn new(undirected: bool) -> Self {
        Self {
            undirected,
            adj: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, node: &str) {
        self.adj.entry(node.to_string()).or_default();
    }

    pub fn add_edge(&mut self, u: &str, v: &str, cost: f64) {
        if !cost.is_finite() || cost < 0.0 {
            return;
        }
        Self::insert_cheapest(&mut self.adj, u, v, cost);
        if self.undirected {
            Self::insert_cheapest(&mut self.adj, v, u, cost);
        } else {
            self.adj.entry(v.to_string()).or_default();
        }
    }

    fn insert_cheapest(
        adj: &mut BTreeMap<String, BTreeMap<String, f64>>,
        u: &str,
        v: &str,
        cost: f64,
    ) {
        let entry = adj
            .entry(u.to_string())
            .or_default()
            .entry(v.to_string())
            .or_insert(f64::INFINITY);
        if cost < *entry {
            *entry = cost;
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.adj.keys()
    }

    pub fn neighbors(&self, u: &str) -> Option<&BTreeMap<String, f64>> {
        self.adj.get(u)
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpfResult {
    pub dist: BTreeMap<String, f64>,
    pub prev: BTreeMap<String, Option<String>>,
}

// Min-heap entry ordered by cost, then node id so equal-cost pops are
// deterministic.
#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    cost: f64,
    node: String,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra from `source`. Unreachable nodes keep infinite distance and no
/// predecessor. Exact-cost ties prefer the lexicographically smaller
/// predecessor, so every node derives the same tree from the same graph.
pub fn shortest_paths(graph: &Graph, source: &str) -> SpfResult {
    let mut dist: BTreeMap<String, f64> = graph
        .nodes()
        .map(|node| (node.clone(), f64::INFINITY))
        .collect();
    let mut prev: BTreeMap<String, Option<String>> =
        graph.nodes().map(|node| (node.clone(), None)).collect();

    dist.insert(source.to_string(), 0.0);
    prev.entry(source.to_string()).or_insert(None);

    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        cost: 0.0,
        node: source.to_string(),
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
            continue;
        }
        let Some(neighbors) = graph.neighbors(&node) else {
            continue;
        };
        for (next, edge_cost) in neighbors {
            let alt = cost + edge_cost;
            let best = dist.get(next).copied().unwrap_or(f64::INFINITY);
            let current_prev = prev.get(next).and_then(|p| p.as_deref());
            let replace =
                alt < best || (alt == best && prefers_predecessor(&node, current_prev));
            if replace {
                dist.insert(next.clone(), alt);
                prev.insert(next.clone(), Some(node.clone()));
                heap.push(HeapEntry {
                    cost: alt,
                    node: next.clone(),
                });
            }
        }
    }

    SpfResult { dist, prev }
}

fn prefers_predecessor(candidate: &str, current: Option<&str>) -> bool {
    match current {
        None => true,
        Some(current) => candidate < current,
    }
}

/// Path `source -> target` following the predecessor map; empty when the
/// target is unreachable.
pub fn reconstruct_path(
    prev: &BTreeMap<String, Option<String>>,
    source: &str,
    target: &str,
) -> Vec<String> {
    let mut path = Vec::new();
    let mut cursor = Some(target.to_string());
    while let Some(node) = cursor {
        path.push(node.clone());
        if node == source {
            break;
        }
        cursor = prev.get(&node).cloned().flatten();
    }
    path.reverse();
    if path.first().map(String::as_str) != Some(source) {
        return Vec::new();
    }
    path
}

pub fn first_hop(
    prev: &BTreeMap<String, Option<String>>,
    source: &str,
    dest: &str,
) -> Option<String> {
    let path = reconstruct_path(prev, source, dest);
    if path.len() < 2 {
        return None;
    }
    Some(path[1].clone())
}

/// Next-hop table from `source` to every node in the predecessor map.
pub fn next_hops(
    prev: &BTreeMap<String, Option<String>>,
    source: &str,
) -> BTreeMap<String, Option<String>> {
    prev.keys()
        .map(|dest| {
            let hop = if dest == source {
                None
            } else {
                first_hop(prev, source, dest)
            };
            (dest.clone(), hop)
        })
        .collect()
}
