use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::protocols::route_compute::Graph;

/// Neighbor sets come in two file dialects: a bare list (implicit cost 1)
/// or a mapping with explicit costs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NeighborSpec {
    List(Vec<String>),
    Costs(BTreeMap<String, f64>),
}

impl NeighborSpec {
    pub fn costs(&self) -> BTreeMap<String, f64> {
        match self {
            Self::List(ids) => ids.iter().map(|id| (id.clone(), 1.0)).collect(),
            Self::Costs(map) => map.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfigFile<T> {
    #[serde(rename = "type")]
    file_type: String,
    config: T,
}

#[derive(Debug, Clone)]
pub struct Topology {
    nodes: BTreeMap<String, NeighborSpec>,
}

impl Topology {
    /// Configured neighbors of `node` with costs; empty when the node is
    /// not listed.
    pub fn neighbors_of(&self, node: &str) -> BTreeMap<String, f64> {
        self.nodes
            .get(node)
            .map(NeighborSpec::costs)
            .unwrap_or_default()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Full undirected graph over every listed adjacency, for the static
    /// discipline.
    pub fn build_graph(&self) -> Graph {
        let mut graph = Graph::new(true);
        for (node, spec) in &self.nodes {
            graph.add_node(node);
            for (neighbor, cost) in spec.costs() {
                graph.add_edge(node, &neighbor, cost);
            }
        }
        graph
    }
}

pub fn load_topology(path: &Path) -> Result<Topology> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology file {}", path.display()))?;
    let raw: RawConfigFile<BTreeMap<String, NeighborSpec>> =
        serde_json::from_str(&raw_text).context("failed to parse topology json")?;
    if raw.file_type != "topo" {
        bail!(
            "topology file {} has type {:?}, expected \"topo\"",
            path.display(),
            raw.file_type
        );
    }
    Ok(Topology { nodes: raw.config })
}

/// Names file: node id to substrate address (`host:port` for the socket
/// driver, a channel id for the pub/sub driver).
pub fn load_names(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read names file {}", path.display()))?;
    let raw: RawConfigFile<BTreeMap<String, String>> =
        serde_json::from_str(&raw_text).context("failed to parse names json")?;
    if raw.file_type != "names" {
        bail!(
            "names file {} has type {:?}, expected \"names\"",
            path.display(),
            raw.file_type
        );
    }
    Ok(raw.config)
}

#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub hello_interval: f64,
    pub info_interval: f64,
    pub neighbor_dead: f64,
    pub node_dead: f64,
    pub seen_ttl: f64,
    pub subscribe_ack: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            hello_interval: 3.0,
            info_interval: 5.0,
            neighbor_dead: 5.0,
            node_dead: 15.0,
            seen_ttl: 15.0,
            subscribe_ack: true,
        }
    }
}

impl TimerConfig {
    /// Environment overrides; unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hello_interval: env_f64("HELLO_INTERVAL", defaults.hello_interval),
            info_interval: env_f64("INFO_INTERVAL", defaults.info_interval),
            neighbor_dead: env_f64("NEIGHBOR_DEAD", defaults.neighbor_dead),
            node_dead: env_f64("NODE_DEAD", defaults.node_dead),
            seen_ttl: env_f64("SEEN_TTL", defaults.seen_ttl),
            subscribe_ack: env_flag("SUBSCRIBE_ACK", defaults.subscribe_ack),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<f64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim() {
            "1" => true,
            "0" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = env::temp_dir();
        path.push(format!("routelab-test-{}-{}", std::process::id(), name));
        let mut file = fs::File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    #[test]
    fn topology_accepts_list_and_cost_dialects() {
        let path = write_temp(
            "topo-mixed.json",
            r#"{"type":"topo","config":{"A":["B","C"],"B":{"A":2.5},"C":{}}}"#,
        );
        let topo = load_topology(&path).expect("topology should parse");
        fs::remove_file(&path).ok();

        assert_eq!(
            topo.neighbors_of("A"),
            BTreeMap::from([("B".to_string(), 1.0), ("C".to_string(), 1.0)])
        );
        assert_eq!(
            topo.neighbors_of("B"),
            BTreeMap::from([("A".to_string(), 2.5)])
        );
        assert!(topo.neighbors_of("Z").is_empty());
        assert!(topo.contains("C"));
    }

    #[test]
    fn topology_rejects_wrong_file_type() {
        let path = write_temp("topo-bad.json", r#"{"type":"names","config":{}}"#);
        assert!(load_topology(&path).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn topology_builds_an_undirected_graph() {
        let path = write_temp(
            "topo-graph.json",
            r#"{"type":"topo","config":{"A":{"B":1.0},"B":{"A":1.0,"C":1.0},"C":{"B":1.0}}}"#,
        );
        let topo = load_topology(&path).expect("topology should parse");
        fs::remove_file(&path).ok();

        let graph = topo.build_graph();
        assert_eq!(
            graph.neighbors("B").map(|links| links.len()),
            Some(2)
        );
    }

    #[test]
    fn names_file_maps_nodes_to_addresses() {
        let path = write_temp(
            "names.json",
            r#"{"type":"names","config":{"A":"127.0.0.1:9101","B":"127.0.0.1:9102"}}"#,
        );
        let names = load_names(&path).expect("names should parse");
        fs::remove_file(&path).ok();

        assert_eq!(names.get("A").map(String::as_str), Some("127.0.0.1:9101"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn missing_files_fail_with_context() {
        let missing = Path::new("/nonexistent/routelab/topo.json");
        assert!(load_topology(missing).is_err());
        assert!(load_names(missing).is_err());
    }
}
