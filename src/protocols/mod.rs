pub mod base;
pub mod dijkstra;
pub mod distance_vector;
pub mod flooding;
pub mod link_state;
pub mod route_compute;

use anyhow::{bail, Result};

use crate::protocols::base::RoutingAlgorithm;
use crate::protocols::dijkstra::StaticDijkstra;
use crate::protocols::distance_vector::DistanceVector;
use crate::protocols::flooding::Flooding;
use crate::protocols::link_state::LinkState;
use crate::protocols::route_compute::Graph;

/// Instantiate the routing discipline named on the command line. The static
/// graph is only consulted by `dijkstra`; the adaptive disciplines start
/// empty and learn.
pub fn build_algorithm(
    proto: &str,
    static_graph: Option<Graph>,
) -> Result<Box<dyn RoutingAlgorithm>> {
    match proto {
        "flooding" => Ok(Box::new(Flooding)),
        "lsr" => Ok(Box::new(LinkState::new())),
        "dvr" => Ok(Box::new(DistanceVector::new())),
        "dijkstra" => Ok(Box::new(StaticDijkstra::new(
            static_graph.unwrap_or_default(),
        ))),
        other => bail!("unsupported protocol: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_every_discipline() {
        for proto in ["flooding", "lsr", "dvr", "dijkstra"] {
            let algorithm = build_algorithm(proto, None).expect("known protocol");
            assert_eq!(algorithm.name(), proto);
        }
        assert!(build_algorithm("ospf", None).is_err());
    }
}
