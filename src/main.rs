use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use routelab::protocols::build_algorithm;
use routelab::runtime::config::{load_names, load_topology, TimerConfig};
use routelab::runtime::node::RouterNode;
use routelab::runtime::transport::{MemoryBus, SocketTransport, Transport};

#[derive(Debug, Parser)]
#[command(name = "routelabd")]
#[command(about = "Routing laboratory node daemon")]
struct Args {
    /// Routing discipline: flooding, dvr, lsr or dijkstra
    #[arg(long)]
    proto: String,
    /// Substrate driver: socket or memory
    #[arg(long)]
    driver: String,
    /// Local node id
    #[arg(long)]
    node: String,
    /// Path to the topology file (topo-*.json)
    #[arg(long)]
    topo: PathBuf,
    /// Path to the names file (names-*.json)
    #[arg(long)]
    names: PathBuf,
    /// Local TCP port (socket driver only)
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let topology = load_topology(&args.topo)?;
    let names = load_names(&args.names)?;
    let neighbors = topology.neighbors_of(&args.node);

    let static_graph = match args.proto.as_str() {
        "dijkstra" => Some(topology.build_graph()),
        _ => None,
    };
    let algorithm = build_algorithm(&args.proto, static_graph)?;

    let transport: Box<dyn Transport> = match args.driver.as_str() {
        "socket" => {
            let port = args
                .port
                .context("--port is required with the socket driver")?;
            Box::new(SocketTransport::bind(&args.node, port, names)?)
        }
        "memory" => Box::new(MemoryBus::new().endpoint(&args.node, names)),
        other => anyhow::bail!("unsupported driver: {other}"),
    };

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Relaxed);
    })?;

    let mut node = RouterNode::new(transport, algorithm, neighbors, TimerConfig::from_env());
    node.run(&running)
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .compact()
        .init();
    Ok(())
}
