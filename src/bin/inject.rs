use std::io::Write;
use std::net::TcpStream;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use routelab::model::envelope::{self, Envelope, Payload, Proto};
use routelab::runtime::config::load_names;

/// Publish one envelope to a running node to bootstrap traffic.
#[derive(Debug, Parser)]
#[command(name = "inject")]
struct Args {
    /// Path to the names file (names-*.json)
    #[arg(long)]
    names: PathBuf,
    /// Node whose address receives the injected envelope
    #[arg(long)]
    entry: String,
    /// Claimed origin of the message
    #[arg(long)]
    from: String,
    /// Destination node id, or "*" to broadcast
    #[arg(long)]
    to: String,
    /// Message body
    #[arg(long)]
    payload: String,
    #[arg(long, default_value = "flooding")]
    proto: String,
    #[arg(long, default_value_t = 8)]
    ttl: i64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(proto) = Proto::parse(&args.proto) else {
        bail!("unsupported protocol: {}", args.proto);
    };
    let names = load_names(&args.names)?;
    let address = names
        .get(&args.entry)
        .with_context(|| format!("no address for node {}", args.entry))?;

    let env = Envelope::data(
        proto,
        &args.from,
        &args.to,
        Payload::Text(args.payload.clone()),
        args.ttl,
    );
    let wire = envelope::encode(&env)?;

    let mut stream = TcpStream::connect(address)
        .with_context(|| format!("failed to connect to {} at {address}", args.entry))?;
    stream.write_all(wire.as_bytes())?;
    stream.write_all(b"\n")?;
    println!("sent {} -> {} via {}", args.from, args.to, args.entry);
    Ok(())
}
