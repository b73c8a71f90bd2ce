use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use crate::model::envelope::{self, Envelope};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// The only surface the node depends on: an id, a timeout receive of wire
/// lines, and a send that completes once the substrate has the message.
pub trait Transport: Send {
    fn local_id(&self) -> &str;

    fn recv(&mut self, timeout: Duration) -> Result<Option<String>>;

    fn send(&self, to: &str, env: &Envelope) -> Result<()>;
}

/// Line-delimited TCP. A listener thread accepts connections and per-peer
/// reader threads push complete lines into the inbound queue; sends open a
/// short-lived connection, write one line, and close.
pub struct SocketTransport {
    node: String,
    names: BTreeMap<String, String>,
    port: u16,
    inbound: Receiver<String>,
}

impl SocketTransport {
    pub fn bind(node: &str, port: u16, names: BTreeMap<String, String>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .with_context(|| format!("failed to bind node {node} on port {port}"))?;
        let local_port = listener
            .local_addr()
            .context("failed to read listener address")?
            .port();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || accept_loop(listener, tx));

        Ok(Self {
            node: node.to_string(),
            names,
            port: local_port,
            inbound: rx,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }
}

fn accept_loop(listener: TcpListener, tx: Sender<String>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let tx = tx.clone();
                thread::spawn(move || read_lines(stream, tx));
            }
            Err(err) => {
                warn!("accept failed: {err}");
            }
        }
    }
}

fn read_lines(stream: TcpStream, tx: Sender<String>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => {
                if tx.send(line).is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!("peer connection closed: {err}");
                return;
            }
        }
    }
}

impl Transport for SocketTransport {
    fn local_id(&self) -> &str {
        &self.node
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("socket listener stopped"),
        }
    }

    fn send(&self, to: &str, env: &Envelope) -> Result<()> {
        let address = self
            .names
            .get(to)
            .ok_or_else(|| anyhow!("no address for node {to}"))?;
        let addr = address
            .to_socket_addrs()
            .with_context(|| format!("invalid address {address} for node {to}"))?
            .next()
            .ok_or_else(|| anyhow!("address {address} resolved to nothing"))?;

        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .with_context(|| format!("failed to connect to {to} at {address}"))?;
        let wire = envelope::encode(env)?;
        stream
            .write_all(wire.as_bytes())
            .and_then(|_| stream.write_all(b"\n"))
            .with_context(|| format!("failed to write to {to}"))?;
        stream.shutdown(Shutdown::Write).ok();
        Ok(())
    }
}

/// In-process pub/sub substrate: the names file maps each node to a channel
/// id, and every endpoint subscribed to a channel receives what is
/// published there. The multi-node integration tests run on this.
#[derive(Clone, Default)]
pub struct MemoryBus {
    channels: Arc<Mutex<HashMap<String, Sender<String>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, node: &str, names: BTreeMap<String, String>) -> MemoryTransport {
        let channel = names
            .get(node)
            .cloned()
            .unwrap_or_else(|| node.to_string());
        let (tx, rx) = mpsc::channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, tx);
        MemoryTransport {
            node: node.to_string(),
            names,
            bus: self.clone(),
            inbound: rx,
        }
    }
}

pub struct MemoryTransport {
    node: String,
    names: BTreeMap<String, String>,
    bus: MemoryBus,
    inbound: Receiver<String>,
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> &str {
        &self.node
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.inbound.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send(&self, to: &str, env: &Envelope) -> Result<()> {
        let channel = self
            .names
            .get(to)
            .cloned()
            .unwrap_or_else(|| to.to_string());
        let wire = envelope::encode(env)?;
        let channels = self
            .bus
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = channels.get(&channel) else {
            bail!("no channel {channel} for node {to}");
        };
        tx.send(wire)
            .map_err(|_| anyhow!("channel {channel} is closed"))
    }
}
