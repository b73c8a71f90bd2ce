use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::model::envelope::{self, Envelope, Proto, BROADCAST};
use crate::model::state::NeighborTable;
use crate::protocols::base::RoutingAlgorithm;
use crate::runtime::config::TimerConfig;
use crate::runtime::forwarder::{DropReason, Forwarder, RouteEvent};
use crate::runtime::transport::Transport;

const MAX_INBOX: usize = 1024;

/// One router node: the receive loop, the routing event dispatch, and the
/// hello/info/aging timers, all on a single thread. The loop is the only
/// writer of routing state; timer emission works off snapshots returned by
/// `build_info`.
pub struct RouterNode {
    id: String,
    proto: Proto,
    transport: Box<dyn Transport>,
    algorithm: Box<dyn RoutingAlgorithm>,
    forwarder: Forwarder,
    neighbors: NeighborTable,
    remote_seen: BTreeMap<String, f64>,
    timers: TimerConfig,
    next_hello_at: f64,
    next_info_at: f64,
    next_age_at: f64,
    delivered: Vec<Envelope>,
    epoch: Instant,
}

impl RouterNode {
    pub fn new(
        transport: Box<dyn Transport>,
        mut algorithm: Box<dyn RoutingAlgorithm>,
        neighbors_costs: BTreeMap<String, f64>,
        timers: TimerConfig,
    ) -> Self {
        let id = transport.local_id().to_string();
        algorithm.on_init(&id, &neighbors_costs);
        algorithm.recompute();

        let forwarder = Forwarder::new(
            &id,
            neighbors_costs.keys().cloned().collect(),
            timers.seen_ttl,
        );
        let proto = Proto::parse(algorithm.name()).unwrap_or(Proto::Flooding);
        let info_interval = timers.info_interval;

        Self {
            id,
            proto,
            transport,
            algorithm,
            forwarder,
            neighbors: NeighborTable::new(&neighbors_costs),
            remote_seen: BTreeMap::new(),
            timers,
            next_hello_at: 0.0,
            next_info_at: info_interval,
            next_age_at: 1.0,
            delivered: Vec::new(),
            epoch: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn next_hop(&self, dest: &str) -> Option<String> {
        self.algorithm.next_hop(dest)
    }

    pub fn is_neighbor_active(&self, neighbor: &str) -> bool {
        self.neighbors.is_active(neighbor)
    }

    /// Data envelopes delivered to this node.
    pub fn delivered(&self) -> &[Envelope] {
        &self.delivered
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn next_due(&self) -> f64 {
        self.next_age_at
            .min(self.next_hello_at)
            .min(self.next_info_at)
    }

    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        info!(
            "{} up: proto={} neighbors={:?}",
            self.id,
            self.algorithm.name(),
            self.neighbors.ids().collect::<Vec<_>>()
        );

        while running.load(Ordering::Relaxed) {
            let now = self.now();
            // stay responsive to shutdown and the 1s aging grid
            let wait = (self.next_due() - now).clamp(0.01, 1.0);
            if let Some(line) = self.transport.recv(Duration::from_secs_f64(wait))? {
                let now = self.now();
                self.handle_raw(&line, now);
            }
            let now = self.now();
            self.tick(now);
        }

        info!("{} stopped", self.id);
        Ok(())
    }

    /// Drain everything pending on the transport, then run due timers.
    /// Lets tests drive the node with a simulated clock.
    pub fn pump(&mut self, now: f64) -> Result<()> {
        while let Some(line) = self.transport.recv(Duration::ZERO)? {
            self.handle_raw(&line, now);
        }
        self.tick(now);
        Ok(())
    }

    pub fn handle_raw(&mut self, line: &str, now: f64) {
        match envelope::decode_line(line) {
            Ok(env) => self.handle_envelope(env, now),
            Err(err) => warn!("{} drop malformed envelope: {err:#}", self.id),
        }
    }

    pub fn handle_envelope(&mut self, env: Envelope, now: f64) {
        let algorithm = &self.algorithm;
        let forwarder = &mut self.forwarder;
        let outcome = forwarder.handle(env, now, &|dest| algorithm.next_hop(dest));

        if let Some(reason) = outcome.dropped {
            match reason {
                DropReason::Unreachable => {
                    warn!("{} drop: {}", self.id, reason.as_str());
                }
                _ => debug!("{} drop: {}", self.id, reason.as_str()),
            }
        }
        if let Some(env) = outcome.deliver {
            info!(
                "{} deliver from {}: {}",
                self.id,
                env.origin.as_deref().unwrap_or(&env.from),
                env.payload_value()
            );
            if self.delivered.len() >= MAX_INBOX {
                self.delivered.remove(0);
            }
            self.delivered.push(env);
        }
        for event in outcome.events {
            self.process_event(event, now);
        }
        self.send_all(outcome.outgoing);
    }

    fn process_event(&mut self, event: RouteEvent, now: f64) {
        match event {
            RouteEvent::Hello { from, metric } => {
                if from == self.id {
                    return;
                }
                if !self.neighbors.contains(&from) {
                    // not a neighbor, but the codec accepted it: track liveness only
                    debug!("{} hello from unconfigured peer {}", self.id, from);
                    self.remote_seen.insert(from, now);
                    return;
                }

                let became_active = self.neighbors.confirm(&from, now);
                if self.algorithm.on_hello(&from, metric) {
                    self.algorithm.recompute();
                }
                if became_active {
                    info!("{} neighbor {} active (metric={})", self.id, from, metric);
                    if self.timers.subscribe_ack {
                        let cost = self.neighbors.cost(&from).unwrap_or(1.0);
                        let ack = Envelope::hello(self.proto, &self.id, &from, cost);
                        self.send_one(&from, ack);
                    }
                    if self.algorithm.learns_adjacency() {
                        // announce the fresh edge through the regular flood
                        let adjacency = Envelope::adjacency(&self.id, &from, metric);
                        self.handle_envelope(adjacency, now);
                    }
                }
            }
            RouteEvent::Info { from, payload } => {
                if from == self.id {
                    return;
                }
                self.stamp_seen(&from, now);
                let outcome = self.algorithm.on_info(&from, &payload);
                for origin in &outcome.origins {
                    if origin != &self.id {
                        self.stamp_seen(origin, now);
                    }
                }
                if outcome.changed {
                    self.algorithm.recompute();
                    debug!("{} routes recomputed after info from {}", self.id, from);
                }
            }
            RouteEvent::Adjacency { src, dst, cost } => {
                if src == self.id {
                    return;
                }
                self.stamp_seen(&src, now);
                if self.algorithm.on_message(&src, &dst, cost) {
                    self.algorithm.recompute();
                }
            }
        }
    }

    fn stamp_seen(&mut self, node: &str, now: f64) {
        if !self.neighbors.touch(node, now) {
            self.remote_seen.insert(node.to_string(), now);
        }
    }

    fn tick(&mut self, now: f64) {
        if now >= self.next_age_at {
            self.age_out(now);
            self.next_age_at = now + 1.0;
        }
        if now >= self.next_hello_at {
            self.send_hellos();
            self.next_hello_at = now + self.timers.hello_interval;
        }
        if now >= self.next_info_at {
            self.send_info(now);
            self.next_info_at = now + self.timers.info_interval;
        }
    }

    fn send_hellos(&self) {
        let targets: Vec<(String, f64)> = self
            .neighbors
            .ids()
            .map(|id| (id.clone(), self.neighbors.cost(id).unwrap_or(1.0)))
            .collect();
        for (neighbor, cost) in targets {
            let hello = Envelope::hello(self.proto, &self.id, &neighbor, cost);
            self.send_one(&neighbor, hello);
        }
    }

    fn send_info(&mut self, now: f64) {
        let Some(payload) = self.algorithm.build_info() else {
            return;
        };
        if self.algorithm.floods_info() {
            // wrap the advertisement and let the flood carry it
            let lsa = Envelope::info(
                self.proto,
                &self.id,
                BROADCAST,
                json!({ "lsp": payload }),
            );
            self.handle_envelope(lsa, now);
        } else {
            for neighbor in self.neighbors.active_ids() {
                let env = Envelope::info(self.proto, &self.id, &neighbor, payload.clone());
                self.send_one(&neighbor, env);
            }
        }
    }

    fn age_out(&mut self, now: f64) {
        let mut purged = false;

        for neighbor in self.neighbors.expire(now, self.timers.neighbor_dead) {
            warn!("{} neighbor {} expired", self.id, neighbor);
            purged |= self.algorithm.purge_node(&neighbor);
        }

        for origin in self.algorithm.known_origins() {
            if self.neighbors.contains(&origin) {
                continue;
            }
            let stale = match self.remote_seen.get(&origin) {
                Some(last_seen) => (now - last_seen) > self.timers.node_dead,
                None => {
                    // first sighting through the database: start its clock
                    self.remote_seen.insert(origin.clone(), now);
                    false
                }
            };
            if stale {
                warn!("{} remote node {} expired", self.id, origin);
                self.remote_seen.remove(&origin);
                purged |= self.algorithm.purge_node(&origin);
            }
        }

        if purged {
            self.algorithm.recompute();
            debug!("{} routes recomputed after purge", self.id);
        }
    }

    fn send_all(&self, outgoing: Vec<(String, Envelope)>) {
        for (to, env) in outgoing {
            self.send_one(&to, env);
        }
    }

    fn send_one(&self, to: &str, env: Envelope) {
        // a failed send never interrupts the siblings in the fan-out
        if let Err(err) = self.transport.send(to, &env) {
            warn!("{} send to {} failed: {err:#}", self.id, to);
        }
    }
}
