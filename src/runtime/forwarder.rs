use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::model::envelope::{Envelope, Kind, Proto};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownType,
    Duplicate,
    TtlExpired,
    Unreachable,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownType => "unknown-type",
            Self::Duplicate => "duplicate",
            Self::TtlExpired => "ttl-expired",
            Self::Unreachable => "unreachable-destination",
        }
    }
}

/// Control events handed from the forwarding plane to the routing loop.
#[derive(Debug, Clone)]
pub enum RouteEvent {
    Hello { from: String, metric: f64 },
    Info { from: String, payload: Value },
    Adjacency { src: String, dst: String, cost: f64 },
}

/// Everything `handle` decided for one envelope. The caller applies it:
/// events go to the routing loop, outgoing copies to the transport, and a
/// delivered envelope to the local inbox.
#[derive(Debug, Default)]
pub struct HandleOutcome {
    pub events: Vec<RouteEvent>,
    pub deliver: Option<Envelope>,
    pub outgoing: Vec<(String, Envelope)>,
    pub dropped: Option<DropReason>,
}

impl HandleOutcome {
    fn drop(reason: DropReason) -> Self {
        Self {
            dropped: Some(reason),
            ..Self::default()
        }
    }
}

/// The forwarding plane: owns the dedup memory and applies, in order,
/// dedup, TTL, control-event extraction, local delivery, and the
/// flood-or-unicast forwarding rule with anti-echo.
pub struct Forwarder {
    me: String,
    neighbors: Vec<String>,
    seen: HashMap<String, f64>,
    order: VecDeque<(String, f64)>,
    seen_ttl: f64,
}

impl Forwarder {
    pub fn new(me: &str, neighbors: Vec<String>, seen_ttl: f64) -> Self {
        Self {
            me: me.to_string(),
            neighbors,
            seen: HashMap::new(),
            order: VecDeque::new(),
            seen_ttl,
        }
    }

    fn gc_seen(&mut self, now: f64) {
        while self
            .order
            .front()
            .is_some_and(|(_, admitted)| now - admitted > self.seen_ttl)
        {
            if let Some((key, admitted)) = self.order.pop_front() {
                // the key may have been re-admitted with a newer timestamp
                if self.seen.get(&key).copied() == Some(admitted) {
                    self.seen.remove(&key);
                }
            }
        }
    }

    fn admit(&mut self, key: String, now: f64) -> bool {
        self.gc_seen(now);
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key.clone(), now);
        self.order.push_back((key, now));
        true
    }

    pub fn handle(
        &mut self,
        env: Envelope,
        now: f64,
        next_hop: &dyn Fn(&str) -> Option<String>,
    ) -> HandleOutcome {
        if env.kind == Kind::Unknown {
            return HandleOutcome::drop(DropReason::UnknownType);
        }
        if !self.admit(env.dedup_key(), now) {
            return HandleOutcome::drop(DropReason::Duplicate);
        }
        if env.ttl <= 0 {
            return HandleOutcome::drop(DropReason::TtlExpired);
        }

        let mut outcome = HandleOutcome::default();

        // an id-less `message` carrying hops advertises one observed edge
        let adjacency = env.kind == Kind::Message && env.hops.is_some();

        match env.kind {
            Kind::Hello => {
                outcome.events.push(RouteEvent::Hello {
                    from: env.from.clone(),
                    metric: env.metric.unwrap_or(1.0),
                });
                // hellos are one-hop, never forwarded
                return outcome;
            }
            Kind::Info => {
                outcome.events.push(RouteEvent::Info {
                    from: env.from.clone(),
                    payload: env.payload_value(),
                });
                if env.to == self.me {
                    return outcome;
                }
            }
            Kind::Message if adjacency => {
                let src = env.origin.clone().unwrap_or_else(|| env.from.clone());
                outcome.events.push(RouteEvent::Adjacency {
                    src,
                    dst: env.to.clone(),
                    cost: env.hops.unwrap_or(1.0),
                });
            }
            Kind::Message | Kind::Echo => {
                if env.to == self.me {
                    outcome.deliver = Some(env);
                    return outcome;
                }
                if env.is_broadcast() {
                    outcome.deliver = Some(env.clone());
                }
            }
            Kind::Unknown => return HandleOutcome::drop(DropReason::UnknownType),
        }

        let prev_hop = env.prev_hop().to_string();
        let fwd = env.forward_copy(&self.me);
        let flood = env.is_broadcast()
            || adjacency
            || matches!(env.proto, Proto::Flooding | Proto::Unknown);

        if flood {
            for neighbor in &self.neighbors {
                if *neighbor == prev_hop {
                    continue;
                }
                outcome.outgoing.push((neighbor.clone(), fwd.clone()));
            }
        } else {
            match next_hop(&env.to) {
                Some(hop) => outcome.outgoing.push((hop, fwd)),
                None => outcome.dropped = Some(DropReason::Unreachable),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::envelope::decode_line;

    fn forwarder() -> Forwarder {
        Forwarder::new("B", vec!["A".to_string(), "C".to_string()], 15.0)
    }

    fn no_route(_dest: &str) -> Option<String> {
        None
    }

    fn flood_message(id: &str, to: &str, ttl: i64) -> Envelope {
        decode_line(&format!(
            r#"{{"proto":"flooding","type":"message","id":"{id}","from":"A","origin":"A","via":"A","to":"{to}","ttl":{ttl},"payload":"hi"}}"#
        ))
        .expect("valid envelope")
    }

    #[test]
    fn unicast_flood_relays_with_anti_echo() {
        let mut fwd = forwarder();
        let outcome = fwd.handle(flood_message("m1", "C", 3), 0.0, &no_route);

        assert!(outcome.dropped.is_none());
        assert!(outcome.deliver.is_none());
        let targets: Vec<&str> = outcome
            .outgoing
            .iter()
            .map(|(to, _)| to.as_str())
            .collect();
        assert_eq!(targets, vec!["C"]);
        let (_, copy) = &outcome.outgoing[0];
        assert_eq!(copy.ttl, 2);
        assert_eq!(copy.from, "B");
        assert_eq!(copy.via.as_deref(), Some("B"));
    }

    #[test]
    fn broadcast_delivers_locally_and_keeps_flooding() {
        let mut fwd = forwarder();
        let outcome = fwd.handle(flood_message("m2", "*", 2), 0.0, &no_route);

        assert!(outcome.deliver.is_some());
        assert_eq!(outcome.outgoing.len(), 1);
        assert_eq!(outcome.outgoing[0].0, "C");
    }

    #[test]
    fn destination_delivery_stops_forwarding() {
        let mut fwd = forwarder();
        let outcome = fwd.handle(flood_message("m3", "B", 3), 0.0, &no_route);
        assert!(outcome.deliver.is_some());
        assert!(outcome.outgoing.is_empty());
    }

    #[test]
    fn duplicates_are_dropped_within_the_seen_window() {
        let mut fwd = forwarder();
        let first = fwd.handle(flood_message("m4", "*", 3), 0.0, &no_route);
        assert!(first.dropped.is_none());

        let dup = fwd.handle(flood_message("m4", "*", 3), 1.0, &no_route);
        assert_eq!(dup.dropped, Some(DropReason::Duplicate));
        assert!(dup.outgoing.is_empty());
        assert!(dup.deliver.is_none());
    }

    #[test]
    fn seen_entries_expire_after_the_retention_window() {
        let mut fwd = forwarder();
        fwd.handle(flood_message("m5", "*", 3), 0.0, &no_route);
        // 16s later the id has been swept and is admitted again
        let outcome = fwd.handle(flood_message("m5", "*", 3), 16.0, &no_route);
        assert!(outcome.dropped.is_none());
        assert!(outcome.deliver.is_some());
    }

    #[test]
    fn ttl_zero_is_dropped_before_delivery() {
        let mut fwd = forwarder();
        let outcome = fwd.handle(flood_message("m6", "*", 0), 0.0, &no_route);
        assert_eq!(outcome.dropped, Some(DropReason::TtlExpired));
        assert!(outcome.deliver.is_none());
        assert!(outcome.outgoing.is_empty());
    }

    #[test]
    fn unknown_type_is_dropped() {
        let mut fwd = forwarder();
        let env = decode_line(r#"{"type":"gossip","from":"A","to":"B"}"#).expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);
        assert_eq!(outcome.dropped, Some(DropReason::UnknownType));
    }

    #[test]
    fn hello_becomes_an_event_and_stops() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"lsr","type":"hello","id":"h1","from":"A","to":"B","metric":2.0}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);

        assert!(outcome.outgoing.is_empty());
        assert!(matches!(
            outcome.events.as_slice(),
            [RouteEvent::Hello { from, metric }] if from == "A" && *metric == 2.0
        ));
    }

    #[test]
    fn adjacency_message_raises_an_event_and_floods() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"lsr","type":"message","from":"A","origin":"A","to":"B","hops":1.0,"ttl":8}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);

        assert!(outcome.deliver.is_none());
        assert!(matches!(
            outcome.events.as_slice(),
            [RouteEvent::Adjacency { src, dst, cost }]
                if src == "A" && dst == "B" && *cost == 1.0
        ));
        // floods onward, skipping the previous hop
        assert_eq!(outcome.outgoing.len(), 1);
        assert_eq!(outcome.outgoing[0].0, "C");
    }

    #[test]
    fn unicast_info_to_me_is_consumed_after_the_event() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"dvr","type":"info","id":"i1","from":"A","to":"B","payload":{"vector":{"A":0.0}}}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.outgoing.is_empty());
    }

    #[test]
    fn broadcast_info_keeps_flooding_after_the_event() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"lsr","type":"info","id":"i2","from":"A","via":"A","to":"*","ttl":4,"payload":{"lsp":{"self":"A","neighbors":{"B":1.0},"seq":1}}}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.outgoing.len(), 1);
        assert_eq!(outcome.outgoing[0].0, "C");
    }

    #[test]
    fn unicast_without_a_route_is_dropped_as_unreachable() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"lsr","type":"message","id":"m7","from":"A","to":"X","ttl":4,"payload":"hi"}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);
        assert_eq!(outcome.dropped, Some(DropReason::Unreachable));
        assert!(outcome.outgoing.is_empty());
    }

    #[test]
    fn unicast_with_a_route_goes_to_the_next_hop_only() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"lsr","type":"message","id":"m8","from":"A","to":"D","ttl":4,"payload":"hi"}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &|_| Some("C".to_string()));
        assert_eq!(outcome.outgoing.len(), 1);
        assert_eq!(outcome.outgoing[0].0, "C");
        assert_eq!(outcome.outgoing[0].1.ttl, 3);
    }

    #[test]
    fn echo_rides_the_data_path() {
        let mut fwd = forwarder();
        let env = decode_line(
            r#"{"proto":"flooding","type":"echo","id":"e1","from":"A","to":"B","ttl":4}"#,
        )
        .expect("decodes");
        let outcome = fwd.handle(env, 0.0, &no_route);
        assert!(outcome.deliver.is_some());
        assert!(outcome.outgoing.is_empty());
    }
}
