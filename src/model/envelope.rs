use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const BROADCAST: &str = "*";
pub const DEFAULT_TTL: i64 = 8;
pub const MAX_TTL: i64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Flooding,
    Lsr,
    Dvr,
    Dijkstra,
    #[serde(other)]
    Unknown,
}

impl Proto {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "flooding" => Some(Self::Flooding),
            "lsr" => Some(Self::Lsr),
            "dvr" => Some(Self::Dvr),
            "dijkstra" => Some(Self::Dijkstra),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flooding => "flooding",
            Self::Lsr => "lsr",
            Self::Dvr => "dvr",
            Self::Dijkstra => "dijkstra",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Hello,
    Info,
    Message,
    Echo,
    #[serde(other)]
    Unknown,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Info => "info",
            Self::Message => "message",
            Self::Echo => "echo",
            Self::Unknown => "unknown",
        }
    }
}

/// Data payloads are opaque to the forwarder: peers send either plain text
/// or a structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Object(Map<String, Value>),
}

impl Payload {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Object(map) => Value::Object(map.clone()),
        }
    }
}

/// The single message structure carried on the wire, for control and data
/// traffic alike. Key names are the wire names; `type` maps to `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_proto")]
    pub proto: Proto,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(default = "default_to")]
    pub to: String,
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    #[serde(default, deserialize_with = "de_headers")]
    pub headers: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hops: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
}

fn default_proto() -> Proto {
    Proto::Flooding
}

fn default_to() -> String {
    BROADCAST.to_string()
}

fn default_ttl() -> i64 {
    DEFAULT_TTL
}

// Peers disagree on the headers shape: a sequence of single-key mappings,
// a bare mapping, null, or absent all occur in the wild.
fn de_headers<'de, D>(deserializer: D) -> std::result::Result<Vec<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(normalize_headers(raw))
}

fn normalize_headers(raw: Option<Value>) -> Vec<Map<String, Value>> {
    match raw {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => vec![map],
        _ => Vec::new(),
    }
}

impl Envelope {
    pub fn new(proto: Proto, kind: Kind, from: &str, to: &str) -> Self {
        Self {
            proto,
            kind,
            id: Some(Uuid::new_v4().to_string()),
            from: from.to_string(),
            origin: Some(from.to_string()),
            via: None,
            to: to.to_string(),
            ttl: DEFAULT_TTL,
            headers: Vec::new(),
            payload: None,
            hops: None,
            metric: None,
        }
    }

    pub fn hello(proto: Proto, from: &str, to: &str, metric: f64) -> Self {
        let mut env = Self::new(proto, Kind::Hello, from, to);
        env.ttl = 1;
        env.metric = Some(metric);
        env
    }

    pub fn info(proto: Proto, from: &str, to: &str, payload: Value) -> Self {
        let mut env = Self::new(proto, Kind::Info, from, to);
        env.payload = Some(match payload {
            Value::Object(map) => Payload::Object(map),
            Value::String(text) => Payload::Text(text),
            other => Payload::Text(other.to_string()),
        });
        env
    }

    /// An adjacency advertisement: a flooded `message` describing the
    /// directly observed edge `from -> to` at the given cost.
    pub fn adjacency(from: &str, to: &str, hops: f64) -> Self {
        let mut env = Self::new(Proto::Lsr, Kind::Message, from, to);
        env.hops = Some(hops);
        env
    }

    pub fn data(proto: Proto, from: &str, to: &str, payload: Payload, ttl: i64) -> Self {
        let mut env = Self::new(proto, Kind::Message, from, to);
        env.payload = Some(payload);
        env.ttl = ttl;
        env
    }

    /// The hop this envelope arrived from, for the anti-echo rule.
    pub fn prev_hop(&self) -> &str {
        self.via.as_deref().unwrap_or(&self.from)
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST
    }

    /// Dedup key: the envelope id when present, otherwise the composite
    /// used by the id-less adjacency dialect.
    pub fn dedup_key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!(
                "{}->{}:{}:{}",
                self.from,
                self.to,
                self.kind.as_str(),
                self.hops.map_or_else(|| "-".to_string(), |h| h.to_string()),
            ),
        }
    }

    /// Copy for the next hop: TTL decremented, `from` and `via` rewritten
    /// to the forwarding node. The id survives untouched.
    pub fn forward_copy(&self, me: &str) -> Self {
        let mut fwd = self.clone();
        fwd.ttl = (self.ttl - 1).max(0);
        fwd.from = me.to_string();
        fwd.via = Some(me.to_string());
        fwd
    }

    pub fn payload_value(&self) -> Value {
        self.payload
            .as_ref()
            .map_or(Value::Null, Payload::to_value)
    }

    fn normalize(&mut self) {
        if self.origin.is_none() {
            self.origin = Some(self.from.clone());
        }
    }

    fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            bail!("envelope is missing a sender");
        }
        if self.to.is_empty() {
            bail!("envelope is missing a destination");
        }
        if self.ttl < 0 || self.ttl > MAX_TTL {
            bail!("envelope ttl {} outside [0, {}]", self.ttl, MAX_TTL);
        }
        Ok(())
    }
}

pub fn decode_value(value: Value) -> Result<Envelope> {
    let mut env: Envelope =
        serde_json::from_value(value).context("envelope failed schema validation")?;
    env.normalize();
    env.validate()?;
    Ok(env)
}

pub fn decode_line(line: &str) -> Result<Envelope> {
    let value: Value =
        serde_json::from_str(line.trim()).context("envelope is not valid JSON")?;
    decode_value(value)
}

pub fn encode(env: &Envelope) -> Result<String> {
    serde_json::to_string(env).context("failed to encode envelope")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_roundtrip_preserves_semantic_fields() {
        let mut env = Envelope::data(
            Proto::Flooding,
            "A",
            "C",
            Payload::Text("hi C".to_string()),
            4,
        );
        env.headers = normalize_headers(Some(json!([{"seq": 3}])));

        let wire = encode(&env).expect("encode should succeed");
        let decoded = decode_line(&wire).expect("decode should succeed");
        assert_eq!(decoded, env);
    }

    #[test]
    fn decode_applies_defaults_for_missing_fields() {
        let env = decode_line(r#"{"type":"message","from":"A","to":"B"}"#)
            .expect("minimal envelope should decode");
        assert_eq!(env.proto, Proto::Flooding);
        assert_eq!(env.ttl, DEFAULT_TTL);
        assert_eq!(env.origin.as_deref(), Some("A"));
        assert!(env.headers.is_empty());
        assert!(env.id.is_none());
    }

    #[test]
    fn decode_wraps_mapping_headers_into_a_sequence() {
        let env = decode_line(
            r#"{"type":"message","from":"A","to":"B","headers":{"seq":1}}"#,
        )
        .expect("decode should succeed");
        assert_eq!(env.headers.len(), 1);
        assert_eq!(env.headers[0].get("seq"), Some(&json!(1)));
    }

    #[test]
    fn decode_keeps_explicit_origin_and_via() {
        let env = decode_line(
            r#"{"type":"message","from":"B","origin":"A","via":"B","to":"C","ttl":3}"#,
        )
        .expect("decode should succeed");
        assert_eq!(env.origin.as_deref(), Some("A"));
        assert_eq!(env.prev_hop(), "B");
    }

    #[test]
    fn unknown_type_token_decodes_without_error() {
        let env = decode_line(r#"{"type":"gossip","from":"A","to":"B"}"#)
            .expect("unknown type must not be a parse error");
        assert_eq!(env.kind, Kind::Unknown);
    }

    #[test]
    fn ttl_out_of_range_is_rejected() {
        assert!(decode_line(r#"{"type":"message","from":"A","to":"B","ttl":-1}"#).is_err());
        assert!(decode_line(r#"{"type":"message","from":"A","to":"B","ttl":65}"#).is_err());
    }

    #[test]
    fn payload_accepts_text_and_objects() {
        let text = decode_line(
            r#"{"type":"message","from":"A","to":"B","payload":"hola"}"#,
        )
        .expect("decode should succeed");
        assert_eq!(text.payload, Some(Payload::Text("hola".to_string())));

        let object = decode_line(
            r#"{"type":"info","from":"A","to":"B","payload":{"vector":{"A":0.0}}}"#,
        )
        .expect("decode should succeed");
        assert!(matches!(object.payload, Some(Payload::Object(_))));
    }

    #[test]
    fn dedup_key_prefers_id_over_composite() {
        let with_id = Envelope::data(Proto::Flooding, "A", "B", Payload::Text("x".into()), 4);
        assert_eq!(with_id.dedup_key(), with_id.id.clone().unwrap());

        let mut adjacency = Envelope::adjacency("A", "B", 2.0);
        adjacency.id = None;
        assert_eq!(adjacency.dedup_key(), "A->B:message:2");
    }

    #[test]
    fn forward_copy_rewrites_hop_fields_only() {
        let env = decode_line(
            r#"{"proto":"flooding","type":"message","id":"m1","from":"A","to":"*","ttl":3}"#,
        )
        .expect("decode should succeed");
        let fwd = env.forward_copy("B");
        assert_eq!(fwd.ttl, 2);
        assert_eq!(fwd.from, "B");
        assert_eq!(fwd.via.as_deref(), Some("B"));
        assert_eq!(fwd.id.as_deref(), Some("m1"));
        assert_eq!(fwd.origin.as_deref(), Some("A"));
    }
}
