use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Hello,
    OspfLsa,
    DdrLsa,
    RipUpdate,
}

/// The single envelope carried by every protocol, across both the simulated
/// in-memory transport and the real UDP wire. `(protocol, src_router_id, seq)`
/// is unique for the lifetime of a sender; `seq` is assigned by the owning
/// protocol and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub protocol: String,
    pub kind: MessageKind,
    pub src_router_id: u32,
    pub seq: u64,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    pub ts: f64,
}

impl ControlMessage {
    /// Total ordering used to break ties when multiple messages land in the
    /// same tick's inbox. `dst` is supplied by the caller (the network model
    /// or transport already knows it from the `(neighbor_id, message)` pair)
    /// rather than carried on the envelope itself, since the wire transport
    /// addresses datagrams by socket address and never needs it encoded.
    pub fn sort_key(&self, dst: u32) -> (u32, u32, MessageKind, String) {
        let canonical_payload =
            serde_json::to_string(&self.payload).unwrap_or_else(|_| String::new());
        (self.src_router_id, dst, self.kind, canonical_payload)
    }
}

pub fn encode_message(message: &ControlMessage) -> Result<Vec<u8>> {
    serde_json::to_vec(message).context("failed to encode control message")
}

pub fn decode_message(data: &[u8]) -> Result<ControlMessage> {
    serde_json::from_slice(data).context("failed to decode control message")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrip() {
        let mut payload = BTreeMap::new();
        payload.insert("router_id".to_string(), Value::from(7_u64));
        payload.insert("note".to_string(), Value::from("hello"));

        let msg = ControlMessage {
            protocol: "ospf".to_string(),
            kind: MessageKind::Hello,
            src_router_id: 1,
            seq: 3,
            payload,
            ts: 12.5,
        };

        let encoded = encode_message(&msg).expect("encode should succeed");
        let decoded = decode_message(&encoded).expect("decode should succeed");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn sort_key_is_stable_under_payload_insertion_order() {
        let mut payload_a = BTreeMap::new();
        payload_a.insert("a".to_string(), Value::from(1));
        payload_a.insert("b".to_string(), Value::from(2));

        let mut payload_b = BTreeMap::new();
        payload_b.insert("b".to_string(), Value::from(2));
        payload_b.insert("a".to_string(), Value::from(1));

        let base = ControlMessage {
            protocol: "ospf".to_string(),
            kind: MessageKind::OspfLsa,
            src_router_id: 1,
            seq: 1,
            payload: payload_a,
            ts: 0.0,
        };
        let other = ControlMessage {
            payload: payload_b,
            ..base.clone()
        };

        assert_eq!(base.sort_key(2), other.sort_key(2));
    }
}
