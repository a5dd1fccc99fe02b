//! Gateway envelope
//!
//! Every frame in either direction is `{op, t?, s?, d?}`.

use super::{CloseCode, HelloPayload, IdentifyPayload, OpCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: OpCode,

    /// Event name (Dispatch and Event)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Per-connection sequence number (Dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    // === Server Messages ===

    #[must_use]
    pub fn dispatch(event_name: &str, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_name.to_string()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    #[must_use]
    pub fn hello(payload: HelloPayload) -> Self {
        Self {
            op: OpCode::Hello,
            t: None,
            s: None,
            d: Some(serde_json::to_value(payload).unwrap_or_default()),
        }
    }

    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck,
            t: None,
            s: None,
            d: None,
        }
    }

    // === Client Messages ===

    #[must_use]
    pub fn identify(token: impl Into<String>) -> Self {
        Self {
            op: OpCode::Identify,
            t: None,
            s: None,
            d: Some(serde_json::json!({ "token": token.into() })),
        }
    }

    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            op: OpCode::Heartbeat,
            t: None,
            s: None,
            d: None,
        }
    }

    #[must_use]
    pub fn event(event_name: &str, data: Value) -> Self {
        Self {
            op: OpCode::Event,
            t: Some(event_name.to_string()),
            s: None,
            d: Some(data),
        }
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    // === Encoding ===

    /// Decode a client text frame, telling an unknown op code apart from
    /// a malformed frame.
    pub fn decode(text: &str) -> Result<Self, CloseCode> {
        let value: Value = serde_json::from_str(text).map_err(|_| CloseCode::DecodeError)?;
        let op = value
            .get("op")
            .and_then(Value::as_u64)
            .ok_or(CloseCode::DecodeError)?;
        if u8::try_from(op).ok().and_then(OpCode::from_u8).is_none() {
            return Err(CloseCode::UnknownOpcode);
        }
        serde_json::from_value(value).map_err(|_| CloseCode::DecodeError)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
