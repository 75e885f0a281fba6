//! Engine.IO v4 / Socket.IO v5 text frame codec.
//!
//! The real-time service speaks Socket.IO over a plain WebSocket. Each
//! WebSocket text message is one Engine.IO packet: a single type digit
//! followed by an optional payload. Engine.IO `message` packets (`4`) carry
//! a Socket.IO packet, itself a type digit, an optional `/namespace,`, an
//! optional ack id, and a JSON payload.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   open
//! 2 / 3                                   ping / pong
//! 40 / 40{"sid":".."}                     connect / connect ack
//! 42["taskCreated",{..}]                  event
//! ```
//!
//! Binary attachments are not used by the task service and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for frame encode/decode operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame carried no packet type.
    #[error("empty frame")]
    Empty,
    /// Engine.IO or Socket.IO packet type is not recognized.
    #[error("unknown packet type {0:?}")]
    UnknownPacketType(char),
    /// Packet type is valid but not supported by this client.
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
    /// JSON payload could not be parsed or produced.
    #[error("json error: {0}")]
    Json(String),
    /// Event payload has the wrong shape.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Engine.IO handshake sent by the server in the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the connection may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server ping period in milliseconds.
    pub ping_interval: u64,
    /// How long the server waits for a pong, in milliseconds.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One decoded WebSocket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO `open` with the session handshake.
    Open(Handshake),
    /// Engine.IO `close`.
    Close,
    /// Engine.IO `ping` (server heartbeat).
    Ping,
    /// Engine.IO `pong`.
    Pong,
    /// Engine.IO `noop`, also used for Socket.IO acks we never request.
    Noop,
    /// Socket.IO `CONNECT` (client request or server ack with `sid`).
    Connect {
        /// Socket.IO session id, present on the server's ack.
        sid: Option<String>,
    },
    /// Socket.IO `CONNECT_ERROR`.
    ConnectError(String),
    /// Socket.IO `DISCONNECT`.
    Disconnect,
    /// Socket.IO `EVENT`.
    Event {
        /// Event name (first array element).
        name: String,
        /// Remaining array elements.
        args: Vec<Value>,
        /// Ack id, when the sender asked for an acknowledgment.
        ack_id: Option<u64>,
    },
}

impl Frame {
    /// Convenience constructor for an event frame without ack id.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Event {
            name: name.into(),
            args,
            ack_id: None,
        }
    }
}

/// Decodes one WebSocket text message.
///
/// # Errors
///
/// Returns [`CodecError`] for empty input, unknown packet types, binary
/// packets, or malformed JSON payloads.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(Frame::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Frame::Close),
        // Ping/pong may carry a probe payload during upgrades; ignore it.
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_packet(rest),
        '5' => Err(CodecError::Unsupported("transport upgrade")),
        '6' => Ok(Frame::Noop),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

/// Payload of the server's Socket.IO connect acknowledgment.
#[derive(Deserialize)]
struct ConnectAck {
    sid: Option<String>,
}

/// Decodes the Socket.IO packet inside an Engine.IO `message`.
fn decode_packet(body: &str) -> Result<Frame, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = strip_namespace(chars.as_str());
    match kind {
        '0' => {
            if rest.is_empty() {
                return Ok(Frame::Connect { sid: None });
            }
            let ack: ConnectAck = serde_json::from_str(rest)?;
            Ok(Frame::Connect { sid: ack.sid })
        }
        '1' => Ok(Frame::Disconnect),
        '2' => decode_event(rest),
        '3' => Ok(Frame::Noop),
        '4' => {
            let value: Value = serde_json::from_str(rest)?;
            let message = match &value {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), str::to_string),
                other => other.to_string(),
            };
            Ok(Frame::ConnectError(message))
        }
        '5' | '6' => Err(CodecError::Unsupported("binary packet")),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

/// Drops a leading `/namespace,` prefix. The task service only uses the
/// default namespace.
fn strip_namespace(s: &str) -> &str {
    if !s.starts_with('/') {
        return s;
    }
    s.find(',').map_or("", |idx| &s[idx + 1..])
}

fn decode_event(rest: &str) -> Result<Frame, CodecError> {
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let (ack, payload) = rest.split_at(digits);
    let ack_id = if ack.is_empty() {
        None
    } else {
        Some(
            ack.parse::<u64>()
                .map_err(|e| CodecError::InvalidEvent(format!("bad ack id: {e}")))?,
        )
    };

    let value: Value = serde_json::from_str(payload)?;
    let Value::Array(mut items) = value else {
        return Err(CodecError::InvalidEvent(
            "event payload is not an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(CodecError::InvalidEvent("event has no name".to_string()));
    }
    let Value::String(name) = items.remove(0) else {
        return Err(CodecError::InvalidEvent(
            "event name is not a string".to_string(),
        ));
    };
    Ok(Frame::Event {
        name,
        args: items,
        ack_id,
    })
}

/// Encodes a frame as a WebSocket text message.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if a payload cannot be serialized.
pub fn encode_frame(frame: &Frame) -> Result<String, CodecError> {
    let text = match frame {
        Frame::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
        Frame::Close => "1".to_string(),
        Frame::Ping => "2".to_string(),
        Frame::Pong => "3".to_string(),
        Frame::Noop => "6".to_string(),
        Frame::Connect { sid: None } => "40".to_string(),
        Frame::Connect { sid: Some(sid) } => {
            format!("40{}", serde_json::json!({ "sid": sid }))
        }
        Frame::ConnectError(message) => {
            format!("44{}", serde_json::json!({ "message": message }))
        }
        Frame::Disconnect => "41".to_string(),
        Frame::Event { name, args, ack_id } => {
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            let payload = serde_json::to_string(&Value::Array(items))?;
            match ack_id {
                Some(id) => format!("42{id}{payload}"),
                None => format!("42{payload}"),
            }
        }
    };
    Ok(text)
}

/// Encodes the client's Socket.IO `CONNECT` packet, optionally carrying an
/// auth payload.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the auth payload cannot be serialized.
pub fn encode_connect(auth: Option<&Value>) -> Result<String, CodecError> {
    match auth {
        Some(value) => Ok(format!("40{}", serde_json::to_string(value)?)),
        None => Ok("40".to_string()),
    }
}
