// Engine.IO v4 / Socket.IO v4 text framing
use crate::domain::events::{InboundEvent, LOCATION_EVENT, OutboundEvent};
use crate::domain::location::{LocationError, RawLocation};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownPacket(char),
    #[error("malformed event frame")]
    MalformedEvent,
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid location: {0}")]
    Location(#[from] LocationError),
}

/// Engine.IO `open` packet contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    /// Socket.IO namespace connect acknowledgement.
    Connected,
    Disconnect,
    ConnectError(String),
    Event { name: String, data: serde_json::Value },
    /// Acks, binary packets and upgrade probes; not used by this client.
    Ignored,
}

pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(rest),
        '5' => Ok(Packet::Ignored),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

fn decode_message(body: &str) -> Result<Packet, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connected),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(rest),
        '4' => Ok(Packet::ConnectError(connect_error_message(rest))),
        '3' | '5' | '6' => Ok(Packet::Ignored),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

/// Drops a leading `/namespace,` if present.
fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn decode_event(body: &str) -> Result<Packet, CodecError> {
    // an optional ack id precedes the argument array
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let mut args: Vec<serde_json::Value> = serde_json::from_str(body)?;
    if args.is_empty() {
        return Err(CodecError::MalformedEvent);
    }
    let name = match args.remove(0) {
        serde_json::Value::String(name) => name,
        _ => return Err(CodecError::MalformedEvent),
    };
    let data = if args.is_empty() {
        serde_json::Value::Null
    } else {
        args.remove(0)
    };
    Ok(Packet::Event { name, data })
}

fn connect_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ConnectErrorBody {
        message: String,
    }

    serde_json::from_str::<ConnectErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Map a named event to a domain event. Unknown names yield `None`.
pub fn inbound_event(
    name: &str,
    data: serde_json::Value,
    arrival: DateTime<Utc>,
) -> Result<Option<InboundEvent>, CodecError> {
    match name {
        LOCATION_EVENT => {
            let raw: RawLocation = serde_json::from_value(data)?;
            Ok(Some(InboundEvent::Location(raw.into_location(arrival)?)))
        }
        _ => Ok(None),
    }
}

pub fn encode_event(event: &OutboundEvent) -> Result<String, CodecError> {
    let frame = serde_json::to_string(&(event.name(), event.payload()?))?;
    Ok(format!("42{}", frame))
}

pub fn encode_connect() -> &'static str {
    "40"
}

pub fn encode_disconnect() -> &'static str {
    "41"
}

pub fn encode_pong() -> &'static str {
    "3"
}
