//! Encoding outbound commands and decoding inbound events.
//!
//! Both directions are plain functions over JSON. The only state is the
//! per-connection [`SequenceCounter`], which [`ChatCodec`] bundles with
//! the functions for callers that want one object per connection.
//!
//! # Outbound
//!
//! ```text
//! {"type":"method","method":"msg","arguments":["hello"],"id":3}
//! ```
//!
//! Key order is fixed. Arguments are written positionally as JSON
//! literals.
//!
//! # Inbound
//!
//! ```text
//! {"event":"UserJoin","data":{...}}     pushed event
//! {"type":"reply","data":[...]}         batched history reply
//! ```
//!
//! `event` wins when both keys are present. Anything else is
//! [`Packet::Unrecognized`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::packet::time_since_reference;
use crate::{ChatError, ChatMessage, Packet, Sendable};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a command as a wire string carrying `sequence` as its `id`.
///
/// Strings are written as JSON string literals, so quotes inside a
/// message are escaped and the output always parses. Never fails; a
/// command without arguments produces `"arguments":[]`.
///
/// ```rust
/// use mixer_chat::{encode, Command};
///
/// let wire = encode(&Command::msg("hello"), 3);
/// assert_eq!(
///     wire,
///     r#"{"type":"method","method":"msg","arguments":["hello"],"id":3}"#
/// );
/// ```
pub fn encode<S: Sendable + ?Sized>(command: &S, sequence: u64) -> String {
    let method = Value::from(command.identifier());
    let arguments = command
        .arguments()
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"{{"type":"method","method":{method},"arguments":[{arguments}],"id":{sequence}}}"#
    )
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes one inbound payload.
///
/// - `Some(packet)` for a recognized event or reply, or
///   `Some(Packet::Unrecognized)` for a shape this client doesn't know.
/// - `None` when the payload names a known event but a required field is
///   missing or has the wrong type. No packet is ever partially filled.
pub fn decode(payload: &Value) -> Option<Packet> {
    if let Some(event) = payload.get("event").and_then(Value::as_str) {
        return decode_event(event, payload);
    }

    if let Some(kind) = payload.get("type").and_then(Value::as_str) {
        if kind == "reply" {
            return decode_reply(payload);
        }
        tracing::debug!(kind, "unrecognized chat packet type");
        return Some(unrecognized(payload));
    }

    tracing::debug!("chat packet has neither event nor type");
    Some(unrecognized(payload))
}

/// Parses a raw text frame and decodes it.
///
/// # Errors
/// Returns [`ChatError::Decode`] if the frame is not JSON.
pub fn decode_str(frame: &str) -> Result<Option<Packet>, ChatError> {
    let payload: Value = serde_json::from_str(frame).map_err(ChatError::Decode)?;
    Ok(decode(&payload))
}

fn unrecognized(payload: &Value) -> Packet {
    Packet::Unrecognized {
        raw: payload.clone(),
    }
}

fn decode_event(event: &str, payload: &Value) -> Option<Packet> {
    const KNOWN: &[&str] = &[
        "ChatMessage",
        "DeleteMessage",
        "PollStart",
        "PollEnd",
        "UserJoin",
        "UserLeave",
        "UserUpdate",
    ];

    if !KNOWN.contains(&event) {
        tracing::debug!(event, "unrecognized chat event");
        return Some(unrecognized(payload));
    }

    let Some(data) = payload.get("data").and_then(Value::as_object) else {
        tracing::trace!(event, "event without a data object");
        return None;
    };

    let packet = match event {
        "ChatMessage" => Some(Packet::Message {
            message: message(payload.get("data")?)?,
        }),
        "DeleteMessage" => Some(Packet::DeleteMessage {
            id: string(data, "id")?,
        }),
        "PollStart" => Some(Packet::PollStart {
            answers: strings(data, "answers")?,
            question: string(data, "q")?,
            end_time: time_since_reference(data.get("endsAt")?.as_i64()?)?,
            duration_secs: data.get("duration")?.as_u64()?,
        }),
        "PollEnd" => Some(Packet::PollEnd {
            voters: data.get("voters")?.as_u64()?,
            responses: counts(data, "responses")?,
        }),
        "UserJoin" => Some(Packet::UserJoin {
            username: string(data, "username")?,
            roles: string_set(data, "roles")?,
            user_id: data.get("id")?.as_u64()?,
        }),
        "UserLeave" => Some(Packet::UserLeave {
            username: string(data, "username")?,
            roles: string_set(data, "roles")?,
            user_id: data.get("id")?.as_u64()?,
        }),
        "UserUpdate" => Some(Packet::UserUpdate {
            permissions: string_set(data, "permissions")?,
            user_id: data.get("user")?.as_u64()?,
            username: string(data, "username")?,
            roles: string_set(data, "roles")?,
        }),
        _ => None,
    };

    if packet.is_none() {
        tracing::trace!(event, "event is missing a required field");
    }
    packet
}

/// A `reply` turns into one `Messages` packet. One undecodable element
/// drops the whole batch.
fn decode_reply(payload: &Value) -> Option<Packet> {
    let items = payload.get("data")?.as_array()?;
    let mut messages = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(decoded) = message(item) else {
            tracing::debug!(index, len = items.len(), "dropping reply batch: bad message");
            return None;
        };
        messages.push(decoded);
    }
    Some(Packet::Messages { messages })
}

// -- Field extraction -------------------------------------------------------

fn message(value: &Value) -> Option<ChatMessage> {
    ChatMessage::deserialize(value)
        .inspect_err(|e| tracing::trace!(error = %e, "bad chat message"))
        .ok()
}

fn string(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)?.as_str().map(str::to_owned)
}

fn strings(data: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    data.get(key)?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect()
}

fn string_set(data: &Map<String, Value>, key: &str) -> Option<BTreeSet<String>> {
    strings(data, key).map(|v| v.into_iter().collect())
}

fn counts(data: &Map<String, Value>, key: &str) -> Option<BTreeMap<String, u64>> {
    data.get(key)?
        .as_object()?
        .iter()
        .map(|(answer, votes)| Some((answer.clone(), votes.as_u64()?)))
        .collect()
}

// ---------------------------------------------------------------------------
// Sequence counter
// ---------------------------------------------------------------------------

/// Per-connection id source for outbound commands.
///
/// Every call to [`next_id`](Self::next_id) returns a value no other call
/// has returned, even under concurrent use: the values form an unbroken
/// run starting at the initial value. A new connection gets a new counter.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    /// A counter whose first id is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// A counter whose first id is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Issues the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`next_id`](Self::next_id) would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// ChatCodec
// ---------------------------------------------------------------------------

/// Encoder/decoder for one chat connection.
#[derive(Debug, Default)]
pub struct ChatCodec {
    sequence: SequenceCounter,
}

impl ChatCodec {
    /// A codec whose first command gets id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// A codec whose first command gets id `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            sequence: SequenceCounter::starting_at(start),
        }
    }

    /// Encodes `command` with a freshly issued id and returns both.
    pub fn encode_next<S: Sendable + ?Sized>(&self, command: &S) -> (u64, String) {
        let id = self.sequence.next_id();
        (id, encode(command, id))
    }

    /// See [`decode`].
    pub fn decode(&self, payload: &Value) -> Option<Packet> {
        decode(payload)
    }

    /// See [`decode_str`].
    pub fn decode_str(&self, frame: &str) -> Result<Option<Packet>, ChatError> {
        decode_str(frame)
    }

    /// The connection's sequence counter.
    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }
}
