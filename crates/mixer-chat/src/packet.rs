//! Typed chat packets.
//!
//! Everything the chat server pushes to us is decoded into exactly one
//! [`Packet`]. The variants mirror the server's event names; the field
//! names follow Rust conventions instead of the wire spelling (the wire
//! spelling is noted on each variant).

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Seconds between the Unix epoch and the chat protocol's reference
/// epoch, 2001-01-01T00:00:00Z.
///
/// Poll end times (`endsAt`) on the wire count from this instant, not
/// from 1970.
pub const REFERENCE_EPOCH_UNIX_SECS: u64 = 978_307_200;

/// The protocol's reference epoch as a `SystemTime`.
pub fn reference_epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(REFERENCE_EPOCH_UNIX_SECS)
}

/// Converts a wire `endsAt` value to an absolute time.
///
/// Returns `None` only if the result cannot be represented.
pub fn time_since_reference(secs: i64) -> Option<SystemTime> {
    let offset = Duration::from_secs(secs.unsigned_abs());
    if secs >= 0 {
        reference_epoch().checked_add(offset)
    } else {
        reference_epoch().checked_sub(offset)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One decoded chat protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// A single chat message (`ChatMessage` event).
    Message { message: ChatMessage },

    /// A batch of messages answering a `history` call (`reply` type).
    /// Order matches the server's array order.
    Messages { messages: Vec<ChatMessage> },

    /// A moderator deleted a message (`DeleteMessage` event).
    DeleteMessage { id: String },

    /// A poll started (`PollStart` event: `answers`, `q`, `endsAt`,
    /// `duration`).
    PollStart {
        answers: Vec<String>,
        question: String,
        end_time: SystemTime,
        duration_secs: u64,
    },

    /// A poll finished (`PollEnd` event: `voters`, `responses`).
    PollEnd {
        voters: u64,
        responses: BTreeMap<String, u64>,
    },

    /// A user joined the channel (`UserJoin` event: `username`, `roles`,
    /// `id`).
    UserJoin {
        username: String,
        roles: BTreeSet<String>,
        user_id: u64,
    },

    /// A user left the channel (`UserLeave` event, same fields as join).
    UserLeave {
        username: String,
        roles: BTreeSet<String>,
        user_id: u64,
    },

    /// A user's roles or permissions changed (`UserUpdate` event:
    /// `permissions`, `user`, `username`, `roles`).
    UserUpdate {
        permissions: BTreeSet<String>,
        user_id: u64,
        username: String,
        roles: BTreeSet<String>,
    },

    /// Anything this client doesn't know about yet. Kept whole so newer
    /// server events reach the application instead of vanishing.
    Unrecognized { raw: serde_json::Value },
}

impl Packet {
    /// Wire name of the event this packet was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "ChatMessage",
            Self::Messages { .. } => "reply",
            Self::DeleteMessage { .. } => "DeleteMessage",
            Self::PollStart { .. } => "PollStart",
            Self::PollEnd { .. } => "PollEnd",
            Self::UserJoin { .. } => "UserJoin",
            Self::UserLeave { .. } => "UserLeave",
            Self::UserUpdate { .. } => "UserUpdate",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A chat message as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel: u64,
    pub user_id: u64,
    pub user_name: String,
    #[serde(default)]
    pub user_roles: Vec<String>,
    pub message: MessageBody,
    /// Recipient of a whisper.
    #[serde(default)]
    pub target: Option<String>,
}

impl ChatMessage {
    /// Plain text of the message, segments concatenated in order.
    ///
    /// Segments of unknown type contribute nothing.
    pub fn text(&self) -> String {
        self.message
            .message
            .iter()
            .filter_map(MessageSegment::text)
            .collect()
    }

    /// Whether this message was whispered to a single user.
    pub fn is_whisper(&self) -> bool {
        self.message.meta.whisper
    }
}

/// The body of a chat message: rich-text segments plus flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: Vec<MessageSegment>,
    #[serde(default)]
    pub meta: MessageMeta,
}

/// Flags describing how a message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    #[serde(default)]
    pub whisper: bool,
    /// `/me` action message.
    #[serde(default)]
    pub me: bool,
}

/// One piece of a message body, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageSegment {
    Text {
        text: String,
    },
    Emoticon {
        text: String,
        #[serde(default)]
        source: String,
        #[serde(default)]
        pack: String,
    },
    Link {
        text: String,
        url: String,
    },
    /// An `@mention`.
    Tag {
        text: String,
        username: String,
        id: u64,
    },
    #[serde(other)]
    Unknown,
}

impl MessageSegment {
    /// The segment's display text, if it has one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text }
            | Self::Emoticon { text, .. }
            | Self::Link { text, .. }
            | Self::Tag { text, .. } => Some(text),
            Self::Unknown => None,
        }
    }
}
