//! Chat wire protocol for the mixer SDK.
//!
//! - **Packets** ([`Packet`], [`ChatMessage`]): the closed set of typed
//!   events the chat server pushes.
//! - **Commands** ([`Sendable`], [`Command`]): outbound method calls.
//! - **Codec** ([`encode`], [`decode`], [`ChatCodec`]): conversion
//!   between the two and raw JSON, plus the per-connection
//!   [`SequenceCounter`].
//!
//! # Architecture
//!
//! ```text
//! Connection (text frames) → decode → Packet → application
//! application → Command → encode → Connection
//! ```
//!
//! Nothing here does I/O. Decoding is pure and safe to run from any
//! number of tasks at once.

mod codec;
mod command;
mod error;
mod packet;

pub use codec::{ChatCodec, SequenceCounter, decode, decode_str, encode};
pub use command::{Command, Sendable};
pub use error::ChatError;
pub use packet::{
    ChatMessage, MessageBody, MessageMeta, MessageSegment, Packet,
    REFERENCE_EPOCH_UNIX_SECS, reference_epoch, time_since_reference,
};
