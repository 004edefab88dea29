//! Error types for the chat layer.
//!
//! Decoding a parsed JSON value never fails: unknown shapes become
//! [`Packet::Unrecognized`](crate::Packet::Unrecognized) and malformed
//! known events become `None`. The only error left is a text frame that
//! isn't JSON at all.

/// Errors that can occur in the chat layer.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The frame was not valid JSON.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
