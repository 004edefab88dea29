//! Unified error type for the mixer SDK.

use mixer_chat::ChatError;
use mixer_session::{AuthError, StoreError};
use mixer_transport::{RequestError, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    /// The chat socket failed (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A REST request failed before the session layer could classify it.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A chat frame could not be decoded.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// A session operation failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No chat endpoint was given to connect to.
    #[error("no chat endpoint available")]
    NoEndpoint,
}
