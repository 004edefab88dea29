//! Transport seams for the mixer SDK.
//!
//! The SDK core never opens sockets or HTTP connections itself. It talks
//! to two collaborators, both defined here as traits:
//!
//! - [`Connection`]: the chat socket. Delivers raw text frames and
//!   accepts raw text for sending. Framing, reconnect and heartbeat are
//!   its business.
//! - [`Requester`]: the REST channel. Given a verb, a path and a
//!   parameter map it returns a JSON value or a [`RequestError`]. It also
//!   owns the session token it attaches to outgoing requests.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketConnection`] via `tokio-tungstenite`
//! - `http` (default): [`HttpRequester`] via `reqwest`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::{RequestError, TransportError};
#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpRequester};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::future::Future;

/// Opaque identifier for a chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single chat connection that exchanges text frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the server.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next text frame from the server.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<String>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

/// HTTP verb for a [`Requester`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// The verb as it appears on the request line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters: a flat JSON object.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Issues REST requests on behalf of the SDK.
///
/// Implementations decide how parameters travel (query string for `GET`,
/// JSON body otherwise), attach the current session token to every
/// request, and pick up a refreshed token from every response.
///
/// The returned future must be `Send` so session operations can run on
/// any Tokio worker thread.
pub trait Requester: Send + Sync + 'static {
    /// Performs one request and returns the parsed JSON body.
    ///
    /// An empty success body is returned as `Value::Null`.
    fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> impl Future<Output = Result<serde_json::Value, RequestError>> + Send;

    /// The session token currently attached to requests, if any.
    fn session_token(&self) -> Option<String>;

    /// Replaces (or clears, with `None`) the session token.
    fn set_session_token(&self, token: Option<String>);
}
