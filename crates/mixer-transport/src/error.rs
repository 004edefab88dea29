/// Errors that can occur on the chat socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

/// Errors returned by a [`Requester`](crate::Requester).
///
/// A request either produces a JSON value or one of these. The session
/// layer turns them into its own error taxonomy; this type only says
/// *what happened on the wire*, not what it means.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// The server answered with a non-success status.
    ///
    /// `body` is the parsed JSON body, or `Value::Null` when the body
    /// was empty or not JSON.
    #[error("HTTP {status}")]
    Http {
        status: u16,
        body: serde_json::Value,
    },

    /// The request never produced a response (DNS, TCP, TLS, timeout).
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a success status but the body was not
    /// valid JSON.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl RequestError {
    /// Returns the HTTP status, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(_) | Self::InvalidBody(_) => None,
        }
    }
}
