//! Error taxonomy for authentication.
//!
//! Every way a session operation can fail is one [`AuthError`] member.
//! Mapping a raw server reply to a member is done by [`classify`], a pure
//! function, so the whole table can be tested without a network.
//!
//! # Reply table
//!
//! | status    | body                                           | member                  |
//! |-----------|------------------------------------------------|-------------------------|
//! | 400 / 422 | first `details` entry `username` / `invalid`   | `InvalidUsername`       |
//! | 400 / 422 | first `details` entry `username` / `unique`    | `TakenUsername`         |
//! | 400 / 422 | first `details` entry `password` / `invalid`, `weak` | `WeakPassword`    |
//! | 400 / 422 | first `details` entry `email` / `invalid`      | `InvalidEmail`          |
//! | 400 / 422 | first `details` entry `email` / `unique`       | `TakenEmail`            |
//! | 401       | any                                            | `InvalidCredentials`    |
//! | 403       | any                                            | `NotAuthenticated`      |
//! | 499       | any                                            | `TwoFactorRequired`     |
//! | otherwise |                                                | `UnrecognizedResponse`  |
//!
//! Only the first `details` entry counts; the server's order decides which
//! failure is reported.

use mixer_transport::RequestError;
use serde_json::Value;

/// Status the platform uses to demand a one-time code.
pub const TWO_FACTOR_STATUS: u16 = 499;

/// Why a session operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Wrong username/password, or a rejected one-time code.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The operation needs a signed-in session and there is none.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid username")]
    InvalidUsername,

    #[error("username is already taken")]
    TakenUsername,

    #[error("password is too weak")]
    WeakPassword,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("email address is already in use")]
    TakenEmail,

    /// The account has two-factor authentication enabled; retry with a
    /// code.
    #[error("two-factor code required")]
    TwoFactorRequired,

    /// Another session operation is still running on this instance.
    #[error("another session operation is in progress")]
    OperationInProgress,

    /// The request never got an answer.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The server answered in a shape this client doesn't know.
    #[error("unrecognized response: {0}")]
    UnrecognizedResponse(String),
}

impl AuthError {
    /// Maps a failed [`Requester`](mixer_transport::Requester) call.
    pub fn from_request_error(err: &RequestError) -> Self {
        match err {
            RequestError::Http { status, body } => classify(*status, body),
            RequestError::Network(msg) => Self::NetworkFailure(msg.clone()),
            RequestError::InvalidBody(msg) => Self::UnrecognizedResponse(msg.clone()),
        }
    }
}

impl From<RequestError> for AuthError {
    fn from(err: RequestError) -> Self {
        Self::from_request_error(&err)
    }
}

/// Maps an HTTP error status and its JSON body to a taxonomy member.
pub fn classify(status: u16, body: &Value) -> AuthError {
    match status {
        400 | 422 => classify_validation(body).unwrap_or_else(|| {
            AuthError::UnrecognizedResponse(format!("HTTP {status}: {body}"))
        }),
        401 => AuthError::InvalidCredentials,
        403 => AuthError::NotAuthenticated,
        TWO_FACTOR_STATUS => AuthError::TwoFactorRequired,
        _ => AuthError::UnrecognizedResponse(format!("HTTP {status}: {body}")),
    }
}

fn classify_validation(body: &Value) -> Option<AuthError> {
    let first = body.get("details")?.as_array()?.first()?;
    let path = first.get("path")?.as_str()?;
    let kind = first.get("type")?.as_str()?;

    match (path, kind) {
        ("username", "invalid") => Some(AuthError::InvalidUsername),
        ("username", "unique") => Some(AuthError::TakenUsername),
        ("password", "invalid" | "weak") => Some(AuthError::WeakPassword),
        ("email", "invalid") => Some(AuthError::InvalidEmail),
        ("email", "unique") => Some(AuthError::TakenEmail),
        _ => None,
    }
}

/// Errors from a [`CredentialStore`](crate::CredentialStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored credentials are corrupt: {0}")]
    Corrupt(String),
}
