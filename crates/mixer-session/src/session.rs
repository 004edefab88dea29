//! Session types: who is signed in and how the machine reaches the server.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// REST paths the session machine calls.
///
/// Defaults match the platform's public API; override them when talking
/// to a staging deployment or a proxy with a different layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `POST` with `username`, `password` and optional `code`.
    pub login_path: String,

    /// `POST` with `username`, `password` and `email`.
    pub register_path: String,

    /// `DELETE` to end the current session.
    pub logout_path: String,

    /// `GET` the signed-in user; used to resume a stored session.
    pub current_user_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_path: "/users/login".to_string(),
            register_path: "/users".to_string(),
            logout_path: "/users/current".to_string(),
            current_user_path: "/users/current".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The signed-in account, as returned by the login, register and
/// current-user endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub level: u32,
    /// The user's own channel, if the server included it.
    #[serde(default)]
    pub channel: Option<UserChannel>,
}

/// Minimal view of a user's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChannel {
    pub id: u64,
    /// The channel's URL name.
    #[serde(default)]
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a [`SessionStateMachine`](crate::SessionStateMachine) is in the
/// authentication lifecycle.
///
/// ```text
/// LoggedOut ──authenticate──→ Authenticating ──ok──→ Authenticated
///     ↑                           │    │                  │
///     └────────failure────────────┘    │needs code        │logout
///     ↑                                ▼                  │
///     └──failure── AwaitingTwoFactor ──authenticate(code)─┘→ Authenticated
/// ```
///
/// There is no terminal state; a machine cycles through these for as
/// long as the application keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    LoggedOut,

    /// A login request is on the wire.
    Authenticating,

    /// The server asked for a one-time code. Only the username is kept;
    /// the password has to be supplied again with the code.
    AwaitingTwoFactor { username: String },

    Authenticated(User),
}

impl SessionState {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Authenticating => "authenticating",
            Self::AwaitingTwoFactor { .. } => "awaiting_two_factor",
            Self::Authenticated(_) => "authenticated",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
