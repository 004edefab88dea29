//! Session authentication for the mixer SDK.
//!
//! This crate owns the signed-in identity:
//!
//! 1. **State machine**: [`SessionStateMachine`] drives login, two-factor
//!    challenges, registration, logout and session resume through a
//!    [`Requester`](mixer_transport::Requester).
//! 2. **Error taxonomy**: [`AuthError`] plus the pure [`classify`]
//!    function that maps server replies onto it.
//! 3. **Persistence seam**: [`CredentialStore`] keeps the session token
//!    between runs.
//!
//! # How it fits in the stack
//!
//! ```text
//! Application / resource routes (above)  ← share the machine via Arc
//!     ↕
//! Session layer (this crate)             ← who is signed in
//!     ↕
//! Transport (below)                      ← Requester: verb + path + params → JSON
//! ```

mod error;
mod machine;
mod session;
mod store;

pub use error::{AuthError, StoreError, TWO_FACTOR_STATUS, classify};
pub use machine::{Operation, SessionStateMachine};
pub use session::{SessionConfig, SessionState, User, UserChannel};
pub use store::{CredentialStore, MemoryCredentialStore, StoredSession};
