//! Pluggable persistence for the session token.
//!
//! The machine saves the token after every successful sign-in and reads
//! it back in
//! [`refresh_previous_session`](crate::SessionStateMachine::refresh_previous_session).
//! Where it lives (keychain, file, nowhere) is up to the application.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// What gets persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
}

/// Where and how a [`StoredSession`] is kept.
pub trait CredentialStore: Send + Sync + 'static {
    /// Loads the stored session, or `None` if there is none.
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replaces the stored session.
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Forgets the stored session (on sign-out).
    fn clear(&self) -> Result<(), StoreError>;
}

/// Keeps the session in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session: Mutex::new(Some(StoredSession {
                token: token.into(),
            })),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredSession>> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
