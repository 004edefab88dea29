//! The session state machine.
//!
//! One [`SessionStateMachine`] per signed-in identity. The application
//! owns it (usually behind an `Arc`) and hands it to whatever needs
//! authenticated calls; there is no global session.
//!
//! # Single flight
//!
//! Only one mutating operation runs at a time. A second call while one is
//! pending returns [`AuthError::OperationInProgress`] right away instead
//! of racing it. The slot is held by a drop guard, so dropping an
//! operation's future mid-request frees the machine again and puts the
//! state and the requester's session token back where they were.
//!
//! # Stale replies
//!
//! Every local sign-out bumps an epoch. A reply to an operation that
//! started before the bump is thrown away; its caller sees
//! [`AuthError::NotAuthenticated`], and any session token that reply
//! left on the requester is dropped with it.
//!
//! # Locking
//!
//! State lives in a `std::sync::Mutex` that is only ever held for a few
//! assignments and never across an `.await`. The only suspension point
//! is the [`Requester`] call.

use std::sync::{Mutex, MutexGuard, PoisonError};

use mixer_transport::{Method, Params, Requester};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    AuthError, CredentialStore, MemoryCredentialStore, SessionConfig,
    SessionState, StoredSession, User,
};

/// The operation currently holding the single-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Authenticate,
    Register,
    Logout,
    Refresh,
}

struct Inner {
    state: SessionState,
    in_flight: Option<Operation>,
    /// Bumped by every sign-out.
    epoch: u64,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authentication lifecycle for one user against the platform.
pub struct SessionStateMachine<R: Requester, S: CredentialStore = MemoryCredentialStore> {
    requester: R,
    store: S,
    config: SessionConfig,
    inner: Mutex<Inner>,
}

impl<R: Requester> SessionStateMachine<R, MemoryCredentialStore> {
    /// A machine with default paths and an in-memory credential store.
    pub fn new(requester: R) -> Self {
        Self::with_store(requester, MemoryCredentialStore::new(), SessionConfig::default())
    }
}

impl<R: Requester, S: CredentialStore> SessionStateMachine<R, S> {
    /// A machine with the given store and paths.
    pub fn with_store(requester: R, store: S, config: SessionConfig) -> Self {
        Self {
            requester,
            store,
            config,
            inner: Mutex::new(Inner {
                state: SessionState::LoggedOut,
                in_flight: None,
                epoch: 0,
            }),
        }
    }

    // -- Queries ----------------------------------------------------------

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        lock(&self.inner).state.clone()
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<User> {
        match &lock(&self.inner).state {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// The operation holding the single-flight slot, if any.
    pub fn in_flight(&self) -> Option<Operation> {
        lock(&self.inner).in_flight
    }

    /// The requester, for callers that make authenticated REST calls of
    /// their own.
    pub fn requester(&self) -> &R {
        &self.requester
    }

    /// The REST paths this machine talks to.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -- Operations -------------------------------------------------------

    /// Signs in with a username and password.
    ///
    /// If the account has two-factor authentication the call fails with
    /// [`AuthError::TwoFactorRequired`] and the machine waits in
    /// [`SessionState::AwaitingTwoFactor`] for
    /// [`authenticate_with_code`](Self::authenticate_with_code).
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        self.login(username, password, None).await
    }

    /// Signs in with a username, password and one-time code.
    ///
    /// Works both as a fresh sign-in and to answer a pending two-factor
    /// challenge. A rejected code is [`AuthError::InvalidCredentials`].
    pub async fn authenticate_with_code(
        &self,
        username: &str,
        password: &str,
        code: &str,
    ) -> Result<User, AuthError> {
        self.login(username, password, Some(code)).await
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<User, AuthError> {
        let flight = self.begin(Operation::Authenticate, |_| {
            Ok(Some(SessionState::Authenticating))
        })?;

        let mut params = Params::new();
        params.insert("username".into(), username.into());
        params.insert("password".into(), password.into());
        if let Some(code) = code {
            params.insert("code".into(), code.into());
        }

        tracing::debug!(username, with_code = code.is_some(), "authenticating");
        let reply = self
            .requester
            .request(Method::Post, &self.config.login_path, &params)
            .await;

        match reply.map_err(AuthError::from).and_then(parse_user) {
            Ok(user) => {
                flight.settle(SessionState::Authenticated(user.clone()))?;
                self.persist_token();
                tracing::info!(user_id = user.id, username = %user.username, "authenticated");
                Ok(user)
            }
            Err(err) => {
                let err = login_failure(err, code.is_some());
                if err == AuthError::TwoFactorRequired {
                    flight.settle(SessionState::AwaitingTwoFactor {
                        username: username.to_owned(),
                    })?;
                    tracing::info!(username, "two-factor code required");
                } else {
                    flight.settle(SessionState::LoggedOut)?;
                    self.requester.set_session_token(None);
                    tracing::info!(username, error = %err, "authentication failed");
                }
                Err(err)
            }
        }
    }

    /// Creates an account. On success the new account is signed in.
    ///
    /// No validation happens locally; the server decides and the first
    /// failure it reports is returned. On failure the state is left as it
    /// was before the call.
    pub async fn register_account(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<User, AuthError> {
        let flight = self.begin(Operation::Register, |_| Ok(None))?;

        let mut params = Params::new();
        params.insert("username".into(), username.into());
        params.insert("password".into(), password.into());
        params.insert("email".into(), email.into());

        tracing::debug!(username, "registering account");
        let reply = self
            .requester
            .request(Method::Post, &self.config.register_path, &params)
            .await;

        match reply.map_err(AuthError::from).and_then(parse_user) {
            Ok(user) => {
                flight.settle(SessionState::Authenticated(user.clone()))?;
                self.persist_token();
                tracing::info!(user_id = user.id, username = %user.username, "account registered");
                Ok(user)
            }
            Err(err) => {
                tracing::info!(username, error = %err, "registration rejected");
                flight.restore()?;
                Err(err)
            }
        }
    }

    /// Ends the current session.
    ///
    /// Fails with [`AuthError::NotAuthenticated`], without touching the
    /// network, unless the machine is
    /// [`Authenticated`](SessionState::Authenticated). If the server says
    /// the session is already gone the local sign-out still happens and
    /// the call succeeds. Other failures leave the session in place.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let flight = self.begin(Operation::Logout, |state| match state {
            SessionState::Authenticated(_) => Ok(None),
            _ => Err(AuthError::NotAuthenticated),
        })?;

        let reply = self
            .requester
            .request(Method::Delete, &self.config.logout_path, &Params::new())
            .await;

        match reply.map_err(AuthError::from) {
            Ok(_) => {}
            Err(AuthError::InvalidCredentials | AuthError::NotAuthenticated) => {
                tracing::debug!("server had already ended the session");
            }
            Err(err) => {
                tracing::warn!(error = %err, "logout failed");
                flight.restore()?;
                return Err(err);
            }
        }

        flight.sign_out()?;
        self.forget_credentials();
        tracing::info!("logged out");
        Ok(())
    }

    /// Resumes the session saved by an earlier run.
    ///
    /// Fails with [`AuthError::NotAuthenticated`], without touching the
    /// network, when nothing is stored. A stored token the server no
    /// longer accepts is deleted and also yields `NotAuthenticated`.
    pub async fn refresh_previous_session(&self) -> Result<User, AuthError> {
        let flight = self.begin(Operation::Refresh, |_| Ok(None))?;

        let stored = match self.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!("no stored session to resume");
                flight.restore()?;
                return Err(AuthError::NotAuthenticated);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored session");
                flight.restore()?;
                return Err(AuthError::NotAuthenticated);
            }
        };

        self.requester.set_session_token(Some(stored.token));
        let reply = self
            .requester
            .request(Method::Get, &self.config.current_user_path, &Params::new())
            .await;

        match reply.map_err(AuthError::from).and_then(parse_user) {
            Ok(user) => {
                flight.settle(SessionState::Authenticated(user.clone()))?;
                self.persist_token();
                tracing::info!(user_id = user.id, username = %user.username, "session resumed");
                Ok(user)
            }
            Err(AuthError::InvalidCredentials | AuthError::NotAuthenticated) => {
                tracing::info!("stored session was rejected");
                flight.settle(SessionState::LoggedOut)?;
                self.forget_credentials();
                Err(AuthError::NotAuthenticated)
            }
            Err(err) => {
                tracing::info!(error = %err, "could not resume session");
                flight.restore()?;
                Err(err)
            }
        }
    }

    /// Drops the local session immediately, without a network call.
    ///
    /// Any operation still waiting on the server will have its reply
    /// discarded.
    pub fn force_sign_out(&self) {
        {
            let mut inner = lock(&self.inner);
            inner.state = SessionState::LoggedOut;
            inner.epoch += 1;
        }
        self.forget_credentials();
        tracing::info!("session dropped locally");
    }

    // -- Internals --------------------------------------------------------

    /// Takes the single-flight slot.
    ///
    /// `enter` sees the current state and either rejects the call or
    /// names the state to hold while the request is out (`None` keeps the
    /// current one). The slot check comes first, so a busy machine always
    /// answers `OperationInProgress`.
    fn begin<F>(&self, op: Operation, enter: F) -> Result<Flight<'_, R>, AuthError>
    where
        F: FnOnce(&SessionState) -> Result<Option<SessionState>, AuthError>,
    {
        let mut inner = lock(&self.inner);
        if let Some(running) = inner.in_flight {
            tracing::debug!(requested = ?op, ?running, "rejected: operation in progress");
            return Err(AuthError::OperationInProgress);
        }

        let during = enter(&inner.state)?;
        let prior = inner.state.clone();
        if let Some(during) = during {
            inner.state = during;
        }
        inner.in_flight = Some(op);

        Ok(Flight {
            inner: &self.inner,
            requester: &self.requester,
            op,
            epoch: inner.epoch,
            prior,
            prior_token: self.requester.session_token(),
            settled: false,
        })
    }

    fn persist_token(&self) {
        let Some(token) = self.requester.session_token() else {
            return;
        };
        if let Err(e) = self.store.save(&StoredSession { token }) {
            tracing::warn!(error = %e, "could not persist session token");
        }
    }

    fn forget_credentials(&self) {
        self.requester.set_session_token(None);
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "could not clear stored session");
        }
    }
}

/// Holder of the single-flight slot for one operation.
///
/// Consumed by exactly one of [`settle`](Self::settle),
/// [`restore`](Self::restore) or [`sign_out`](Self::sign_out). If it is
/// dropped unsettled (the operation's future was cancelled) the slot is
/// released and the state and session token from before the operation
/// are put back.
///
/// A reply that arrives after a local sign-out changes nothing: the state
/// stays as the sign-out left it and whatever token the reply installed
/// on the requester is cleared.
struct Flight<'a, R: Requester> {
    inner: &'a Mutex<Inner>,
    requester: &'a R,
    op: Operation,
    epoch: u64,
    prior: SessionState,
    prior_token: Option<String>,
    settled: bool,
}

impl<R: Requester> Flight<'_, R> {
    /// Releases the slot and moves to `next`, unless the reply is stale.
    fn settle(mut self, next: SessionState) -> Result<(), AuthError> {
        self.finish(next, false)
    }

    /// Releases the slot and goes back to the state and session token
    /// from before the operation.
    fn restore(mut self) -> Result<(), AuthError> {
        let prior = self.prior.clone();
        let token = self.prior_token.clone();
        self.finish(prior, false)?;
        self.requester.set_session_token(token);
        Ok(())
    }

    /// Releases the slot, moves to `LoggedOut` and invalidates any older
    /// reply still in transit.
    fn sign_out(mut self) -> Result<(), AuthError> {
        self.finish(SessionState::LoggedOut, true)
    }

    fn finish(&mut self, next: SessionState, bump_epoch: bool) -> Result<(), AuthError> {
        self.settled = true;
        let mut inner = lock(self.inner);
        inner.in_flight = None;
        if inner.epoch != self.epoch {
            drop(inner);
            tracing::debug!(op = ?self.op, "discarding stale reply");
            self.requester.set_session_token(None);
            return Err(AuthError::NotAuthenticated);
        }
        tracing::debug!(
            op = ?self.op,
            from = inner.state.name(),
            to = next.name(),
            "session transition"
        );
        inner.state = next;
        if bump_epoch {
            inner.epoch += 1;
        }
        Ok(())
    }
}

impl<R: Requester> Drop for Flight<'_, R> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let current = {
            let mut inner = lock(self.inner);
            inner.in_flight = None;
            let current = inner.epoch == self.epoch;
            if current {
                inner.state = std::mem::take(&mut self.prior);
            }
            current
        };
        tracing::debug!(op = ?self.op, current, "operation cancelled, restoring state");
        let token = if current { self.prior_token.take() } else { None };
        self.requester.set_session_token(token);
    }
}

/// Adjusts a login failure for the sign-in context.
///
/// With a code attached, another two-factor demand means the code was
/// wrong. A 403 on the login route is a rejected credential, not a
/// missing session.
fn login_failure(err: AuthError, with_code: bool) -> AuthError {
    match err {
        AuthError::TwoFactorRequired if with_code => AuthError::InvalidCredentials,
        AuthError::NotAuthenticated => AuthError::InvalidCredentials,
        other => other,
    }
}

fn parse_user(body: Value) -> Result<User, AuthError> {
    User::deserialize(&body).map_err(|e| AuthError::UnrecognizedResponse(format!("user: {e}")))
}
