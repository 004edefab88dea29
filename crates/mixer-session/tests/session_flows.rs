//! Integration tests for the session state machine against a scripted
//! requester.
//!
//! The stub answers each `(verb, path)` from a queue of canned replies,
//! records every call, and can optionally park a request until the test
//! releases it, which is how in-flight behavior is exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mixer_session::{
    AuthError, CredentialStore, MemoryCredentialStore, Operation, SessionConfig,
    SessionState, SessionStateMachine, StoreError, StoredSession,
};
use mixer_transport::{Method, Params, RequestError, Requester};
use serde_json::{Value, json};
use tokio::sync::Notify;

// =========================================================================
// Stub collaborators
// =========================================================================

type Reply = Result<Value, RequestError>;

/// Parks a request: the stub signals `started`, then waits for `release`.
#[derive(Default)]
struct Gate {
    started: Notify,
    release: Notify,
}

#[derive(Default)]
struct StubState {
    replies: HashMap<(Method, String), VecDeque<Reply>>,
    calls: Vec<(Method, String, Params)>,
    token: Option<String>,
}

/// Scripted [`Requester`]. Clones share state so the test can inspect
/// calls after handing one clone to the machine.
#[derive(Clone, Default)]
struct StubRequester {
    state: Arc<Mutex<StubState>>,
    gate: Option<Arc<Gate>>,
    /// Token the "server" hands out on any successful POST.
    issued_token: Option<String>,
}

impl StubRequester {
    fn reply(self, method: Method, path: &str, reply: Reply) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(reply);
        self
    }

    fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn issuing(mut self, token: &str) -> Self {
        self.issued_token = Some(token.to_owned());
        self
    }

    fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    fn last_call(&self) -> Option<(Method, String, Params)> {
        self.state.lock().unwrap().calls.last().cloned()
    }
}

impl Requester for StubRequester {
    async fn request(&self, method: Method, path: &str, params: &Params) -> Reply {
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((method, path.to_owned(), params.clone()));
            state
                .replies
                .get_mut(&(method, path.to_owned()))
                .and_then(VecDeque::pop_front)
        };

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        let reply = scripted.unwrap_or_else(|| {
            Err(RequestError::Network(format!("no reply scripted for {method} {path}")))
        });
        if reply.is_ok() && method == Method::Post {
            if let Some(token) = &self.issued_token {
                self.state.lock().unwrap().token = Some(token.clone());
            }
        }
        reply
    }

    fn session_token(&self) -> Option<String> {
        self.state.lock().unwrap().token.clone()
    }

    fn set_session_token(&self, token: Option<String>) {
        self.state.lock().unwrap().token = token;
    }
}

/// A credential store the test can look into after the machine owns it.
#[derive(Clone, Default)]
struct SharedStore(Arc<MemoryCredentialStore>);

impl CredentialStore for SharedStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        self.0.load()
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        self.0.save(session)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.0.clear()
    }
}

// =========================================================================
// Helpers
// =========================================================================

const LOGIN: &str = "/users/login";
const REGISTER: &str = "/users";
const CURRENT: &str = "/users/current";

fn user_json() -> Value {
    json!({ "id": 12, "username": "jack", "email": "jack@example.com", "verified": true })
}

fn http(status: u16, body: Value) -> Reply {
    Err(RequestError::Http { status, body })
}

fn validation(path: &str, kind: &str) -> Reply {
    http(
        400,
        json!({ "statusCode": 400, "details": [{ "path": path, "type": kind }] }),
    )
}

fn machine_with_store(
    stub: &StubRequester,
    store: &SharedStore,
) -> SessionStateMachine<StubRequester, SharedStore> {
    SessionStateMachine::with_store(stub.clone(), store.clone(), SessionConfig::default())
}

/// Signs a machine in with a scripted successful login.
async fn signed_in(
    stub: StubRequester,
    store: &SharedStore,
) -> (StubRequester, SessionStateMachine<StubRequester, SharedStore>) {
    let stub = stub.issuing("tok-1").reply(Method::Post, LOGIN, Ok(user_json()));
    let machine = machine_with_store(&stub, store);
    machine.authenticate("jack", "hunter22").await.expect("login should succeed");
    (stub, machine)
}

// =========================================================================
// authenticate()
// =========================================================================

#[tokio::test]
async fn test_authenticate_success_persists_token() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;

    let user = machine.user().expect("should be signed in");
    assert_eq!(user.username, "jack");
    assert!(machine.state().is_authenticated());
    assert_eq!(
        store.load().unwrap(),
        Some(StoredSession { token: "tok-1".into() })
    );

    let (method, path, params) = stub.last_call().unwrap();
    assert_eq!((method, path.as_str()), (Method::Post, LOGIN));
    assert_eq!(params["username"], "jack");
    assert_eq!(params["password"], "hunter22");
    assert!(!params.contains_key("code"));
}

#[tokio::test]
async fn test_authenticate_wrong_password_invalid_credentials() {
    let stub = StubRequester::default().reply(
        Method::Post,
        LOGIN,
        http(401, json!({ "message": "Invalid username or password." })),
    );
    let machine = SessionStateMachine::new(stub);

    let result = machine.authenticate("jack", "nope").await;

    assert_eq!(result, Err(AuthError::InvalidCredentials));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_authenticate_short_username_invalid_username() {
    let stub = StubRequester::default().reply(Method::Post, LOGIN, validation("username", "invalid"));
    let machine = SessionStateMachine::new(stub);

    let result = machine.authenticate("a", "aaaa").await;

    assert_eq!(result, Err(AuthError::InvalidUsername));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_authenticate_network_failure_surfaces() {
    let stub = StubRequester::default().reply(
        Method::Post,
        LOGIN,
        Err(RequestError::Network("connection reset".into())),
    );
    let machine = SessionStateMachine::new(stub);

    let result = machine.authenticate("jack", "pw").await;

    assert_eq!(result, Err(AuthError::NetworkFailure("connection reset".into())));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_authenticate_unexpected_body_is_unrecognized() {
    let stub = StubRequester::default().reply(Method::Post, LOGIN, Ok(json!({ "ok": true })));
    let machine = SessionStateMachine::new(stub);

    let result = machine.authenticate("jack", "pw").await;

    assert!(matches!(result, Err(AuthError::UnrecognizedResponse(_))));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

// =========================================================================
// Two-factor
// =========================================================================

#[tokio::test]
async fn test_two_factor_challenge_then_code_succeeds() {
    let stub = StubRequester::default()
        .reply(Method::Post, LOGIN, http(499, json!({ "error": "2FA required" })))
        .reply(Method::Post, LOGIN, Ok(user_json()));
    let machine = SessionStateMachine::new(stub.clone());

    let first = machine.authenticate("jack", "pw").await;
    assert_eq!(first, Err(AuthError::TwoFactorRequired));
    assert_eq!(
        machine.state(),
        SessionState::AwaitingTwoFactor { username: "jack".into() }
    );

    let user = machine
        .authenticate_with_code("jack", "pw", "011111")
        .await
        .expect("code should be accepted");
    assert_eq!(user.id, 12);
    assert!(machine.state().is_authenticated());

    let (_, _, params) = stub.last_call().unwrap();
    assert_eq!(params["code"], "011111");
}

#[tokio::test]
async fn test_two_factor_wrong_code_invalid_credentials() {
    let stub = StubRequester::default()
        .reply(Method::Post, LOGIN, http(499, Value::Null))
        .reply(Method::Post, LOGIN, http(499, Value::Null));
    let machine = SessionStateMachine::new(stub);

    let _ = machine.authenticate("jack", "pw").await;
    let result = machine.authenticate_with_code("jack", "pw", "111111").await;

    assert_eq!(result, Err(AuthError::InvalidCredentials));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_fresh_login_with_rejected_code_invalid_credentials() {
    let stub = StubRequester::default().reply(Method::Post, LOGIN, http(401, Value::Null));
    let machine = SessionStateMachine::new(stub);

    let result = machine.authenticate_with_code("jack", "pw", "111111").await;

    assert_eq!(result, Err(AuthError::InvalidCredentials));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

// =========================================================================
// register_account()
// =========================================================================

#[tokio::test]
async fn test_register_validation_errors_map_one_to_one() {
    let cases = [
        (validation("username", "invalid"), AuthError::InvalidUsername),
        (validation("username", "unique"), AuthError::TakenUsername),
        (validation("password", "weak"), AuthError::WeakPassword),
        (validation("email", "invalid"), AuthError::InvalidEmail),
        (validation("email", "unique"), AuthError::TakenEmail),
    ];

    for (reply, expected) in cases {
        let stub = StubRequester::default().reply(Method::Post, REGISTER, reply);
        let machine = SessionStateMachine::new(stub.clone());

        let result = machine.register_account("beamtest", "password1", "a@b.co").await;

        assert_eq!(result, Err(expected));
        assert_eq!(machine.state(), SessionState::LoggedOut);
        assert_eq!(stub.call_count(), 1, "registration always round-trips");
    }
}

#[tokio::test]
async fn test_register_sends_all_fields_without_local_checks() {
    let stub = StubRequester::default().reply(Method::Post, REGISTER, validation("username", "invalid"));
    let machine = SessionStateMachine::new(stub.clone());

    let _ = machine.register_account("a", "aaaa", "aaaa").await;

    let (method, path, params) = stub.last_call().unwrap();
    assert_eq!((method, path.as_str()), (Method::Post, REGISTER));
    assert_eq!(params["username"], "a");
    assert_eq!(params["password"], "aaaa");
    assert_eq!(params["email"], "aaaa");
}

#[tokio::test]
async fn test_register_success_signs_in() {
    let store = SharedStore::default();
    let stub = StubRequester::default()
        .issuing("tok-new")
        .reply(Method::Post, REGISTER, Ok(user_json()));
    let machine = machine_with_store(&stub, &store);

    let user = machine
        .register_account("jack", "hunter22", "jack@example.com")
        .await
        .unwrap();

    assert_eq!(machine.user(), Some(user));
    assert_eq!(store.load().unwrap().map(|s| s.token).as_deref(), Some("tok-new"));
}

#[tokio::test]
async fn test_register_failure_keeps_existing_session() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let stub = stub.reply(Method::Post, REGISTER, validation("email", "unique"));

    let result = machine.register_account("other", "password1", "jack@example.com").await;

    assert_eq!(result, Err(AuthError::TakenEmail));
    assert!(machine.state().is_authenticated());
    assert_eq!(stub.call_count(), 2);
}

// =========================================================================
// logout()
// =========================================================================

#[tokio::test]
async fn test_logout_when_logged_out_makes_no_request() {
    let stub = StubRequester::default();
    let machine = SessionStateMachine::new(stub.clone());

    let result = machine.logout().await;

    assert_eq!(result, Err(AuthError::NotAuthenticated));
    assert_eq!(stub.call_count(), 0);
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_logout_clears_token_and_store() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let stub = stub.reply(Method::Delete, CURRENT, Ok(Value::Null));

    machine.logout().await.expect("logout should succeed");

    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(stub.session_token(), None);
    assert_eq!(store.load().unwrap(), None);
    let (method, path, _) = stub.last_call().unwrap();
    assert_eq!((method, path.as_str()), (Method::Delete, CURRENT));
}

#[tokio::test]
async fn test_logout_session_already_gone_still_signs_out() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let _stub = stub.reply(Method::Delete, CURRENT, http(401, Value::Null));

    assert_eq!(machine.logout().await, Ok(()));
    assert_eq!(machine.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_logout_server_error_keeps_session() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let stub = stub.reply(Method::Delete, CURRENT, http(503, Value::Null));

    let result = machine.logout().await;

    assert!(matches!(result, Err(AuthError::UnrecognizedResponse(_))));
    assert!(machine.state().is_authenticated());
    assert_eq!(stub.session_token().as_deref(), Some("tok-1"));
}

// =========================================================================
// refresh_previous_session()
// =========================================================================

#[tokio::test]
async fn test_refresh_without_stored_session_not_authenticated() {
    let stub = StubRequester::default();
    let machine = SessionStateMachine::new(stub.clone());

    let result = machine.refresh_previous_session().await;

    assert_eq!(result, Err(AuthError::NotAuthenticated));
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(stub.call_count(), 0);
}

#[tokio::test]
async fn test_refresh_with_stored_token_resumes() {
    let stub = StubRequester::default().reply(Method::Get, CURRENT, Ok(user_json()));
    let machine = SessionStateMachine::with_store(
        stub.clone(),
        MemoryCredentialStore::with_token("saved"),
        SessionConfig::default(),
    );

    let user = machine.refresh_previous_session().await.unwrap();

    assert_eq!(user.username, "jack");
    assert!(machine.state().is_authenticated());
    assert_eq!(stub.session_token().as_deref(), Some("saved"));
}

#[tokio::test]
async fn test_refresh_rejected_token_clears_store() {
    let store = SharedStore::default();
    store.save(&StoredSession { token: "expired".into() }).unwrap();
    let stub = StubRequester::default().reply(Method::Get, CURRENT, http(401, Value::Null));
    let machine = machine_with_store(&stub, &store);

    let result = machine.refresh_previous_session().await;

    assert_eq!(result, Err(AuthError::NotAuthenticated));
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(store.load().unwrap(), None);
    assert_eq!(stub.session_token(), None);
}

#[tokio::test]
async fn test_refresh_network_failure_keeps_existing_session() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let stub = stub.reply(
        Method::Get,
        CURRENT,
        Err(RequestError::Network("connection reset".into())),
    );

    let result = machine.refresh_previous_session().await;

    assert!(matches!(result, Err(AuthError::NetworkFailure(_))));
    assert_eq!(machine.user().map(|u| u.id), Some(12));
    assert_eq!(stub.session_token().as_deref(), Some("tok-1"));
    assert_eq!(
        store.load().unwrap(),
        Some(StoredSession { token: "tok-1".into() })
    );
}

#[tokio::test]
async fn test_refresh_unexpected_body_keeps_logged_out_without_token() {
    let stub = StubRequester::default().reply(Method::Get, CURRENT, Ok(json!({ "ok": true })));
    let machine = SessionStateMachine::with_store(
        stub.clone(),
        MemoryCredentialStore::with_token("saved"),
        SessionConfig::default(),
    );

    let result = machine.refresh_previous_session().await;

    assert!(matches!(result, Err(AuthError::UnrecognizedResponse(_))));
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(stub.session_token(), None);
}

// =========================================================================
// Single flight, cancellation, stale replies
// =========================================================================

#[tokio::test]
async fn test_second_authenticate_while_pending_operation_in_progress() {
    let gate = Arc::new(Gate::default());
    let stub = StubRequester::default()
        .with_gate(Arc::clone(&gate))
        .reply(Method::Post, LOGIN, Ok(user_json()));
    let machine = Arc::new(SessionStateMachine::new(stub.clone()));

    let first = tokio::spawn({
        let machine = Arc::clone(&machine);
        async move { machine.authenticate("jack", "pw").await }
    });
    gate.started.notified().await;

    assert_eq!(machine.state(), SessionState::Authenticating);
    assert_eq!(machine.in_flight(), Some(Operation::Authenticate));
    assert_eq!(
        machine.authenticate("jack", "pw").await,
        Err(AuthError::OperationInProgress)
    );
    assert_eq!(machine.logout().await, Err(AuthError::OperationInProgress));
    assert_eq!(
        machine.refresh_previous_session().await,
        Err(AuthError::OperationInProgress)
    );
    assert_eq!(stub.call_count(), 1, "rejected calls never reach the network");

    gate.release.notify_one();
    let user = first.await.unwrap().expect("first login should finish");
    assert_eq!(user.id, 12);
    assert_eq!(machine.in_flight(), None);
}

#[tokio::test]
async fn test_cancelled_authenticate_releases_slot_and_state() {
    let gate = Arc::new(Gate::default());
    let stub = StubRequester::default()
        .with_gate(gate)
        .reply(Method::Post, LOGIN, Ok(user_json()));
    let machine = SessionStateMachine::new(stub);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        machine.authenticate("jack", "pw"),
    )
    .await;

    assert!(timed_out.is_err(), "gate is never released");
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(machine.in_flight(), None);
}

#[tokio::test]
async fn test_cancelled_refresh_uninstalls_stored_token() {
    let gate = Arc::new(Gate::default());
    let stub = StubRequester::default()
        .with_gate(gate)
        .reply(Method::Get, CURRENT, Ok(user_json()));
    let machine = SessionStateMachine::with_store(
        stub.clone(),
        MemoryCredentialStore::with_token("saved"),
        SessionConfig::default(),
    );

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        machine.refresh_previous_session(),
    )
    .await;

    assert!(timed_out.is_err(), "gate is never released");
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(machine.in_flight(), None);
    assert_eq!(stub.session_token(), None);
}

#[tokio::test]
async fn test_force_sign_out_discards_stale_login_reply() {
    let gate = Arc::new(Gate::default());
    let stub = StubRequester::default()
        .with_gate(Arc::clone(&gate))
        .issuing("late-token")
        .reply(Method::Post, LOGIN, Ok(user_json()));
    let machine = Arc::new(SessionStateMachine::new(stub.clone()));

    let pending = tokio::spawn({
        let machine = Arc::clone(&machine);
        async move { machine.authenticate("jack", "pw").await }
    });
    gate.started.notified().await;

    machine.force_sign_out();
    gate.release.notify_one();

    assert_eq!(pending.await.unwrap(), Err(AuthError::NotAuthenticated));
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(machine.in_flight(), None);
    assert_eq!(stub.session_token(), None, "late reply must not leave a token behind");
}

#[tokio::test]
async fn test_force_sign_out_discards_stale_register_reply() {
    let gate = Arc::new(Gate::default());
    let stub = StubRequester::default()
        .with_gate(Arc::clone(&gate))
        .issuing("late-token")
        .reply(Method::Post, REGISTER, Ok(user_json()));
    let machine = Arc::new(SessionStateMachine::new(stub.clone()));

    let pending = tokio::spawn({
        let machine = Arc::clone(&machine);
        async move { machine.register_account("jack", "pw", "jack@example.com").await }
    });
    gate.started.notified().await;

    machine.force_sign_out();
    gate.release.notify_one();

    assert_eq!(pending.await.unwrap(), Err(AuthError::NotAuthenticated));
    assert_eq!(machine.state(), SessionState::LoggedOut);
    assert_eq!(stub.session_token(), None);
}

#[tokio::test]
async fn test_machine_cycles_login_logout_login() {
    let store = SharedStore::default();
    let (stub, machine) = signed_in(StubRequester::default(), &store).await;
    let _stub = stub
        .reply(Method::Delete, CURRENT, Ok(Value::Null))
        .reply(Method::Post, LOGIN, Ok(user_json()));

    machine.logout().await.unwrap();
    assert_eq!(machine.state(), SessionState::LoggedOut);

    machine.authenticate("jack", "hunter22").await.unwrap();
    assert!(machine.state().is_authenticated());
}
