//! Common test utilities for alchemy console integration tests.
//!
//! Provides `MockBackend`, an in-process axum server that speaks the console
//! backend's REST conventions and its `/events` push stream. Tests script the
//! list responses, hold list requests in flight with per-resource gates, and
//! push messages down the open event stream.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alchemy_console::models::{Role, UserProfile};
use alchemy_console::session::Session;
use alchemy_console::sync::{ConnectionState, EventChannel, ReconnectPolicy, SyncHub};
use alchemy_console::ApiClient;
use assert_cmd::Command;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

/// Resource collection names served by the mock.
pub const RESOURCES: [&str; 5] = [
    "alchemists",
    "missions",
    "materials",
    "transmutations",
    "audits",
];

/// Build an unsigned JWT whose claims carry `email` and `role`.
pub fn make_token(email: &str, role: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        json!({"id": 7, "email": email, "role": role, "name": "Tester"})
            .to_string()
            .as_bytes(),
    );
    format!("{}.{}.sig", header, claims)
}

pub fn profile(email: &str, role: Role) -> UserProfile {
    UserProfile {
        id: Some(7),
        name: "Tester".to_string(),
        email: email.to_string(),
        role,
        specialty: None,
    }
}

#[derive(Clone)]
struct Scripted {
    status: u16,
    body: Option<String>,
}

#[derive(Default)]
struct Counter {
    calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared state behind the mock's handlers.
#[derive(Default)]
pub struct MockState {
    responses: Mutex<HashMap<String, Scripted>>,
    counters: Mutex<HashMap<String, Counter>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    event_tokens: Mutex<Vec<String>>,
    reject_events: AtomicBool,
    end_events_at_once: AtomicBool,
    users: Mutex<HashMap<String, (String, String)>>,
    status_patches: Mutex<Vec<(u64, Value)>>,
}

impl MockState {
    fn respond(&self, key: &str) -> Response {
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or(Scripted {
                status: 200,
                body: Some(r#"{"data":[]}"#.to_string()),
            });
        let status = StatusCode::from_u16(scripted.status).unwrap();
        match scripted.body {
            Some(body) => (status, [(CONTENT_TYPE, "application/json")], body).into_response(),
            None => status.into_response(),
        }
    }
}

async fn list(state: Arc<MockState>, name: &'static str) -> Response {
    {
        let mut counters = state.counters.lock().unwrap();
        let counter = counters.entry(name.to_string()).or_default();
        counter.calls += 1;
        counter.in_flight += 1;
        counter.max_in_flight = counter.max_in_flight.max(counter.in_flight);
    }

    let gate = state.gates.lock().unwrap().get(name).cloned();
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }

    let response = state.respond(name);
    state
        .counters
        .lock()
        .unwrap()
        .entry(name.to_string())
        .or_default()
        .in_flight -= 1;
    response
}

async fn events(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state
        .event_tokens
        .lock()
        .unwrap()
        .push(query.get("token").cloned().unwrap_or_default());
    if state.reject_events.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    if state.end_events_at_once.load(Ordering::SeqCst) {
        let empty = futures::stream::empty::<Result<Event, Infallible>>();
        return Sse::new(empty).into_response();
    }

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    *state.events_tx.lock().unwrap() = Some(tx);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<Event, Infallible>(event), rx))
    });
    Sse::new(stream).into_response()
}

async fn mission_status(
    State(state): State<Arc<MockState>>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Response {
    state.status_patches.lock().unwrap().push((id, body.clone()));
    (StatusCode::OK, Json(json!({"data": {"id": id, "status": body["status"]}}))).into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default();
    let users = state.users.lock().unwrap();
    match users.get(&email) {
        Some((expected, role)) if expected == password => (
            StatusCode::OK,
            Json(json!({
                "token": make_token(&email, role),
                "id": 7,
                "name": "Tester",
                "email": email,
                "role": role,
                "specialty": "alkahestry",
            })),
        )
            .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "invalid credentials"})),
        )
            .into_response(),
    }
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    let role = body["role"].as_str().unwrap_or("alchemist").to_string();
    let mut users = state.users.lock().unwrap();
    if users.contains_key(&email) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "email already registered"})),
        )
            .into_response();
    }
    users.insert(email.clone(), (password, role.clone()));
    (
        StatusCode::CREATED,
        Json(json!({"data": {"email": email, "role": role}})),
    )
        .into_response()
}

/// An in-process console backend.
pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind to an ephemeral port and start serving.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(
                "/alchemists",
                get(|State(s): State<Arc<MockState>>| list(s, "alchemists")),
            )
            .route(
                "/missions",
                get(|State(s): State<Arc<MockState>>| list(s, "missions")),
            )
            .route(
                "/materials",
                get(|State(s): State<Arc<MockState>>| list(s, "materials")),
            )
            .route(
                "/transmutations",
                get(|State(s): State<Arc<MockState>>| list(s, "transmutations")),
            )
            .route(
                "/audits",
                get(|State(s): State<Arc<MockState>>| list(s, "audits")),
            )
            .route("/missions/:id/status", patch(mission_status))
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/events", get(events))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server,
        }
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(&self.base_url, Duration::from_secs(5)).unwrap()
    }

    pub fn hub(&self, session: &Session) -> SyncHub {
        self.hub_with_policy(session, ReconnectPolicy::disabled())
    }

    pub fn hub_with_policy(&self, session: &Session, policy: ReconnectPolicy) -> SyncHub {
        SyncHub::new(self.api(), session.clone(), policy).unwrap()
    }

    pub fn channel(&self, session: &Session, policy: ReconnectPolicy) -> EventChannel {
        EventChannel::new(&self.base_url, session.clone(), policy).unwrap()
    }

    /// Script the raw JSON body returned for a resource (or any path key).
    pub fn set_body(&self, key: &str, status: u16, body: &str) {
        self.state.responses.lock().unwrap().insert(
            key.to_string(),
            Scripted {
                status,
                body: Some(body.to_string()),
            },
        );
    }

    /// Script a `{"data": items}` response for a resource.
    pub fn set_items(&self, resource: &str, items: Value) {
        self.set_body(resource, 200, &json!({ "data": items }).to_string());
    }

    /// Script a bodyless response.
    pub fn set_empty(&self, resource: &str, status: u16) {
        self.state.responses.lock().unwrap().insert(
            resource.to_string(),
            Scripted { status, body: None },
        );
    }

    /// Number of list requests received for `resource`.
    pub fn calls(&self, resource: &str) -> usize {
        self.state
            .counters
            .lock()
            .unwrap()
            .get(resource)
            .map_or(0, |c| c.calls)
    }

    /// Highest number of simultaneous list requests seen for `resource`.
    pub fn max_in_flight(&self, resource: &str) -> usize {
        self.state
            .counters
            .lock()
            .unwrap()
            .get(resource)
            .map_or(0, |c| c.max_in_flight)
    }

    pub fn total_calls(&self) -> usize {
        RESOURCES.iter().map(|r| self.calls(r)).sum()
    }

    /// Hold every list request for `resource` until released.
    pub fn gate(&self, resource: &str) {
        self.state
            .gates
            .lock()
            .unwrap()
            .insert(resource.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held requests for `resource` through.
    pub fn release(&self, resource: &str, n: usize) {
        if let Some(gate) = self.state.gates.lock().unwrap().get(resource) {
            gate.add_permits(n);
        }
    }

    /// Remove the gate and let every held request through.
    pub fn open(&self, resource: &str) {
        if let Some(gate) = self.state.gates.lock().unwrap().remove(resource) {
            gate.close();
        }
    }

    pub fn add_user(&self, email: &str, password: &str, role: &str) {
        self.state
            .users
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), role.to_string()));
    }

    pub fn reject_events(&self, reject: bool) {
        self.state.reject_events.store(reject, Ordering::SeqCst);
    }

    /// Accept every `/events` request, then end the stream immediately.
    pub fn end_events_at_once(&self, end: bool) {
        self.state.end_events_at_once.store(end, Ordering::SeqCst);
    }

    /// Tokens presented on `/events`, in connection order.
    pub fn event_tokens(&self) -> Vec<String> {
        self.state.event_tokens.lock().unwrap().clone()
    }

    pub fn status_patches(&self) -> Vec<(u64, Value)> {
        self.state.status_patches.lock().unwrap().clone()
    }

    /// Send one raw data frame down the open stream.
    pub fn push_raw(&self, data: &str) {
        let tx = self.state.events_tx.lock().unwrap();
        tx.as_ref()
            .expect("no open event stream")
            .send(Event::default().data(data))
            .expect("event stream receiver dropped");
    }

    /// Send a `{"type": ..., "payload": ...}` message.
    pub fn push(&self, kind: &str, payload: Value) {
        self.push_raw(&json!({ "type": kind, "payload": payload }).to_string());
    }

    /// Send a keep-alive comment.
    pub fn ping(&self) {
        let tx = self.state.events_tx.lock().unwrap();
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(Event::default().comment("ping"));
        }
    }

    /// Close the open stream from the server side.
    pub fn close_events(&self) {
        self.state.events_tx.lock().unwrap().take();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the channel to reach `target`.
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, target: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while *rx.borrow_and_update() != target {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("channel never reached {}", target));
}

/// Wait until a store's revision moves past `seen`.
pub async fn wait_for_revision(rx: &mut watch::Receiver<u64>, seen: u64) -> u64 {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = *rx.borrow_and_update();
            if current > seen {
                return current;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("store revision never advanced")
}

/// Give spawned tasks a chance to issue requests that should not happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// Get a Command for the alc binary, isolated from the user's config.
pub fn alc(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_alc"));
    cmd.env("ALC_CONFIG", config_dir.join("config.kdl"));
    cmd.env_remove("ALC_API_URL");
    cmd.env_remove("ALC_TOKEN");
    cmd.env_remove("ALC_LOG");
    cmd
}
