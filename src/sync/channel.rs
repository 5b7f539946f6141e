//! Event channel client: one server-push stream per session token.
//!
//! `GET /events?token=<bearer>` answers with a `text/event-stream` body. Each
//! frame's data is decoded into a [`PushEvent`] and handed to every registered
//! handler, in arrival order, on the channel's own task.
//!
//! A malformed message is logged and skipped. A transport error, or the server
//! closing the stream, ends the connection; whether it is reopened depends on
//! the [`ReconnectPolicy`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::connection::{ConnectionState, ReconnectPolicy};
use super::events::PushEvent;
use super::sse::SseDecoder;
use crate::api::RequestError;
use crate::session::Session;

/// Time allowed to establish the TCP/TLS connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// How long a stream must stay open before its end resets the retry count.
const STABLE_CONNECTION: Duration = Duration::from_secs(30);

/// Callback invoked once per decoded message.
pub type MessageHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Why one stream attempt ended.
#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error("could not open event stream: {0}")]
    Open(String),

    #[error("event stream broke: {0}")]
    Transport(String),
}

#[derive(Default)]
struct ConnSlot {
    /// Bumped on every connect/disconnect; a task only acts while its id is current
    id: u64,
    token: Option<String>,
    task: Option<JoinHandle<()>>,
}

struct ChannelInner {
    client: Client,
    events_url: String,
    session: Session,
    policy: ReconnectPolicy,
    handlers: Mutex<Vec<MessageHandler>>,
    conn: Mutex<ConnSlot>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ChannelInner {
    fn conn(&self) -> MutexGuard<'_, ConnSlot> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: u64) -> bool {
        self.conn().id == id
    }

    fn set_state(&self, id: u64, state: ConnectionState) {
        let conn = self.conn();
        if conn.id == id {
            self.state_tx.send_replace(state);
        }
    }

    /// Mark the connection `id` finished, if it is still the current one.
    fn finish(&self, id: u64) {
        let mut conn = self.conn();
        if conn.id == id {
            conn.task = None;
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }

    fn deliver(&self, id: u64, data: &str) {
        if !self.is_current(id) {
            return;
        }

        let event = match PushEvent::decode(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed push message");
                return;
            }
        };
        tracing::debug!(kind = %event.kind, "push message received");

        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(kind = %event.kind, "push message handler panicked");
            }
        }
    }

    /// Run one stream until it ends. `connected_at` is set once the server
    /// accepts the stream.
    async fn stream_once(
        &self,
        id: u64,
        token: &str,
        connected_at: &mut Option<Instant>,
    ) -> Result<(), StreamError> {
        let response = self
            .client
            .get(&self.events_url)
            .query(&[("token", token)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Open(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StreamError::Open(format!("status {}: {}", status, text.trim())));
        }

        *connected_at = Some(Instant::now());
        self.set_state(id, ConnectionState::Connected);
        tracing::info!("event channel connected");

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
            for frame in decoder.feed(&chunk) {
                self.deliver(id, &frame.data);
            }
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, id: u64, token: String) {
        let mut attempt = 0;
        loop {
            let mut connected_at = None;
            match self.stream_once(id, &token, &mut connected_at).await {
                Ok(()) => tracing::info!("event channel closed by server"),
                Err(e @ StreamError::Transport(_)) => {
                    tracing::warn!(error = %e, "event channel transport error")
                }
                Err(e) => tracing::warn!(error = %e, "event channel error"),
            }

            // Only a stream that stayed up earns a fresh retry budget
            if connected_at.is_some_and(|at| at.elapsed() >= STABLE_CONNECTION) {
                attempt = 0;
            }
            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                break;
            };
            if self.session.token().as_deref() != Some(token.as_str()) || !self.is_current(id) {
                break;
            }

            self.set_state(id, ConnectionState::Reconnecting { attempt });
            tracing::info!(attempt, ?delay, "event channel reconnecting");
            tokio::time::sleep(delay).await;

            // Logout or a token change during the backoff wins
            if self.session.token().as_deref() != Some(token.as_str()) || !self.is_current(id) {
                break;
            }
            self.set_state(id, ConnectionState::Connecting);
        }

        self.finish(id);
    }
}

/// Client side of the push channel.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    /// Create a channel for the backend at `base_url`.
    pub fn new(
        base_url: &str,
        session: Session,
        policy: ReconnectPolicy,
    ) -> Result<Self, RequestError> {
        // No overall timeout: the stream is meant to stay open
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RequestError::Transport {
                path: "/events".to_string(),
                message: e.to_string(),
            })?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(ChannelInner {
                client,
                events_url: format!("{}/events", base_url.trim_end_matches('/')),
                session,
                policy,
                handlers: Mutex::new(Vec::new()),
                conn: Mutex::new(ConnSlot::default()),
                state_tx,
            }),
        })
    }

    /// Register a handler for every future message.
    pub fn on_message(&self, handler: impl Fn(&PushEvent) + Send + Sync + 'static) {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Open the stream for `token`, closing any connection already open.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, token: &str) {
        let mut conn = self.inner.conn();
        if let Some(task) = conn.task.take() {
            tracing::debug!("closing previous event channel connection");
            task.abort();
        }
        conn.id += 1;
        conn.token = Some(token.to_string());
        self.inner
            .state_tx
            .send_replace(ConnectionState::Connecting);

        let id = conn.id;
        let inner = self.inner.clone();
        let token = token.to_string();
        conn.task = Some(tokio::spawn(inner.run(id, token)));
    }

    /// Close the stream. Safe to call at any time, including after logout.
    pub fn disconnect(&self) {
        let mut conn = self.inner.conn();
        conn.id += 1;
        conn.token = None;
        if let Some(task) = conn.task.take() {
            task.abort();
            tracing::info!("event channel disconnected");
        }
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether a connection for `token` is open or being opened.
    pub fn is_open_for(&self, token: &str) -> bool {
        let conn = self.inner.conn();
        conn.token.as_deref() == Some(token) && self.state().is_active()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("url", &self.inner.events_url)
            .field("state", &self.state())
            .finish()
    }
}
