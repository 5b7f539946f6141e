//! Resource stores: one coalescing cache per logical resource.
//!
//! A store holds the last fetched collection and enforces at most one
//! in-flight reload per (session epoch, mount generation). Extra reload
//! requests while one is running are coalesced into it. A successful reload
//! replaces the cache wholesale; a failed one leaves it untouched.
//!
//! A fetch that completes after the session ended, or after the store was
//! detached from its last view, is discarded instead of applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::api::{ApiClient, RequestError};
use crate::models::{Resource, ResourceKind};
use crate::session::Session;

/// Why a reload did not touch the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nobody is logged in
    NoSession,
    /// The current role may not read this resource
    NotAuthorized,
}

/// Result of one reload request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// The cache was replaced with `count` fetched items
    Applied { count: usize },
    /// A reload was already in flight; this request joined it
    Coalesced,
    /// No request was made
    Skipped(SkipReason),
    /// The fetch finished after its session or mount ended; result dropped
    Discarded,
    /// The fetch failed; cached items are unchanged
    Failed(RequestError),
}

impl ReloadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReloadOutcome::Applied { .. })
    }
}

/// Identity of one reload: which session and which mount it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlightKey {
    epoch: u64,
    generation: u64,
}

struct StoreState<T> {
    items: Arc<Vec<T>>,
    in_flight: Option<FlightKey>,
    generation: u64,
    revision: u64,
    loaded: bool,
    last_error: Option<RequestError>,
}

struct StoreInner<T> {
    api: ApiClient,
    session: Session,
    state: Mutex<StoreState<T>>,
    revision_tx: watch::Sender<u64>,
}

/// Cache for one resource type.
pub struct ResourceStore<T: Resource> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Resource> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Resource> ResourceStore<T> {
    pub fn new(api: ApiClient, session: Session) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                api,
                session,
                state: Mutex::new(StoreState {
                    items: Arc::new(Vec::new()),
                    in_flight: None,
                    generation: 0,
                    revision: 0,
                    loaded: false,
                    last_error: None,
                }),
                revision_tx,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> ResourceKind {
        T::KIND
    }

    /// Snapshot of the cached collection.
    pub fn items(&self) -> Arc<Vec<T>> {
        self.state().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether at least one reload has been applied since the last reset.
    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    pub fn is_in_flight(&self) -> bool {
        self.state().in_flight.is_some()
    }

    /// Error from the most recent failed reload, cleared on success.
    pub fn last_error(&self) -> Option<RequestError> {
        self.state().last_error.clone()
    }

    /// Watch cache replacements; the value is a revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    /// Reload the collection from the list endpoint.
    pub async fn reload(&self) -> ReloadOutcome {
        match self.begin_reload() {
            Ok(ticket) => ticket.run().await,
            Err(outcome) => outcome,
        }
    }

    /// Claim the in-flight slot without awaiting anything.
    ///
    /// Returns the ticket to run, or the outcome for a request that does not
    /// reach the network.
    pub fn begin_reload(&self) -> Result<ReloadTicket<T>, ReloadOutcome> {
        let Some(snapshot) = self.inner.session.snapshot() else {
            tracing::debug!(resource = %T::KIND, "reload skipped: no session");
            return Err(ReloadOutcome::Skipped(SkipReason::NoSession));
        };
        if !T::KIND.is_visible_to(snapshot.role()) {
            tracing::debug!(resource = %T::KIND, role = %snapshot.role(), "reload skipped: role");
            return Err(ReloadOutcome::Skipped(SkipReason::NotAuthorized));
        }

        let mut state = self.state();
        let key = FlightKey {
            epoch: snapshot.epoch,
            generation: state.generation,
        };
        if state.in_flight == Some(key) {
            tracing::debug!(resource = %T::KIND, "reload coalesced");
            return Err(ReloadOutcome::Coalesced);
        }
        state.in_flight = Some(key);
        drop(state);

        Ok(ReloadTicket {
            store: self.clone(),
            token: snapshot.token,
            key,
            finished: false,
        })
    }

    /// Forget the cache and invalidate any in-flight reload.
    ///
    /// Used when the last interested view unmounts and on logout.
    pub fn detach(&self) {
        let revision = {
            let mut state = self.state();
            state.generation += 1;
            state.in_flight = None;
            state.items = Arc::new(Vec::new());
            state.loaded = false;
            state.last_error = None;
            state.revision += 1;
            state.revision
        };
        self.inner.revision_tx.send_replace(revision);
    }

    fn complete(&self, key: FlightKey, result: Result<Vec<T>, RequestError>) -> ReloadOutcome {
        let mut state = self.state();
        if state.in_flight == Some(key) {
            state.in_flight = None;
        }

        if state.generation != key.generation || !self.inner.session.is_current(key.epoch) {
            tracing::debug!(resource = %T::KIND, "reload result discarded: stale");
            return ReloadOutcome::Discarded;
        }

        match result {
            Ok(items) => {
                let count = items.len();
                state.items = Arc::new(items);
                state.loaded = true;
                state.last_error = None;
                state.revision += 1;
                let revision = state.revision;
                drop(state);

                tracing::debug!(resource = %T::KIND, count, "reload applied");
                self.inner.revision_tx.send_replace(revision);
                ReloadOutcome::Applied { count }
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                drop(state);

                tracing::warn!(resource = %T::KIND, error = %err, "reload failed; keeping cached items");
                ReloadOutcome::Failed(err)
            }
        }
    }

    fn release(&self, key: FlightKey) {
        let mut state = self.state();
        if state.in_flight == Some(key) {
            state.in_flight = None;
        }
    }
}

/// A claimed reload slot.
///
/// Dropping an unfinished ticket frees the slot, so a cancelled reload never
/// blocks later ones.
pub struct ReloadTicket<T: Resource> {
    store: ResourceStore<T>,
    token: String,
    key: FlightKey,
    finished: bool,
}

impl<T: Resource> ReloadTicket<T> {
    /// Fetch and apply.
    pub async fn run(mut self) -> ReloadOutcome {
        let result = self.store.inner.api.list::<T>(&self.token).await;
        self.finished = true;
        self.store.complete(self.key, result)
    }
}

impl<T: Resource> Drop for ReloadTicket<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.release(self.key);
        }
    }
}

/// Type-erased store operations used by the hub for routing.
pub trait Reloadable: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Claim the slot synchronously; the returned future performs the fetch.
    fn begin(&self) -> Result<BoxFuture<'static, ReloadOutcome>, ReloadOutcome>;

    fn detach(&self);

    fn len(&self) -> usize;

    fn is_loaded(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<u64>;
}

impl<T: Resource> Reloadable for ResourceStore<T> {
    fn kind(&self) -> ResourceKind {
        T::KIND
    }

    fn begin(&self) -> Result<BoxFuture<'static, ReloadOutcome>, ReloadOutcome> {
        let ticket = self.begin_reload()?;
        Ok(Box::pin(ticket.run()))
    }

    fn detach(&self) {
        ResourceStore::detach(self)
    }

    fn len(&self) -> usize {
        ResourceStore::len(self)
    }

    fn is_loaded(&self) -> bool {
        ResourceStore::is_loaded(self)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        ResourceStore::subscribe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEntry, Mission, Role, UserProfile};
    use std::time::Duration;

    // Nothing listens on this port; only paths that never hit the network are tested here.
    fn api() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap()
    }

    fn login(session: &Session, role: Role) {
        session.login(
            "token",
            UserProfile {
                id: Some(1),
                name: "Ed".to_string(),
                email: "ed@amestris.gov".to_string(),
                role,
                specialty: None,
            },
        );
    }

    #[test]
    fn test_no_session_skips() {
        let store: ResourceStore<Mission> = ResourceStore::new(api(), Session::new());
        assert!(matches!(
            store.begin_reload(),
            Err(ReloadOutcome::Skipped(SkipReason::NoSession))
        ));
        assert!(!store.is_in_flight());
    }

    #[test]
    fn test_role_gate_skips_without_claiming() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<AuditEntry> = ResourceStore::new(api(), session);
        assert!(matches!(
            store.begin_reload(),
            Err(ReloadOutcome::Skipped(SkipReason::NotAuthorized))
        ));
        assert!(!store.is_in_flight());
    }

    #[test]
    fn test_second_begin_coalesces() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session);

        let ticket = store.begin_reload().ok().unwrap();
        assert!(store.is_in_flight());
        assert!(matches!(store.begin_reload(), Err(ReloadOutcome::Coalesced)));

        drop(ticket);
        assert!(!store.is_in_flight());
        assert!(store.begin_reload().is_ok());
    }

    #[test]
    fn test_detach_frees_slot_and_discards_result() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session);

        let stale = store.begin_reload().ok().unwrap();
        store.detach();
        assert!(!store.is_in_flight());

        let key = stale.key;
        let outcome = store.complete(key, Ok(vec![Mission::default()]));
        assert_eq!(outcome, ReloadOutcome::Discarded);
        assert!(store.is_empty());
    }

    #[test]
    fn test_complete_after_logout_discards() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session.clone());

        let ticket = store.begin_reload().ok().unwrap();
        session.logout();

        let outcome = store.complete(ticket.key, Ok(vec![Mission::default()]));
        assert_eq!(outcome, ReloadOutcome::Discarded);
        assert!(store.is_empty());
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_complete_replaces_wholesale() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session);
        let rx = store.subscribe();

        let first = store.begin_reload().ok().unwrap();
        let three = vec![Mission::default(), Mission::default(), Mission::default()];
        assert_eq!(
            store.complete(first.key, Ok(three)),
            ReloadOutcome::Applied { count: 3 }
        );

        let second = store.begin_reload().ok().unwrap();
        let one = vec![Mission {
            id: Some(8),
            ..Default::default()
        }];
        assert_eq!(
            store.complete(second.key, Ok(one)),
            ReloadOutcome::Applied { count: 1 }
        );
        assert_eq!(store.items()[0].id, Some(8));
        assert_eq!(store.len(), 1);
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn test_failure_keeps_items() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session);

        let first = store.begin_reload().ok().unwrap();
        store.complete(first.key, Ok(vec![Mission::default()]));

        let second = store.begin_reload().ok().unwrap();
        let err = RequestError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        let outcome = store.complete(second.key, Err(err.clone()));
        assert_eq!(outcome, ReloadOutcome::Failed(err.clone()));
        assert_eq!(store.len(), 1);
        assert!(!store.is_in_flight());
        assert_eq!(store.last_error(), Some(err));
    }

    #[tokio::test]
    async fn test_transport_failure_clears_in_flight() {
        let session = Session::new();
        login(&session, Role::Alchemist);
        let store: ResourceStore<Mission> = ResourceStore::new(api(), session);

        let outcome = store.reload().await;
        assert!(matches!(outcome, ReloadOutcome::Failed(ref e) if e.is_transport()));
        assert!(!store.is_in_flight());
    }
}
