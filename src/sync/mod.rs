//! Live state synchronization.
//!
//! [`SyncHub`] ties the pieces together: it owns one [`ResourceStore`] per
//! resource, one [`EventChannel`], and the set of mounted views. Push
//! messages are routed, in arrival order, to reloads of the stores that some
//! mounted view cares about and the current role may read.
//!
//! Lifecycle rules:
//! - the channel opens when the first view mounts under a session and closes
//!   when the last view unmounts or the session logs out
//! - a store is detached (cache cleared, in-flight result invalidated) when the
//!   last view interested in it unmounts
//! - a token change reopens the channel and reloads every interested store

pub mod channel;
pub mod connection;
pub mod events;
pub mod router;
pub mod sse;
pub mod store;

pub use channel::{EventChannel, MessageHandler};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use events::{EventDecodeError, EventKind, PushEvent};
pub use router::{ReloadSet, route, route_for_role};
pub use store::{ReloadOutcome, Reloadable, ResourceStore, SkipReason};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, RequestError};
use crate::models::{Alchemist, AuditEntry, Material, Mission, ResourceKind, Transmutation};
use crate::session::Session;
use crate::views::{DashboardSummary, ViewKind};
use crate::{Error, Result};

/// Capacity of the dispatch log broadcast.
const DISPATCH_CAPACITY: usize = 256;

/// The five resource stores.
pub struct Stores {
    pub alchemists: ResourceStore<Alchemist>,
    pub missions: ResourceStore<Mission>,
    pub materials: ResourceStore<Material>,
    pub transmutations: ResourceStore<Transmutation>,
    pub audits: ResourceStore<AuditEntry>,
}

impl Stores {
    pub fn new(api: &ApiClient, session: &Session) -> Self {
        Self {
            alchemists: ResourceStore::new(api.clone(), session.clone()),
            missions: ResourceStore::new(api.clone(), session.clone()),
            materials: ResourceStore::new(api.clone(), session.clone()),
            transmutations: ResourceStore::new(api.clone(), session.clone()),
            audits: ResourceStore::new(api.clone(), session.clone()),
        }
    }

    /// Type-erased store for `kind`.
    pub fn get(&self, kind: ResourceKind) -> &dyn Reloadable {
        match kind {
            ResourceKind::Alchemists => &self.alchemists,
            ResourceKind::Missions => &self.missions,
            ResourceKind::Materials => &self.materials,
            ResourceKind::Transmutations => &self.transmutations,
            ResourceKind::Audits => &self.audits,
        }
    }

    pub fn detach_all(&self) {
        for kind in ResourceKind::ALL {
            self.get(kind).detach();
        }
    }
}

/// One routed push message, as observed by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub kind: EventKind,
    /// Stores whose reload was requested, after role and interest filtering
    pub reloads: ReloadSet,
}

#[derive(Debug, Default)]
struct Interest {
    per_kind: BTreeMap<ResourceKind, usize>,
    views: usize,
}

impl Interest {
    fn wants(&self, kind: ResourceKind) -> bool {
        self.per_kind.get(&kind).copied().unwrap_or(0) > 0
    }

    fn interested_kinds(&self) -> Vec<ResourceKind> {
        self.per_kind
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, _)| *k)
            .collect()
    }
}

struct HubInner {
    session: Session,
    api: ApiClient,
    channel: EventChannel,
    stores: Stores,
    interest: Mutex<Interest>,
    dispatch_tx: broadcast::Sender<DispatchRecord>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl HubInner {
    fn interest(&self) -> MutexGuard<'_, Interest> {
        self.interest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one message and start the resulting reloads.
    ///
    /// Slots are claimed synchronously, so intents for one message are
    /// dispatched before the next message is looked at.
    fn dispatch(&self, event: &PushEvent) {
        let Some(role) = self.session.role() else {
            return;
        };

        let targets: ReloadSet = {
            let interest = self.interest();
            route_for_role(event, role)
                .into_iter()
                .filter(|kind| interest.wants(*kind))
                .collect()
        };

        for kind in &targets {
            match self.stores.get(*kind).begin() {
                Ok(fetch) => {
                    let kind = *kind;
                    tokio::spawn(async move {
                        let outcome = fetch.await;
                        tracing::debug!(resource = %kind, ?outcome, "event-driven reload finished");
                    });
                }
                Err(outcome) => {
                    tracing::debug!(resource = %kind, ?outcome, "event-driven reload not started");
                }
            }
        }

        let _ = self.dispatch_tx.send(DispatchRecord {
            kind: event.kind.clone(),
            reloads: targets,
        });
    }

    fn on_logout(&self) {
        self.channel.disconnect();
        self.stores.detach_all();
    }

    fn unmount(&self, view: ViewKind) {
        let (released, no_views) = {
            let mut interest = self.interest();
            let mut released = Vec::new();
            for kind in view.resources() {
                if let Some(n) = interest.per_kind.get_mut(kind) {
                    *n = n.saturating_sub(1);
                    if *n == 0 {
                        released.push(*kind);
                    }
                }
            }
            interest.views = interest.views.saturating_sub(1);
            (released, interest.views == 0)
        };

        for kind in released {
            self.stores.get(kind).detach();
        }
        if no_views {
            self.channel.disconnect();
        }
        tracing::debug!(%view, "view unmounted");
    }

    /// React to a login or token change while views are mounted.
    fn resync(&self) {
        let Some(snapshot) = self.session.snapshot() else {
            return;
        };
        let kinds = {
            let interest = self.interest();
            if interest.views == 0 {
                return;
            }
            interest.interested_kinds()
        };

        if !self.channel.is_open_for(&snapshot.token) {
            self.channel.connect(&snapshot.token);
        }
        for kind in kinds {
            let store = self.stores.get(kind);
            // Items from the previous session must not survive a token change
            store.detach();
            if let Ok(fetch) = store.begin() {
                tokio::spawn(fetch);
            }
        }
        tracing::info!(epoch = snapshot.epoch, "resynchronized after session change");
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        self.channel.disconnect();
        if let Some(task) = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Central dispatcher for the sync layer.
#[derive(Clone)]
pub struct SyncHub {
    inner: Arc<HubInner>,
}

impl SyncHub {
    /// Build the hub and wire it to the session and the event channel.
    pub fn new(
        api: ApiClient,
        session: Session,
        policy: ReconnectPolicy,
    ) -> std::result::Result<Self, RequestError> {
        let channel = EventChannel::new(api.base_url(), session.clone(), policy)?;
        let stores = Stores::new(&api, &session);
        let (dispatch_tx, _) = broadcast::channel(DISPATCH_CAPACITY);

        let inner = Arc::new(HubInner {
            session: session.clone(),
            api,
            channel: channel.clone(),
            stores,
            interest: Mutex::new(Interest::default()),
            dispatch_tx,
            watcher: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        channel.on_message(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        });

        let weak = Arc::downgrade(&inner);
        session.on_logout(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_logout();
            }
        });

        Ok(Self { inner })
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn channel(&self) -> &EventChannel {
        &self.inner.channel
    }

    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Mount a view: register interest, open the channel, run initial loads.
    ///
    /// Fails with [`Error::NotAuthenticated`] when nobody is logged in; in
    /// that case no channel is opened and nothing is fetched.
    pub async fn mount(&self, view: ViewKind) -> Result<ViewHandle> {
        let snapshot = self.inner.session.snapshot().ok_or(Error::NotAuthenticated)?;

        {
            let mut interest = self.inner.interest();
            for kind in view.resources() {
                *interest.per_kind.entry(*kind).or_insert(0) += 1;
            }
            interest.views += 1;
        }
        let mut handle = ViewHandle {
            hub: self.inner.clone(),
            view,
            initial: Vec::new(),
        };

        if !self.inner.channel.is_open_for(&snapshot.token) {
            self.inner.channel.connect(&snapshot.token);
        }
        self.ensure_watcher();
        tracing::debug!(%view, "view mounted");

        let mut pending = Vec::new();
        for kind in view.resources() {
            match self.inner.stores.get(*kind).begin() {
                Ok(fetch) => pending.push(async move { (*kind, fetch.await) }),
                Err(outcome) => handle.initial.push((*kind, outcome)),
            }
        }
        handle.initial.extend(join_all(pending).await);
        Ok(handle)
    }

    /// Manual refresh of one store.
    pub async fn refresh(&self, kind: ResourceKind) -> ReloadOutcome {
        match self.inner.stores.get(kind).begin() {
            Ok(fetch) => fetch.await,
            Err(outcome) => outcome,
        }
    }

    /// Route a message as if it had arrived on the channel.
    pub fn dispatch(&self, event: &PushEvent) {
        self.inner.dispatch(event);
    }

    /// Observe routed messages.
    pub fn subscribe_dispatch(&self) -> broadcast::Receiver<DispatchRecord> {
        self.inner.dispatch_tx.subscribe()
    }

    /// Number of mounted views.
    pub fn mounted_views(&self) -> usize {
        self.inner.interest().views
    }

    /// Dashboard read model over the current caches.
    pub fn dashboard(&self) -> Option<DashboardSummary> {
        let role = self.inner.session.role()?;
        let stores = &self.inner.stores;
        Some(DashboardSummary::build(
            role,
            &stores.alchemists.items(),
            &stores.missions.items(),
            &stores.materials.items(),
            &stores.transmutations.items(),
            &stores.audits.items(),
        ))
    }

    fn ensure_watcher(&self) {
        let mut watcher = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if watcher.is_some() {
            return;
        }

        let mut rx = self.inner.session.subscribe();
        rx.mark_unchanged();
        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        *watcher = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.resync();
            }
        }));
    }
}

impl std::fmt::Debug for SyncHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHub")
            .field("session", &self.inner.session)
            .field("channel", &self.inner.channel)
            .field("views", &self.inner.interest().views)
            .finish()
    }
}

/// A mounted view. Dropping it unmounts the view.
pub struct ViewHandle {
    hub: Arc<HubInner>,
    view: ViewKind,
    initial: Vec<(ResourceKind, ReloadOutcome)>,
}

impl ViewHandle {
    pub fn view(&self) -> ViewKind {
        self.view
    }

    /// Outcome of each initial load, in the view's resource order for
    /// loads that did not hit the network, then fetched ones.
    pub fn initial_outcomes(&self) -> &[(ResourceKind, ReloadOutcome)] {
        &self.initial
    }

    /// Outcome of the initial load of `kind`.
    pub fn initial_outcome(&self, kind: ResourceKind) -> Option<&ReloadOutcome> {
        self.initial
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.hub.unmount(self.view);
    }
}

impl std::fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHandle")
            .field("view", &self.view)
            .finish()
    }
}
