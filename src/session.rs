//! Session holder.
//!
//! Owns the bearer token and the authenticated user profile. Everything else
//! (REST client, event channel, resource stores) receives a [`Session`] handle
//! and only reads it.
//!
//! Each distinct session gets a new epoch. Work started under one epoch can
//! check [`Session::is_current`] before applying its result, so nothing
//! started before a logout or a token change lands after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::models::{Role, UserProfile};

/// Callback run synchronously inside [`Session::logout`].
type LogoutHook = Box<dyn Fn() + Send + Sync>;

/// Read-only view of the session at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: String,
    pub user: UserProfile,
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn role(&self) -> Role {
        self.user.role
    }
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    user: Option<UserProfile>,
    epoch: u64,
}

struct Inner {
    state: Mutex<SessionState>,
    hooks: Mutex<Vec<LogoutHook>>,
    epoch_tx: watch::Sender<u64>,
}

/// Shared handle to the current session.
///
/// Cloning is cheap; every clone observes the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session holder with nobody logged in.
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                hooks: Mutex::new(Vec::new()),
                epoch_tx,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Establish the session.
    ///
    /// Calling this again with the same token and role keeps the current
    /// epoch and only refreshes the profile. A different token, or a role
    /// change under the same token, starts a new epoch.
    pub fn login(&self, token: impl Into<String>, user: UserProfile) {
        let token = token.into();
        let epoch = {
            let mut state = self.state();
            let same_token = state.token.as_deref() == Some(token.as_str());
            let same_role = state.user.as_ref().map(|u| u.role) == Some(user.role);
            if same_token && same_role {
                state.user = Some(user);
                return;
            }
            state.epoch += 1;
            state.token = Some(token);
            state.user = Some(user);
            state.epoch
        };
        tracing::info!(epoch, "session established");
        self.inner.epoch_tx.send_replace(epoch);
    }

    /// Clear the session.
    ///
    /// Logout hooks run before this returns, so the event channel is already
    /// closed when the caller regains control.
    pub fn logout(&self) {
        let epoch = {
            let mut state = self.state();
            if state.token.is_none() {
                return;
            }
            state.epoch += 1;
            state.token = None;
            state.user = None;
            state.epoch
        };
        tracing::info!(epoch, "session ended");

        let hooks = self
            .inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook();
        }
        drop(hooks);

        self.inner.epoch_tx.send_replace(epoch);
    }

    /// Register a callback to run synchronously on every logout.
    pub fn on_logout(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Watch epoch changes (login, token change, logout).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.epoch_tx.subscribe()
    }

    /// Current token and profile, if authenticated.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.state();
        match (&state.token, &state.user) {
            (Some(token), Some(user)) => Some(SessionSnapshot {
                token: token.clone(),
                user: user.clone(),
                epoch: state.epoch,
            }),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state().user.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.state().user.as_ref().map(|u| u.role)
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().token.is_some()
    }

    /// Whether the session that started at `epoch` is still the live one.
    pub fn is_current(&self, epoch: u64) -> bool {
        let state = self.state();
        state.token.is_some() && state.epoch == epoch
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("authenticated", &state.token.is_some())
            .field("user", &state.user)
            .field("epoch", &state.epoch)
            .finish()
    }
}
