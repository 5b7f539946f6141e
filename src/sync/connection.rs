//! Event channel connection state and reconnect policy.
//!
//! The base lifecycle is `Disconnected -> Connecting -> Connected -> Disconnected`.
//! A transport error ends the connection; with the default policy nothing
//! reopens it. When a [`ReconnectPolicy`] allows attempts, the channel passes
//! through `Reconnecting` with exponential backoff while the session token is
//! unchanged.

use std::time::Duration;

/// Lifecycle of the push stream, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Stream open; messages are being delivered
    Connected,
    /// Backing off before retry `attempt`
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Open, opening, or waiting to reopen.
    pub fn is_active(self) -> bool {
        self != ConnectionState::Disconnected
    }

    /// Pending retry number while backing off.
    pub fn retry(self) -> Option<u32> {
        match self {
            ConnectionState::Reconnecting { attempt } => Some(attempt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.retry() {
            Some(attempt) => write!(f, "{} (retry {})", self.as_str(), attempt),
            None => f.write_str(self.as_str()),
        }
    }
}

/// Delay cap between reconnect attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// How the channel reacts to a transport error.
///
/// The first retry is immediate; each later one waits twice as long as the
/// previous, starting at one second and capped at [`MAX_RETRY_DELAY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after a transport error; 0 closes the channel for good.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self { max_attempts: 0 }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let doublings = attempt - 1;
        let delay = match doublings {
            0 => Duration::ZERO,
            n => Duration::from_secs(1)
                .checked_mul(1u32.checked_shl(n - 1).unwrap_or(u32::MAX))
                .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY)),
        };
        Some(delay)
    }
}
