//! Alchemy Console - live state synchronization for the alchemy administration console.
//!
//! This library keeps client-side views of the console's resources (missions,
//! materials, transmutations, audits, alchemists) consistent with mutations made
//! by any session. It provides:
//! - a session holder owning the bearer token and user profile
//! - a REST client that unwraps the backend's `{data: T}` envelope
//! - one coalescing resource store per resource
//! - a single server-push channel whose events are routed to store reloads
//! - view handles and derived read models for the dashboard and boards

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod session;
pub mod sync;
pub mod views;

pub use api::{ApiClient, ApiResponse, RequestError};
pub use models::{ResourceKind, Role, UserProfile};
pub use session::Session;
pub use sync::SyncHub;

/// Library-level error type for console operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not authenticated: log in first")]
    NotAuthenticated,

    #[error("Role {role} may not access {resource}")]
    Unauthorized { role: Role, resource: ResourceKind },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for console operations.
pub type Result<T> = std::result::Result<T, Error>;
