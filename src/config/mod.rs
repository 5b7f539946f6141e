//! Configuration for the console client.
//!
//! ## config.kdl - User preferences
//!
//! Located at `~/.config/alchemy-console/config.kdl`, or wherever `ALC_CONFIG`
//! points. Contains:
//! - `api-url` - Backend base URL
//! - `request-timeout-secs` - REST request timeout
//! - `reconnect-attempts` - Event channel retries after a transport error
//! - `output-format` - "json" or "human"
//!
//! The bearer token is never stored here; it comes from `alc login` output and
//! is passed back with `--token` or `ALC_TOKEN`.
//!
//! ## Precedence
//!
//! CLI flag > environment > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    API_URL_ENV, CONFIG_PATH_ENV, ConfigOverrides, DEFAULT_API_URL, Resolved, ResolvedConfig,
    ValueSource, config_exists, default_config_path, resolve_config, resolve_config_with_env,
};
pub use schema::{ConsoleConfig, OutputFormat};
