//! Precedence resolution for console configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment (`ALC_API_URL`)
//! 3. config.kdl
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::Result;
use crate::api::DEFAULT_TIMEOUT_SECS;
use crate::config::{ConsoleConfig, OutputFormat};
use crate::sync::ReconnectPolicy;

/// Environment variable overriding the backend URL.
pub const API_URL_ENV: &str = "ALC_API_URL";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "ALC_CONFIG";

/// Backend URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from a config file
    File(PathBuf),
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File(path) => write!(f, "file:{}", path.display()),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// File the config was read from (it may not exist)
    pub config_path: Option<PathBuf>,
    pub api_url: Resolved<String>,
    pub request_timeout_secs: Resolved<u64>,
    pub reconnect_attempts: Resolved<u32>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            api_url: Resolved::new(DEFAULT_API_URL.to_string(), ValueSource::Default),
            request_timeout_secs: Resolved::new(DEFAULT_TIMEOUT_SECS, ValueSource::Default),
            reconnect_attempts: Resolved::new(0, ValueSource::Default),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn api_url(&self) -> &str {
        &self.api_url.value
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.value)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::bounded(self.reconnect_attempts.value)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Default config.kdl location: `$XDG_CONFIG_HOME/alchemy-console/config.kdl`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("alchemy-console").join("config.kdl"))
}

/// Resolve configuration from the process environment.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_config_with_env(overrides, |name| std::env::var(name).ok())
}

/// Resolve configuration with an explicit environment lookup.
pub fn resolve_config_with_env(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| env(CONFIG_PATH_ENV).filter(|s| !s.is_empty()).map(PathBuf::from))
        .or_else(default_config_path);

    let file = match config_path {
        Some(ref path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::new(),
    };
    let file_source = |path: &Option<PathBuf>| ValueSource::File(path.clone().unwrap_or_default());

    let mut result = ResolvedConfig::default();

    if let Some(ref url) = overrides.api_url {
        result.api_url = Resolved::new(url.clone(), ValueSource::CliFlag);
    } else if let Some(url) = env(API_URL_ENV).filter(|s| !s.is_empty()) {
        result.api_url = Resolved::new(url, ValueSource::EnvVar(API_URL_ENV.to_string()));
    } else if let Some(ref url) = file.api_url {
        result.api_url = Resolved::new(url.clone(), file_source(&config_path));
    }
    result.api_url.value = result.api_url.value.trim_end_matches('/').to_string();

    if let Some(secs) = file.request_timeout_secs {
        result.request_timeout_secs = Resolved::new(secs, file_source(&config_path));
    }

    if let Some(attempts) = file.reconnect_attempts {
        result.reconnect_attempts = Resolved::new(attempts, file_source(&config_path));
    }

    if let Some(format) = overrides.output_format {
        result.output_format = Resolved::new(format, ValueSource::CliFlag);
    } else if let Some(format) = file.output_format {
        result.output_format = Resolved::new(format, file_source(&config_path));
    }

    result.config_path = config_path;
    Ok(result)
}

/// Whether `path` holds a config file.
pub fn config_exists(path: &Path) -> bool {
    path.is_file()
}
