//! KDL schema for config.kdl.
//!
//! This module provides:
//! - the struct representing the file
//! - conversion to and from KDL
//! - validation

use std::path::Path;

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Console preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// api-url "https://alchemy.example.com"
/// request-timeout-secs 15
/// reconnect-attempts 3
/// output-format "human"  // or "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Backend base URL
    pub api_url: Option<String>,

    /// Per-request timeout for REST calls
    pub request_timeout_secs: Option<u64>,

    /// Event channel reconnect attempts after a transport error (0 disables)
    pub reconnect_attempts: Option<u32>,

    pub output_format: Option<OutputFormat>,
}

impl ConsoleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(ref url) = self.api_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("api-url must be an http(s) URL, got {}", url));
            }
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request-timeout-secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown or mistyped nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = first_string(doc, "api-url") {
            config.api_url = Some(s.to_string());
        }

        if let Some(i) = first_integer(doc, "request-timeout-secs") {
            if i > 0 {
                config.request_timeout_secs = u64::try_from(i).ok();
            }
        }

        if let Some(i) = first_integer(doc, "reconnect-attempts") {
            config.reconnect_attempts = u32::try_from(i).ok();
        }

        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref url) = self.api_url {
            let mut node = KdlNode::new("api-url");
            node.push(KdlEntry::new(KdlValue::String(url.clone())));
            doc.nodes_mut().push(node);
        }

        if let Some(secs) = self.request_timeout_secs {
            let mut node = KdlNode::new("request-timeout-secs");
            node.push(KdlEntry::new(KdlValue::Integer(secs as i128)));
            doc.nodes_mut().push(node);
        }

        if let Some(attempts) = self.reconnect_attempts {
            let mut node = KdlNode::new("reconnect-attempts");
            node.push(KdlEntry::new(KdlValue::Integer(attempts as i128)));
            doc.nodes_mut().push(node);
        }

        if let Some(format) = self.output_format {
            let mut node = KdlNode::new("output-format");
            node.push(KdlEntry::new(KdlValue::String(format.as_str().to_string())));
            doc.nodes_mut().push(node);
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &ConsoleConfig) {
        if other.api_url.is_some() {
            self.api_url = other.api_url.clone();
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.reconnect_attempts.is_some() {
            self.reconnect_attempts = other.reconnect_attempts;
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }

    /// Load from `path`. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content.parse().map_err(|e| {
            Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e))
        })?;

        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

fn first_string<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    doc.get(name)?.entries().first()?.value().as_string()
}

fn first_integer(doc: &KdlDocument, name: &str) -> Option<i128> {
    doc.get(name)?.entries().first()?.value().as_integer()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_keys() {
        let kdl = r#"
            api-url "https://alchemy.example.com"
            request-timeout-secs 15
            reconnect-attempts 3
            output-format "human"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = ConsoleConfig::from_kdl(&doc);
        assert_eq!(config.api_url.as_deref(), Some("https://alchemy.example.com"));
        assert_eq!(config.request_timeout_secs, Some(15));
        assert_eq!(config.reconnect_attempts, Some(3));
        assert_eq!(config.output_format, Some(OutputFormat::Human));
    }

    #[test]
    fn test_bad_values_ignored() {
        let kdl = r#"
            request-timeout-secs -4
            reconnect-attempts "many"
            output-format "yaml"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = ConsoleConfig::from_kdl(&doc);
        assert_eq!(config, ConsoleConfig::default());
    }

    #[test]
    fn test_kdl_roundtrip() {
        let config = ConsoleConfig {
            api_url: Some("http://localhost:9000".to_string()),
            request_timeout_secs: Some(5),
            reconnect_attempts: Some(0),
            output_format: Some(OutputFormat::Json),
        };
        let text = config.to_kdl().to_string();
        let doc: KdlDocument = text.parse().unwrap();
        assert_eq!(ConsoleConfig::from_kdl(&doc), config);
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = ConsoleConfig {
            api_url: Some("ftp://nowhere".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = ConsoleConfig {
            api_url: Some("http://a".to_string()),
            request_timeout_secs: Some(10),
            ..Default::default()
        };
        base.merge(&ConsoleConfig {
            api_url: Some("http://b".to_string()),
            ..Default::default()
        });
        assert_eq!(base.api_url.as_deref(), Some("http://b"));
        assert_eq!(base.request_timeout_secs, Some(10));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConsoleConfig::load(&dir.path().join("config.kdl")).unwrap();
        assert_eq!(config, ConsoleConfig::default());
    }

    #[test]
    fn test_load_invalid_kdl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, "api-url \"unterminated").unwrap();
        assert!(matches!(ConsoleConfig::load(&path), Err(Error::Config(_))));
    }
}
