//! Data models for the alchemy console.
//!
//! This module defines the entity schemas the sync layer caches:
//! - `Alchemist` - Registered practitioners (supervisor-only)
//! - `Mission` - Assigned work with a four-state lifecycle
//! - `Material` - Inventory entries with a non-negative quantity
//! - `Transmutation` - Material conversions processed asynchronously by the backend
//! - `AuditEntry` - Server-side record of every mutation (supervisor-only)
//!
//! Every entity carries an optional server-assigned `id`; unsaved drafts have none.

pub mod auth;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use auth::{AuthResponse, LoginRequest, RegisterRequest, Role, UserProfile};

/// The logical resources the console keeps synchronized.
///
/// Each kind owns exactly one list endpoint and one resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Alchemists,
    Missions,
    Materials,
    Transmutations,
    Audits,
}

impl ResourceKind {
    /// All resource kinds, in dashboard card order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Alchemists,
        ResourceKind::Missions,
        ResourceKind::Materials,
        ResourceKind::Transmutations,
        ResourceKind::Audits,
    ];

    /// Collection endpoint path.
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Alchemists => "/alchemists",
            ResourceKind::Missions => "/missions",
            ResourceKind::Materials => "/materials",
            ResourceKind::Transmutations => "/transmutations",
            ResourceKind::Audits => "/audits",
        }
    }

    /// Role required to read this resource, if any.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            ResourceKind::Alchemists | ResourceKind::Audits => Some(Role::Supervisor),
            _ => None,
        }
    }

    /// Whether a session with `role` may load this resource.
    pub fn is_visible_to(&self, role: Role) -> bool {
        match self.required_role() {
            Some(required) => role == required,
            None => true,
        }
    }

    /// Parse from a user-supplied name (singular or plural, case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alchemists" | "alchemist" => Some(ResourceKind::Alchemists),
            "missions" | "mission" => Some(ResourceKind::Missions),
            "materials" | "material" => Some(ResourceKind::Materials),
            "transmutations" | "transmutation" => Some(ResourceKind::Transmutations),
            "audits" | "audit" => Some(ResourceKind::Audits),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Alchemists => "alchemists",
            ResourceKind::Missions => "missions",
            ResourceKind::Materials => "materials",
            ResourceKind::Transmutations => "transmutations",
            ResourceKind::Audits => "audits",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entity type that can be cached by a resource store.
pub trait Resource: DeserializeOwned + Clone + Send + Sync + 'static {
    /// The logical resource this entity belongs to.
    const KIND: ResourceKind;

    /// Server-assigned identifier, absent for unsaved drafts.
    fn id(&self) -> Option<u64>;
}

/// Mission lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Archived,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

impl MissionStatus {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(MissionStatus::Pending),
            "IN_PROGRESS" => Some(MissionStatus::InProgress),
            "COMPLETED" => Some(MissionStatus::Completed),
            "ARCHIVED" => Some(MissionStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Pending => "PENDING",
            MissionStatus::InProgress => "IN_PROGRESS",
            MissionStatus::Completed => "COMPLETED",
            MissionStatus::Archived => "ARCHIVED",
            MissionStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transmutation processing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmutationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TransmutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmutationStatus::Pending => "PENDING",
            TransmutationStatus::Processing => "PROCESSING",
            TransmutationStatus::Completed => "COMPLETED",
            TransmutationStatus::Failed => "FAILED",
            TransmutationStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TransmutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered alchemist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alchemist {
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(default)]
    pub specialty: String,

    #[serde(default)]
    pub rank: String,

    #[serde(default, alias = "CreatedAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Alchemist {
    const KIND: ResourceKind = ResourceKind::Alchemists;

    fn id(&self) -> Option<u64> {
        self.id
    }
}

/// A mission assigned to an alchemist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub difficulty: String,

    #[serde(default)]
    pub status: MissionStatus,

    /// Alchemist id the mission is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,

    #[serde(default, alias = "CreatedAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Mission {
    const KIND: ResourceKind = ResourceKind::Missions;

    fn id(&self) -> Option<u64> {
        self.id
    }
}

/// An inventory material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Material {
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: String,

    /// Available quantity, never negative
    #[serde(default, deserialize_with = "non_negative")]
    pub quantity: f64,

    #[serde(default, alias = "CreatedAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Material {
    const KIND: ResourceKind = ResourceKind::Materials;

    fn id(&self) -> Option<u64> {
        self.id
    }
}

/// A transmutation request and its outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transmutation {
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Requesting alchemist
    #[serde(default, alias = "alchemist_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(default, deserialize_with = "non_negative")]
    pub quantity: f64,

    #[serde(default)]
    pub status: TransmutationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, alias = "CreatedAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Transmutation {
    const KIND: ResourceKind = ResourceKind::Transmutations;

    fn id(&self) -> Option<u64> {
        self.id
    }
}

/// One row of the server's audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// CREATE, UPDATE, DELETE, ...
    #[serde(default)]
    pub action: String,

    /// Name of the affected entity
    #[serde(default)]
    pub entity: String,

    #[serde(default)]
    pub entity_id: u64,

    /// Email of the acting user
    #[serde(default)]
    pub user_email: String,

    #[serde(default, alias = "detail", skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, alias = "CreatedAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for AuditEntry {
    const KIND: ResourceKind = ResourceKind::Audits;

    fn id(&self) -> Option<u64> {
        self.id
    }
}

fn non_negative<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value.is_nan() {
        return Err(serde::de::Error::custom(format!(
            "quantity must be non-negative, got {}",
            value
        )));
    }
    Ok(value)
}
