//! Authentication payloads and the authenticated user profile.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Alchemist,
    Supervisor,
}

impl Role {
    /// Parse from string, case-insensitive and whitespace-tolerant.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "alchemist" => Some(Role::Alchemist),
            "supervisor" => Some(Role::Supervisor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Alchemist => "alchemist",
            Role::Supervisor => "supervisor",
        }
    }

    pub fn is_supervisor(&self) -> bool {
        matches!(self, Role::Supervisor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Profile of the user owning the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub name: String,

    pub email: String,

    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

impl UserProfile {
    /// Recover a profile from the claims segment of a JWT bearer token.
    ///
    /// The signature is not verified; the server does that on every request.
    /// This only exists so a session can be rebuilt from a bare token.
    pub fn from_token_claims(token: &str) -> Result<Self> {
        let segment = token
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::InvalidInput("token is not a JWT".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .map_err(|e| Error::InvalidInput(format!("token claims are not base64: {}", e)))?;
        let claims: TokenClaims = serde_json::from_slice(&bytes)?;

        let role = Role::parse(&claims.role)
            .ok_or_else(|| Error::InvalidInput(format!("unknown role in token: {}", claims.role)))?;

        Ok(Self {
            id: claims.id,
            name: claims.name.unwrap_or_default(),
            email: claims.email,
            role,
            specialty: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    id: Option<u64>,
    email: String,
    role: String,
    #[serde(default)]
    name: Option<String>,
}

/// Body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

/// Response from the auth endpoints.
///
/// Every field is optional on the wire; register omits the token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl AuthResponse {
    /// Split a login response into the bearer token and user profile.
    ///
    /// Missing profile fields fall back to the token's own claims.
    pub fn into_session(self) -> Result<(String, UserProfile)> {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .ok_or(Error::NotAuthenticated)?;

        let role = self.role.as_deref().and_then(Role::parse);
        let profile = match (self.email, role) {
            (Some(email), Some(role)) => UserProfile {
                id: self.id,
                name: self.name.unwrap_or_default(),
                email,
                role,
                specialty: self.specialty.filter(|s| !s.is_empty()),
            },
            _ => {
                let mut profile = UserProfile::from_token_claims(&token)?;
                profile.specialty = self.specialty.filter(|s| !s.is_empty());
                profile
            }
        };

        Ok((token, profile))
    }
}

#[cfg(test)]
pub(crate) fn test_token(email: &str, role: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"id": 1, "email": email, "role": role, "name": "Test"})
            .to_string()
            .as_bytes(),
    );
    format!("{}.{}.signature", header, claims)
}
