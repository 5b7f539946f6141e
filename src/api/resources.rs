//! Typed endpoints for each console resource.
//!
//! | Resource | Operations |
//! |---|---|
//! | alchemists | list, create, update, delete |
//! | missions | list, create, update, delete, status patch |
//! | materials | list, create, update, delete |
//! | transmutations | list, create, delete |
//! | audits | list |

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::{ApiClient, ApiResponse, RequestError};
use crate::models::{
    AuthResponse, LoginRequest, MissionStatus, RegisterRequest, Resource, ResourceKind,
    UserProfile,
};
use crate::{Error, Result};

/// Whether the backend exposes `method` for a resource.
///
/// `GET`/`POST` address the collection; `PUT`/`DELETE` address one item.
pub fn supports(kind: ResourceKind, method: &Method) -> bool {
    match kind {
        ResourceKind::Audits => *method == Method::GET,
        ResourceKind::Transmutations => {
            matches!(*method, Method::GET | Method::POST | Method::DELETE)
        }
        ResourceKind::Alchemists | ResourceKind::Missions | ResourceKind::Materials => matches!(
            *method,
            Method::GET | Method::POST | Method::PUT | Method::DELETE
        ),
    }
}

fn ensure_supported(kind: ResourceKind, method: &Method) -> Result<()> {
    if supports(kind, method) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} does not support {}",
            kind, method
        )))
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}

impl ApiClient {
    /// Fetch the full collection for `T`.
    pub async fn list<T: Resource>(&self, token: &str) -> std::result::Result<Vec<T>, RequestError> {
        self.get_list(T::KIND.path(), Some(token)).await
    }

    /// Create an entity from a draft and return the stored version.
    pub async fn create<T: Resource + Serialize>(&self, token: &str, draft: &T) -> Result<T> {
        ensure_supported(T::KIND, &Method::POST)?;
        let path = T::KIND.path();
        let body = to_body(draft)?;
        let resp = self
            .request(Method::POST, path, Some(&body), Some(token))
            .await?;
        Ok(resp.decode(path)?)
    }

    /// Replace an existing entity.
    pub async fn update<T: Resource + Serialize>(
        &self,
        token: &str,
        id: u64,
        entity: &T,
    ) -> Result<ApiResponse> {
        ensure_supported(T::KIND, &Method::PUT)?;
        let path = format!("{}/{}", T::KIND.path(), id);
        let body = to_body(entity)?;
        Ok(self
            .request(Method::PUT, &path, Some(&body), Some(token))
            .await?)
    }

    /// Delete one entity by id.
    pub async fn delete(&self, token: &str, kind: ResourceKind, id: u64) -> Result<()> {
        ensure_supported(kind, &Method::DELETE)?;
        let path = format!("{}/{}", kind.path(), id);
        self.request(Method::DELETE, &path, None, Some(token))
            .await?;
        Ok(())
    }

    /// Move a mission to a new status (`PATCH /missions/{id}/status`).
    pub async fn update_mission_status(
        &self,
        token: &str,
        id: u64,
        status: MissionStatus,
    ) -> Result<ApiResponse> {
        if status == MissionStatus::Unknown {
            return Err(Error::InvalidInput("unknown mission status".to_string()));
        }
        let path = format!("{}/{}/status", ResourceKind::Missions.path(), id);
        let body = serde_json::json!({ "status": status });
        Ok(self
            .request(Method::PATCH, &path, Some(&body), Some(token))
            .await?)
    }

    /// Authenticate and return the bearer token with its profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, UserProfile)> {
        let body = to_body(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let resp: AuthResponse = self
            .request(Method::POST, "/auth/login", Some(&body), None)
            .await?
            .decode("/auth/login")?;
        resp.into_session()
    }

    /// Register a new account.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let body = to_body(request)?;
        let resp = self
            .request(Method::POST, "/auth/register", Some(&body), None)
            .await?;
        if resp.is_empty() {
            return Ok(AuthResponse::default());
        }
        Ok(resp.decode("/auth/register")?)
    }
}
