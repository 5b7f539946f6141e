//! Command implementations for the `alc` CLI.
//!
//! Each command returns a value implementing [`Output`]; `main` decides
//! whether to print it as JSON or for humans.

use serde::Serialize;
use serde_json::{Value, json};

use crate::api::ApiClient;
use crate::config::{ResolvedConfig, config_exists};
use crate::models::{
    Alchemist, AuditEntry, AuthResponse, Material, Mission, MissionStatus, RegisterRequest,
    Resource, ResourceKind, Role, Transmutation, UserProfile,
};
use crate::session::Session;
use crate::sync::{ConnectionState, SyncHub};
use crate::views::{DashboardSummary, ViewKind};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    fn to_json(&self) -> String;

    fn to_human(&self) -> String;
}

fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

/// Session established by `alc login`.
#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserProfile,
}

impl Output for LoginResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Logged in as {} <{}> ({})",
            self.user.name, self.user.email, self.user.role
        )];
        if let Some(ref specialty) = self.user.specialty {
            lines.push(format!("  specialty: {}", specialty));
        }
        lines.push(format!("  token: {}", self.token));
        lines.join("\n")
    }
}

pub async fn login(api: &ApiClient, email: &str, password: &str) -> Result<LoginResult> {
    let (token, user) = api.login(email, password).await?;
    tracing::info!(email = %user.email, role = %user.role, "logged in");
    Ok(LoginResult { token, user })
}

/// Account created by `alc register`.
#[derive(Debug, Serialize)]
pub struct RegisterResult {
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Output for RegisterResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!("Registered {} as {}", self.email, self.role)
    }
}

pub async fn register(
    api: &ApiClient,
    email: &str,
    password: &str,
    role: &str,
    name: Option<String>,
    specialty: Option<String>,
) -> Result<RegisterResult> {
    let role = Role::parse(role)
        .ok_or_else(|| Error::InvalidInput(format!("unknown role '{}'", role)))?;
    let request = RegisterRequest {
        email: email.to_string(),
        password: password.to_string(),
        role,
        name,
        specialty,
    };
    let response: AuthResponse = api.register(&request).await?;
    Ok(RegisterResult {
        email: request.email,
        role,
        token: response.token,
    })
}

/// One fetched collection.
#[derive(Debug, Serialize)]
pub struct ListResult {
    pub resource: ResourceKind,
    pub count: usize,
    pub items: Vec<Value>,
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} {}", self.count, self.resource)];
        for item in &self.items {
            lines.push(format!("  {}", describe(self.resource, item)));
        }
        lines.join("\n")
    }
}

/// Short one-line description of a fetched entity.
fn describe(kind: ResourceKind, item: &Value) -> String {
    let id = item
        .get("id")
        .and_then(Value::as_u64)
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "#-".to_string());
    let field = |name: &str| item.get(name).and_then(Value::as_str).unwrap_or("");
    match kind {
        ResourceKind::Alchemists => format!("{} {} ({})", id, field("name"), field("specialty")),
        ResourceKind::Missions => format!("{} [{}] {}", id, field("status"), field("title")),
        ResourceKind::Materials => format!(
            "{} {} x{}",
            id,
            field("name"),
            item.get("quantity").and_then(Value::as_f64).unwrap_or(0.0)
        ),
        ResourceKind::Transmutations => format!("{} [{}]", id, field("status")),
        ResourceKind::Audits => format!(
            "{} {} {} by {}",
            id,
            field("action"),
            field("entity"),
            field("user_email")
        ),
    }
}

async fn fetch<T: Resource + Serialize>(api: &ApiClient, token: &str) -> Result<Vec<Value>> {
    let items = api.list::<T>(token).await?;
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(Error::from))
        .collect()
}

pub async fn list(api: &ApiClient, resource: &str, token: &str) -> Result<ListResult> {
    let kind = ResourceKind::parse(resource)
        .ok_or_else(|| Error::InvalidInput(format!("unknown resource '{}'", resource)))?;

    // Fail locally rather than sending a request the backend will refuse
    if let Ok(user) = UserProfile::from_token_claims(token) {
        if !kind.is_visible_to(user.role) {
            return Err(Error::Unauthorized {
                role: user.role,
                resource: kind,
            });
        }
    }

    let items = match kind {
        ResourceKind::Alchemists => fetch::<Alchemist>(api, token).await?,
        ResourceKind::Missions => fetch::<Mission>(api, token).await?,
        ResourceKind::Materials => fetch::<Material>(api, token).await?,
        ResourceKind::Transmutations => fetch::<Transmutation>(api, token).await?,
        ResourceKind::Audits => fetch::<AuditEntry>(api, token).await?,
    };
    Ok(ListResult {
        resource: kind,
        count: items.len(),
        items,
    })
}

/// Result of a mission status change.
#[derive(Debug, Serialize)]
pub struct MissionStatusResult {
    pub id: u64,
    pub status: MissionStatus,
}

impl Output for MissionStatusResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!("Mission #{} is now {}", self.id, self.status)
    }
}

pub async fn mission_status(
    api: &ApiClient,
    id: u64,
    status: &str,
    token: &str,
) -> Result<MissionStatusResult> {
    let status = MissionStatus::parse(status)
        .ok_or_else(|| Error::InvalidInput(format!("unknown mission status '{}'", status)))?;
    api.update_mission_status(token, id, status).await?;
    Ok(MissionStatusResult { id, status })
}

/// Resolved configuration, for `alc config show`.
#[derive(Debug, Serialize)]
pub struct ConfigShow {
    #[serde(flatten)]
    pub config: ResolvedConfig,
    pub config_file_exists: bool,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        let file = match c.config_path {
            Some(ref path) if self.config_file_exists => path.display().to_string(),
            Some(ref path) => format!("{} (not found)", path.display()),
            None => "(none)".to_string(),
        };
        [
            format!("config file: {}", file),
            format!("api-url: {} [{}]", c.api_url.value, c.api_url.source),
            format!(
                "request-timeout-secs: {} [{}]",
                c.request_timeout_secs.value, c.request_timeout_secs.source
            ),
            format!(
                "reconnect-attempts: {} [{}]",
                c.reconnect_attempts.value, c.reconnect_attempts.source
            ),
            format!(
                "output-format: {} [{}]",
                c.output_format.value, c.output_format.source
            ),
        ]
        .join("\n")
    }
}

pub fn config_show(config: ResolvedConfig) -> ConfigShow {
    let config_file_exists = config
        .config_path
        .as_deref()
        .is_some_and(config_exists);
    ConfigShow {
        config,
        config_file_exists,
    }
}

impl Output for DashboardSummary {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut line = self.to_line();
        if !self.missions_by_status.is_empty() {
            let breakdown: Vec<String> = self
                .missions_by_status
                .iter()
                .map(|(status, n)| format!("{}:{}", status, n))
                .collect();
            line.push_str(&format!(" | missions {}", breakdown.join(" ")));
        }
        line
    }
}

/// Follow the dashboard until Ctrl+C or until the channel closes.
///
/// `emit` is called with a fresh summary after the initial load and after
/// every store change.
pub async fn watch(
    config: &ResolvedConfig,
    token: &str,
    mut emit: impl FnMut(&DashboardSummary),
) -> Result<()> {
    let api = ApiClient::new(config.api_url(), config.request_timeout())?;
    let user = UserProfile::from_token_claims(token)?;
    let session = Session::new();
    session.login(token, user);

    let hub = SyncHub::new(api, session.clone(), config.reconnect_policy())?;
    let stores = hub.stores();
    let mut alchemists = stores.alchemists.subscribe();
    let mut missions = stores.missions.subscribe();
    let mut materials = stores.materials.subscribe();
    let mut transmutations = stores.transmutations.subscribe();
    let mut audits = stores.audits.subscribe();
    let mut state = hub.channel().subscribe_state();

    let view = hub.mount(ViewKind::Dashboard).await?;
    for (kind, outcome) in view.initial_outcomes() {
        tracing::debug!(resource = %kind, ?outcome, "initial load");
    }
    if let Some(summary) = hub.dashboard() {
        emit(&summary);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow_and_update() == ConnectionState::Disconnected {
                    drop(view);
                    session.logout();
                    return Err(Error::Other("event channel closed".to_string()));
                }
                tracing::info!(state = %*state.borrow(), "event channel state");
                continue;
            }
            _ = alchemists.changed() => {}
            _ = missions.changed() => {}
            _ = materials.changed() => {}
            _ = transmutations.changed() => {}
            _ = audits.changed() => {}
        }
        if let Some(summary) = hub.dashboard() {
            emit(&summary);
        }
    }

    drop(view);
    session.logout();
    Ok(())
}
