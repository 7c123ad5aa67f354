//! Core type definitions for the dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default adapter timeout when a config does not set one
pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 10_000;

/// A single capability flag a service may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    RealTimeUpdates,
    LogStreaming,
    MetricsHistory,
    ResourceManagement,
    MultiProject,
    Deployments,
    Analytics,
    FileOperations,
    Database,
    UserManagement,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Self::RealTimeUpdates,
        Self::LogStreaming,
        Self::MetricsHistory,
        Self::ResourceManagement,
        Self::MultiProject,
        Self::Deployments,
        Self::Analytics,
        Self::FileOperations,
        Self::Database,
        Self::UserManagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealTimeUpdates => "realTimeUpdates",
            Self::LogStreaming => "logStreaming",
            Self::MetricsHistory => "metricsHistory",
            Self::ResourceManagement => "resourceManagement",
            Self::MultiProject => "multiProject",
            Self::Deployments => "deployments",
            Self::Analytics => "analytics",
            Self::FileOperations => "fileOperations",
            Self::Database => "database",
            Self::UserManagement => "userManagement",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .iter()
            .find(|cap| cap.as_str().to_lowercase() == normalized)
            .copied()
            .ok_or_else(|| format!("Invalid capability: {}", s))
    }
}

/// Fixed set of capability flags for a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub real_time_updates: bool,
    pub log_streaming: bool,
    pub metrics_history: bool,
    pub resource_management: bool,
    pub multi_project: bool,
    pub deployments: bool,
    pub analytics: bool,
    pub file_operations: bool,
    pub database: bool,
    pub user_management: bool,
}

impl Capabilities {
    /// Build a capability set from a list of enabled flags
    pub fn from_list(enabled: &[Capability]) -> Self {
        let mut caps = Self::default();
        for cap in enabled {
            *caps.flag_mut(*cap) = true;
        }
        caps
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::RealTimeUpdates => self.real_time_updates,
            Capability::LogStreaming => self.log_streaming,
            Capability::MetricsHistory => self.metrics_history,
            Capability::ResourceManagement => self.resource_management,
            Capability::MultiProject => self.multi_project,
            Capability::Deployments => self.deployments,
            Capability::Analytics => self.analytics,
            Capability::FileOperations => self.file_operations,
            Capability::Database => self.database,
            Capability::UserManagement => self.user_management,
        }
    }

    /// All enabled flags, in declaration order
    pub fn enabled(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|cap| self.has(*cap))
            .collect()
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::RealTimeUpdates => &mut self.real_time_updates,
            Capability::LogStreaming => &mut self.log_streaming,
            Capability::MetricsHistory => &mut self.metrics_history,
            Capability::ResourceManagement => &mut self.resource_management,
            Capability::MultiProject => &mut self.multi_project,
            Capability::Deployments => &mut self.deployments,
            Capability::Analytics => &mut self.analytics,
            Capability::FileOperations => &mut self.file_operations,
            Capability::Database => &mut self.database,
            Capability::UserManagement => &mut self.user_management,
        }
    }
}

/// Authentication strategies a provider accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Token,
    ApiKey,
    AccessKey,
    #[serde(rename = "oauth")]
    OAuth,
    Cli,
}

/// One entry of a service's configuration schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperty {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Static descriptor for a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub capabilities: Capabilities,
    pub auth_methods: Vec<AuthMethod>,
    pub config_schema: BTreeMap<String, ConfigProperty>,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            capabilities: Capabilities::default(),
            auth_methods: Vec::new(),
            config_schema: BTreeMap::new(),
        }
    }

    pub fn with_capabilities(mut self, enabled: &[Capability]) -> Self {
        self.capabilities = Capabilities::from_list(enabled);
        self
    }

    pub fn with_auth_methods(mut self, methods: &[AuthMethod]) -> Self {
        self.auth_methods = methods.to_vec();
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        self.config_schema.insert(
            name.into(),
            ConfigProperty {
                kind: kind.into(),
                description: description.into(),
                default,
            },
        );
        self
    }
}

/// Per-instance configuration supplied by whoever requests an adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Request timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Bypass the factory cache and always build a fresh adapter
    #[serde(default)]
    pub unique_instance: bool,
    /// Provider-specific extras
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique_instance = true;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Effective timeout for adapter calls
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_SERVICE_TIMEOUT_MS))
    }

    /// Cache identity: service type plus the config serialized with sorted keys
    pub fn cache_key(&self, service: &str) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        format!("{}:{}", service, canonical_json(&value))
    }
}

/// Serialize a JSON value with object keys in sorted order at every level
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        Value::String(key.clone()),
                        canonical_json(&map[key.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// Credential bundle for one adapter
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl AuthConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.fields.is_empty()
    }
}

// Credentials never show up in logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A resource a provider reports (project, database, bucket, repository...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            status: None,
            url: None,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_updated_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.updated_at = at;
        self
    }
}

/// A log line returned by services with log access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Provider-specific snapshot returned by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceData {
    pub service: String,
    pub available: bool,
    pub authenticated: bool,
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Problems reported by the provider for an otherwise successful fetch
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub details: Value,
    pub fetched_at: DateTime<Utc>,
}

impl ServiceData {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            available: true,
            authenticated: false,
            resources: Vec::new(),
            metrics: BTreeMap::new(),
            errors: Vec::new(),
            details: Value::Null,
            fetched_at: Utc::now(),
        }
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Error entry standing in for a service whose fetch failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Per-service slot in a snapshot: data or the reason it is missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceEntry {
    Data(ServiceData),
    Failed(ServiceFailure),
}

impl ServiceEntry {
    pub fn failed(error: impl Into<String>, code: Option<&str>) -> Self {
        Self::Failed(ServiceFailure {
            error: error.into(),
            code: code.map(str::to_string),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn data(&self) -> Option<&ServiceData> {
        match self {
            Self::Data(data) => Some(data),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Data(_) => None,
            Self::Failed(failure) => Some(&failure.error),
        }
    }

    pub fn error_count(&self) -> usize {
        match self {
            Self::Data(data) => data.errors.len(),
            Self::Failed(_) => 1,
        }
    }

    pub fn resource_count(&self) -> usize {
        self.data().map(|d| d.resources.len()).unwrap_or(0)
    }
}

/// Categorical rollup across all services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    #[default]
    Healthy,
    Degraded,
    Down,
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Cross-service roll-up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    pub total_resources: usize,
    pub total_errors: usize,
    pub overall_health: OverallHealth,
}

impl AggregatedStats {
    /// Derive the roll-up from the per-service entries; never tracked separately
    pub fn compute(services: &BTreeMap<String, ServiceEntry>) -> Self {
        let total_resources = services.values().map(ServiceEntry::resource_count).sum();
        let total_errors = services.values().map(ServiceEntry::error_count).sum();
        let failed = services.values().filter(|e| e.is_error()).count();

        let overall_health = if total_errors == 0 {
            OverallHealth::Healthy
        } else if !services.is_empty() && failed == services.len() {
            OverallHealth::Down
        } else {
            OverallHealth::Degraded
        };

        Self {
            total_resources,
            total_errors,
            overall_health,
        }
    }
}

/// Aggregated read model handed to the TUI and IPC clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub services: BTreeMap<String, ServiceEntry>,
    pub aggregated: AggregatedStats,
    pub timestamp: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn from_entries(services: BTreeMap<String, ServiceEntry>) -> Self {
        let aggregated = AggregatedStats::compute(&services);
        Self {
            services,
            aggregated,
            timestamp: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::from_entries(BTreeMap::new())
    }
}
