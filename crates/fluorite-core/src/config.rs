//! Dashboard configuration
//!
//! Orchestrator-wide settings: refresh cadence, which services to bring up
//! eagerly, the IPC transport, and display preferences consumed by the TUI.
//! Loaded from `.fluorite/dashboard.toml` when present.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{FluoriteError, Result, ServiceConfig};

/// Default TCP port for the IPC server
pub const DEFAULT_IPC_PORT: u16 = 9123;

const CONFIG_DIR: &str = ".fluorite";
const CONFIG_FILE: &str = "dashboard.toml";

/// Orchestrator-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Refresh interval in milliseconds; 0 disables the background refresh
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Services to initialize eagerly
    #[serde(default)]
    pub auto_init_services: Vec<String>,

    /// Per-service configuration overrides, keyed by service name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Primary transport settings
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Display preferences (UI only)
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Transport kinds a dashboard front-end can use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    Rest,
}

/// IPC transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfig {
    #[serde(default)]
    pub primary: TransportKind,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Local domain socket; takes precedence over host/port when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Display preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default = "default_layout")]
    pub layout: String,

    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

fn default_refresh_interval() -> u64 {
    5000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_IPC_PORT
}

fn default_theme() -> String {
    "dark".to_string()
}

fn default_layout() -> String {
    "grid".to_string()
}

fn default_auto_refresh() -> bool {
    true
}

impl DashboardConfig {
    /// Load configuration from `.fluorite/dashboard.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = Self::path_in(project_root);

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            FluoriteError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.fluorite/dashboard.toml`
    pub fn write_default(project_root: &Path) -> Result<PathBuf> {
        let config_dir = project_root.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            FluoriteError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Reject settings that cannot work at runtime
    pub fn validate(&self) -> Result<()> {
        if self.protocol.port == 0 && self.protocol.socket_path.is_none() {
            return Err(FluoriteError::Config(
                "protocol.port must be non-zero when no socketPath is set".to_string(),
            ));
        }
        if let Some(token) = &self.protocol.auth_token {
            if token.trim().is_empty() {
                return Err(FluoriteError::Config(
                    "protocol.authToken must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Background refresh period, or `None` for on-demand refresh only
    pub fn refresh_period(&self) -> Option<Duration> {
        (self.refresh_interval > 0).then(|| Duration::from_millis(self.refresh_interval))
    }

    /// Configuration for a given service, falling back to defaults
    pub fn service_config(&self, service: &str) -> ServiceConfig {
        self.services.get(service).cloned().unwrap_or_default()
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            auto_init_services: Vec::new(),
            services: BTreeMap::new(),
            protocol: ProtocolConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            primary: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            socket_path: None,
            auth_token: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            layout: default_layout(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.refresh_interval, 5000);
        assert_eq!(config.protocol.port, DEFAULT_IPC_PORT);
        assert_eq!(config.protocol.host, "127.0.0.1");
        assert!(config.auto_init_services.is_empty());
        assert_eq!(config.refresh_period(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = DashboardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_write_default_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = DashboardConfig::write_default(dir.path()).unwrap();
        assert!(path.exists());

        let config = DashboardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".fluorite")).unwrap();
        std::fs::write(
            DashboardConfig::path_in(dir.path()),
            r#"
refreshInterval = 0
autoInitServices = ["vercel", "github"]

[services.vercel]
teamId = "team_123"
timeout = 2000

[protocol]
port = 19123
authToken = "secret"
"#,
        )
        .unwrap();

        let config = DashboardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.refresh_period(), None);
        assert_eq!(config.auto_init_services, vec!["vercel", "github"]);
        assert_eq!(config.protocol.port, 19123);
        assert_eq!(config.protocol.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.display.theme, "dark");

        let vercel = config.service_config("vercel");
        assert_eq!(vercel.team_id.as_deref(), Some("team_123"));
        assert_eq!(vercel.timeout, Some(2000));
        assert_eq!(config.service_config("github"), ServiceConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "refreshInterval = \"soon\"").unwrap();

        let err = DashboardConfig::load(&path).unwrap_err();
        assert!(matches!(err, FluoriteError::Config(_)));
    }

    #[test]
    fn test_empty_auth_token_rejected() {
        let mut config = DashboardConfig::default();
        config.protocol.auth_token = Some("  ".to_string());
        assert!(config.validate().is_err());
    }
}
