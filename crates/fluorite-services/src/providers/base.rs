//! State shared by every provider adapter

use fluorite_core::{AuthConfig, FluoriteError, Result, ServiceConfig, ServiceInfo};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth;
use crate::probe::{CommandRunner, SystemRunner};

/// Descriptor, config, command runner and lazily-resolved credentials
pub struct AdapterBase {
    info: ServiceInfo,
    config: ServiceConfig,
    runner: Arc<dyn CommandRunner>,
    credentials: RwLock<Option<AuthConfig>>,
}

impl AdapterBase {
    pub fn new(info: ServiceInfo, config: ServiceConfig) -> Self {
        Self {
            info,
            config,
            runner: Arc::new(SystemRunner),
            credentials: RwLock::new(None),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn service(&self) -> &str {
        &self.info.name
    }

    /// Current credentials, resolving them from the environment on first use
    pub async fn credentials(&self) -> AuthConfig {
        if let Some(auth) = self.credentials.read().await.as_ref() {
            return auth.clone();
        }

        let mut slot = self.credentials.write().await;
        slot.get_or_insert_with(|| auth::resolve_from_env(&self.info.name))
            .clone()
    }

    /// Replace credentials with an explicit bundle
    pub async fn set_credentials(&self, auth: AuthConfig) {
        *self.credentials.write().await = Some(auth);
    }

    pub async fn has_token(&self) -> bool {
        self.credentials().await.token.is_some()
    }

    /// Token or a `NotAuthenticated` error naming the variable to set
    pub async fn require_token(&self) -> Result<String> {
        self.credentials()
            .await
            .token
            .ok_or_else(|| self.not_authenticated())
    }

    pub fn not_authenticated(&self) -> FluoriteError {
        FluoriteError::NotAuthenticated {
            service: self.info.name.clone(),
            env_var: auth::token_env_var(&self.info.name).to_string(),
        }
    }

    /// Config value first, then a credential field, else a config error
    pub async fn setting(&self, config_value: Option<&String>, field: &str) -> Result<String> {
        if let Some(value) = config_value {
            return Ok(value.clone());
        }
        self.credentials()
            .await
            .field(field)
            .map(str::to_string)
            .ok_or_else(|| {
                FluoriteError::Config(format!("{} requires `{}` to be configured", self.info.name, field))
            })
    }

    /// Base URL override from `apiBaseUrl` in the service config
    pub fn api_base_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.config
            .extra
            .get("apiBaseUrl")
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluorite_core::ServiceInfo;

    fn base() -> AdapterBase {
        AdapterBase::new(
            ServiceInfo::new("vercel", "Vercel", "test"),
            ServiceConfig::new().with_extra("apiBaseUrl", serde_json::json!("http://localhost:1")),
        )
    }

    #[tokio::test]
    async fn test_explicit_credentials_win() {
        let base = base();
        base.set_credentials(AuthConfig::with_token("explicit")).await;
        assert_eq!(base.require_token().await.unwrap(), "explicit");
    }

    #[tokio::test]
    async fn test_missing_token_names_env_var() {
        let base = base();
        base.set_credentials(AuthConfig::default()).await;
        let err = base.require_token().await.unwrap_err();
        assert!(err.to_string().contains("VERCEL_TOKEN"));
    }

    #[tokio::test]
    async fn test_setting_prefers_config() {
        let base = base();
        base.set_credentials(AuthConfig::default().with_field("teamId", "from-auth")).await;

        let configured = "from-config".to_string();
        assert_eq!(base.setting(Some(&configured), "teamId").await.unwrap(), "from-config");
        assert_eq!(base.setting(None, "teamId").await.unwrap(), "from-auth");
        assert!(base.setting(None, "accountId").await.is_err());
    }

    #[test]
    fn test_api_base_url_override() {
        assert_eq!(base().api_base_url("https://api.vercel.com"), "http://localhost:1");
        let plain = AdapterBase::new(ServiceInfo::new("x", "X", ""), ServiceConfig::new());
        assert_eq!(plain.api_base_url("https://example.com"), "https://example.com");
    }
}
