//! Vercel adapter (REST API, `vercel` CLI for availability)

use async_trait::async_trait;
use chrono::Utc;
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, LogEntry, Resource, Result, ServiceConfig, ServiceData,
    ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{instrument, warn};

use super::{parse_time, str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::http::ProviderApi;
use crate::probe::CommandRunner;

const NAME: &str = "vercel";
const API_BASE_URL: &str = "https://api.vercel.com";
const PROJECT_LIMIT: usize = 20;
const DEPLOYMENT_LIMIT: usize = 10;

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "Vercel", "Frontend hosting, deployments and edge functions")
        .with_capabilities(&[
            Capability::RealTimeUpdates,
            Capability::LogStreaming,
            Capability::ResourceManagement,
            Capability::MultiProject,
            Capability::Deployments,
            Capability::Analytics,
        ])
        .with_auth_methods(&[AuthMethod::Token, AuthMethod::Cli])
        .with_property("teamId", "string", "Team scope for API calls", None)
        .with_property("projectId", "string", "Project to focus on", None)
        .with_property("timeout", "number", "Request timeout in milliseconds", Some(json!(10000)))
}

pub struct VercelAdapter {
    base: AdapterBase,
    api: ProviderApi,
}

impl VercelAdapter {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let base = AdapterBase::new(info(), config);
        let api = ProviderApi::new(NAME, base.api_base_url(API_BASE_URL), base.config().timeout())?;
        Ok(Self { base, api })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    pub fn create(config: ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> {
        Ok(Arc::new(Self::new(config)?))
    }

    async fn scope(&self) -> Vec<(&'static str, String)> {
        match self.base.setting(self.base.config().team_id.as_ref(), "teamId").await {
            Ok(team) => vec![("teamId", team)],
            Err(_) => Vec::new(),
        }
    }

    async fn fetch_projects(&self, token: &str) -> Result<Vec<Resource>> {
        let mut query = self.scope().await;
        query.push(("limit", PROJECT_LIMIT.to_string()));
        let body = self.api.get_json("/v9/projects", token, &query).await?;
        Ok(items(&body, "projects").iter().map(map_project).collect())
    }

    async fn fetch_deployments(
        &self,
        token: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Resource>> {
        let mut query = self.scope().await;
        query.push(("limit", limit.to_string()));
        if let Some(project) = project {
            query.push(("projectId", project.to_string()));
        }
        let body = self.api.get_json("/v6/deployments", token, &query).await?;
        Ok(items(&body, "deployments").iter().map(map_deployment).collect())
    }

    async fn collect(&self) -> Result<ServiceData> {
        let token = self.base.require_token().await?;
        let project = self.base.config().project_id.as_deref();

        let (projects, deployments) = tokio::join!(
            self.fetch_projects(&token),
            self.fetch_deployments(&token, project, DEPLOYMENT_LIMIT)
        );
        let projects = projects?;

        let mut data = ServiceData::new(NAME).authenticated(true);
        data = data.with_metric("projects", projects.len() as f64);
        data = data.with_resources(projects);

        match deployments {
            Ok(deployments) => {
                let failed = deployments
                    .iter()
                    .filter(|d| d.status.as_deref() == Some("error"))
                    .count();
                data = data
                    .with_metric("deployments", deployments.len() as f64)
                    .with_metric("failedDeployments", failed as f64)
                    .with_resources(deployments);
            }
            Err(e) => {
                warn!("Vercel deployments unavailable: {}", e);
                data = data.with_error(format!("deployments: {}", e));
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl ServiceAdapter for VercelAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.has_token().await || self.base.runner().is_installed("vercel").await
    }

    async fn is_authenticated(&self) -> bool {
        self.base.has_token().await
    }

    async fn authenticate(&self, auth: AuthConfig) -> Result<bool> {
        let authenticated = auth.token.is_some();
        self.base.set_credentials(auth).await;
        Ok(authenticated)
    }

    #[instrument(skip(self))]
    async fn get_dashboard_data(&self) -> Result<ServiceData> {
        within_timeout(NAME, self.base.config().timeout(), self.collect()).await
    }

    async fn get_analytics(&self, resource: &str) -> Result<Value> {
        let token = self.base.require_token().await?;
        let deployments = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.fetch_deployments(&token, Some(resource), 20),
        )
        .await?;
        Ok(deployment_summary(resource, &deployments))
    }

    async fn list_deployments(&self, limit: usize) -> Result<Vec<Resource>> {
        let token = self.base.require_token().await?;
        let project = self.base.config().project_id.as_deref();
        within_timeout(
            NAME,
            self.base.config().timeout(),
            self.fetch_deployments(&token, project, limit),
        )
        .await
    }

    async fn get_logs(&self, resource: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let token = self.base.require_token().await?;
        let path = format!("/v2/deployments/{}/events", resource);
        let body = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.api.get_json(&path, &token, &[("limit", limit.to_string())]),
        )
        .await?;

        let events = body.as_array().cloned().unwrap_or_default();
        Ok(events
            .iter()
            .take(limit)
            .map(|event| map_event(resource, event))
            .collect())
    }
}

fn items<'a>(body: &'a Value, key: &str) -> &'a [Value] {
    body[key].as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn map_project(project: &Value) -> Resource {
    Resource::new(str_field(project, "id"), str_field(project, "name"), "project")
        .with_updated_at(parse_time(&project["updatedAt"]))
}

fn map_deployment(deployment: &Value) -> Resource {
    let mut resource = Resource::new(
        str_field(deployment, "uid"),
        str_field(deployment, "name"),
        "deployment",
    )
    .with_updated_at(parse_time(&deployment["created"]));

    let state = str_field(deployment, "state");
    if !state.is_empty() {
        resource = resource.with_status(state.to_lowercase());
    }
    let url = str_field(deployment, "url");
    if !url.is_empty() {
        resource = resource.with_url(format!("https://{}", url));
    }
    resource
}

fn map_event(deployment: &str, event: &Value) -> LogEntry {
    let message = match event["payload"]["text"].as_str() {
        Some(text) => text.to_string(),
        None => str_field(event, "text"),
    };
    let level = if event["type"] == "stderr" { "error" } else { "info" };
    LogEntry {
        timestamp: parse_time(&event["created"]).unwrap_or_else(Utc::now),
        level: level.to_string(),
        message,
        source: Some(deployment.to_string()),
    }
}

fn deployment_summary(project: &str, deployments: &[Resource]) -> Value {
    let count = |state: &str| {
        deployments
            .iter()
            .filter(|d| d.status.as_deref() == Some(state))
            .count()
    };
    json!({
        "project": project,
        "deployments": deployments.len(),
        "ready": count("ready"),
        "error": count("error"),
        "building": count("building"),
        "lastDeployedAt": deployments.iter().filter_map(|d| d.updated_at).max(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CommandOutput, MockRunner};
    use fluorite_core::FluoriteError;

    fn adapter() -> VercelAdapter {
        VercelAdapter::new(ServiceConfig::new().with_timeout_ms(500)).unwrap()
    }

    #[test]
    fn test_info_capabilities() {
        let info = info();
        assert_eq!(info.name, "vercel");
        assert!(info.capabilities.deployments);
        assert!(info.capabilities.analytics);
        assert!(!info.capabilities.database);
        assert!(info.config_schema.contains_key("teamId"));
    }

    #[test]
    fn test_map_deployment() {
        let deployment = json!({
            "uid": "dpl_123",
            "name": "web",
            "url": "web-abc.vercel.app",
            "state": "ERROR",
            "created": 1_700_000_000_000i64
        });
        let resource = map_deployment(&deployment);
        assert_eq!(resource.id, "dpl_123");
        assert_eq!(resource.kind, "deployment");
        assert_eq!(resource.status.as_deref(), Some("error"));
        assert_eq!(resource.url.as_deref(), Some("https://web-abc.vercel.app"));
        assert!(resource.updated_at.is_some());
    }

    #[test]
    fn test_map_event_levels() {
        let out = map_event("dpl_1", &json!({"type": "stdout", "payload": {"text": "Building"}}));
        assert_eq!(out.level, "info");
        assert_eq!(out.message, "Building");

        let err = map_event("dpl_1", &json!({"type": "stderr", "text": "boom"}));
        assert_eq!(err.level, "error");
        assert_eq!(err.message, "boom");
        assert_eq!(err.source.as_deref(), Some("dpl_1"));
    }

    #[test]
    fn test_deployment_summary() {
        let deployments = vec![
            map_deployment(&json!({"uid": "1", "state": "READY"})),
            map_deployment(&json!({"uid": "2", "state": "ERROR"})),
            map_deployment(&json!({"uid": "3", "state": "READY"})),
        ];
        let summary = deployment_summary("web", &deployments);
        assert_eq!(summary["deployments"], 3);
        assert_eq!(summary["ready"], 2);
        assert_eq!(summary["error"], 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_dashboard_data() {
        let adapter = adapter();
        adapter.authenticate(AuthConfig::default()).await.unwrap();
        assert!(!adapter.is_authenticated().await);

        let err = adapter.get_dashboard_data().await.unwrap_err();
        assert!(matches!(err, FluoriteError::NotAuthenticated { ref env_var, .. } if env_var == "VERCEL_TOKEN"));
    }

    #[tokio::test]
    async fn test_available_via_cli() {
        let runner = MockRunner::new()
            .with_response("vercel --version", CommandOutput::ok("Vercel CLI 33.0.1"));
        let adapter = adapter().with_runner(Arc::new(runner));
        adapter.authenticate(AuthConfig::default()).await.unwrap();
        assert!(adapter.is_available().await);
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let err = adapter().list_buckets().await.unwrap_err();
        assert!(matches!(err, FluoriteError::CapabilityUnsupported { .. }));
    }
}
