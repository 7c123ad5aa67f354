//! GitHub adapter: repositories and Actions workflow runs

use async_trait::async_trait;
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, Resource, Result, ServiceConfig, ServiceData, ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{instrument, warn};

use super::{parse_time, str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::http::ProviderApi;
use crate::probe::CommandRunner;

const NAME: &str = "github";
const API_BASE_URL: &str = "https://api.github.com";
const REPO_LIMIT: usize = 20;
const RUN_LIMIT: usize = 10;

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "GitHub", "Repositories and Actions workflow runs")
        .with_capabilities(&[
            Capability::ResourceManagement,
            Capability::MultiProject,
            Capability::Deployments,
        ])
        .with_auth_methods(&[AuthMethod::Token, AuthMethod::OAuth, AuthMethod::Cli])
        .with_property("projectId", "string", "Repository as owner/name", None)
        .with_property("timeout", "number", "Request timeout in milliseconds", Some(json!(10000)))
}

pub struct GitHubAdapter {
    base: AdapterBase,
    api: ProviderApi,
}

impl GitHubAdapter {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let base = AdapterBase::new(info(), config);
        let api = ProviderApi::with_headers(
            NAME,
            base.api_base_url(API_BASE_URL),
            base.config().timeout(),
            &[
                ("accept", "application/vnd.github+json"),
                ("x-github-api-version", "2022-11-28"),
            ],
        )?;
        Ok(Self { base, api })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    pub fn create(config: ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> {
        Ok(Arc::new(Self::new(config)?))
    }

    /// Configured `owner/name` repository, if any
    fn repository(&self) -> Option<&str> {
        self.base
            .config()
            .project_id
            .as_deref()
            .filter(|p| p.split('/').count() == 2)
    }

    async fn fetch_repos(&self, token: &str) -> Result<Vec<Resource>> {
        let query = [
            ("per_page", REPO_LIMIT.to_string()),
            ("sort", "updated".to_string()),
        ];
        let body = self.api.get_json("/user/repos", token, &query).await?;
        Ok(body
            .as_array()
            .map(|repos| repos.iter().map(map_repo).collect())
            .unwrap_or_default())
    }

    async fn fetch_runs(&self, token: &str, repo: &str, limit: usize) -> Result<Vec<Resource>> {
        let path = format!("/repos/{}/actions/runs", repo);
        let body = self
            .api
            .get_json(&path, token, &[("per_page", limit.to_string())])
            .await?;
        Ok(body["workflow_runs"]
            .as_array()
            .map(|runs| runs.iter().map(map_run).collect())
            .unwrap_or_default())
    }

    async fn collect(&self) -> Result<ServiceData> {
        let token = self.base.require_token().await?;
        let repos = self.fetch_repos(&token).await?;

        let mut data = ServiceData::new(NAME)
            .authenticated(true)
            .with_metric("repositories", repos.len() as f64)
            .with_resources(repos);

        if let Some(repo) = self.repository() {
            match self.fetch_runs(&token, repo, RUN_LIMIT).await {
                Ok(runs) => {
                    let failed = runs
                        .iter()
                        .filter(|r| r.status.as_deref() == Some("failure"))
                        .count();
                    data = data
                        .with_metric("workflowRuns", runs.len() as f64)
                        .with_metric("failedRuns", failed as f64)
                        .with_resources(runs);
                }
                Err(e) => {
                    warn!("GitHub workflow runs unavailable for {}: {}", repo, e);
                    data = data.with_error(format!("actions: {}", e));
                }
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl ServiceAdapter for GitHubAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.has_token().await || self.base.runner().is_installed("gh").await
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

    /// Workflow runs for the configured repository
    async fn list_deployments(&self, limit: usize) -> Result<Vec<Resource>> {
        let token = self.base.require_token().await?;
        let Some(repo) = self.repository() else {
            return Ok(Vec::new());
        };
        within_timeout(
            NAME,
            self.base.config().timeout(),
            self.fetch_runs(&token, repo, limit),
        )
        .await
    }
}

fn map_repo(repo: &Value) -> Resource {
    let mut resource = Resource::new(str_field(repo, "id"), str_field(repo, "full_name"), "repository")
        .with_updated_at(parse_time(&repo["updated_at"]));
    if let Some(url) = repo["html_url"].as_str() {
        resource = resource.with_url(url);
    }
    if repo["archived"].as_bool() == Some(true) {
        resource = resource.with_status("archived");
    }
    resource
}

/// Completed runs report their conclusion, in-flight runs their status
fn map_run(run: &Value) -> Resource {
    let status = run["conclusion"]
        .as_str()
        .or_else(|| run["status"].as_str())
        .unwrap_or("unknown");
    let mut resource = Resource::new(str_field(run, "id"), str_field(run, "name"), "workflow_run")
        .with_status(status)
        .with_updated_at(parse_time(&run["updated_at"]));
    if let Some(url) = run["html_url"].as_str() {
        resource = resource.with_url(url);
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_repo() {
        let repo = json!({
            "id": 42,
            "full_name": "acme/web",
            "html_url": "https://github.com/acme/web",
            "archived": true,
            "updated_at": "2024-04-02T10:00:00Z"
        });
        let resource = map_repo(&repo);
        assert_eq!(resource.id, "42");
        assert_eq!(resource.name, "acme/web");
        assert_eq!(resource.status.as_deref(), Some("archived"));
    }

    #[test]
    fn test_map_run_prefers_conclusion() {
        let done = map_run(&json!({"id": 1, "name": "CI", "status": "completed", "conclusion": "failure"}));
        assert_eq!(done.status.as_deref(), Some("failure"));

        let running = map_run(&json!({"id": 2, "name": "CI", "status": "in_progress", "conclusion": null}));
        assert_eq!(running.status.as_deref(), Some("in_progress"));
        assert_eq!(running.kind, "workflow_run");
    }

    #[tokio::test]
    async fn test_repository_must_be_owner_slash_name() {
        let adapter = GitHubAdapter::new(ServiceConfig::new().with_project("acme/web")).unwrap();
        assert_eq!(adapter.repository(), Some("acme/web"));

        let loose = GitHubAdapter::new(ServiceConfig::new().with_project("web")).unwrap();
        assert_eq!(loose.repository(), None);

        loose.authenticate(AuthConfig::with_token("t")).await.unwrap();
        assert!(loose.list_deployments(5).await.unwrap().is_empty());
    }
}
