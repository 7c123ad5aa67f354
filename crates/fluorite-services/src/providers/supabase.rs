//! Supabase adapter (Management API)

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, LogEntry, Resource, Result, ServiceConfig, ServiceData,
    ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use super::{parse_time, str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::http::ProviderApi;
use crate::probe::CommandRunner;

const NAME: &str = "supabase";
const API_BASE_URL: &str = "https://api.supabase.com";
const HEALTHY_STATUS: &str = "active_healthy";

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "Supabase", "Postgres databases, auth and realtime")
        .with_capabilities(&[
            Capability::RealTimeUpdates,
            Capability::LogStreaming,
            Capability::ResourceManagement,
            Capability::MultiProject,
            Capability::Database,
            Capability::UserManagement,
        ])
        .with_auth_methods(&[AuthMethod::AccessKey, AuthMethod::Cli])
        .with_property("projectId", "string", "Project reference to focus on", None)
        .with_property("timeout", "number", "Request timeout in milliseconds", Some(json!(10000)))
}

pub struct SupabaseAdapter {
    base: AdapterBase,
    api: ProviderApi,
}

impl SupabaseAdapter {
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

    async fn fetch_projects(&self, token: &str) -> Result<Vec<Resource>> {
        let body = self.api.get_json("/v1/projects", token, &[]).await?;
        let projects = body.as_array().cloned().unwrap_or_default();
        let focus = self.base.config().project_id.as_deref();

        Ok(projects
            .iter()
            .map(map_project)
            .filter(|p| focus.map_or(true, |id| p.id == id))
            .collect())
    }

    async fn collect(&self) -> Result<ServiceData> {
        let token = self.base.require_token().await?;
        let projects = self.fetch_projects(&token).await?;

        let unhealthy: Vec<String> = projects
            .iter()
            .filter(|p| p.status.as_deref() != Some(HEALTHY_STATUS))
            .map(|p| p.name.clone())
            .collect();

        Ok(ServiceData::new(NAME)
            .authenticated(true)
            .with_metric("projects", projects.len() as f64)
            .with_metric("unhealthyProjects", unhealthy.len() as f64)
            .with_details(json!({ "unhealthy": unhealthy }))
            .with_resources(projects))
    }
}

#[async_trait]
impl ServiceAdapter for SupabaseAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.has_token().await || self.base.runner().is_installed("supabase").await
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

    async fn list_databases(&self) -> Result<Vec<Resource>> {
        let token = self.base.require_token().await?;
        let projects =
            within_timeout(NAME, self.base.config().timeout(), self.fetch_projects(&token)).await?;

        // Every Supabase project is backed by exactly one Postgres instance
        Ok(projects
            .into_iter()
            .map(|p| {
                let mut db = Resource::new(p.id, p.name, "database").with_updated_at(p.updated_at);
                db.status = p.status;
                db
            })
            .collect())
    }

    /// Recent edge logs for a project reference
    async fn get_logs(&self, resource: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let token = self.base.require_token().await?;
        let path = format!("/v1/projects/{}/analytics/endpoints/logs.all", resource);
        let sql = format!(
            "select timestamp, event_message from edge_logs order by timestamp desc limit {}",
            limit
        );
        let body = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.api.get_json(&path, &token, &[("sql", sql)]),
        )
        .await?;

        Ok(body["result"]
            .as_array()
            .map(|rows| rows.iter().take(limit).map(|r| map_log(resource, r)).collect())
            .unwrap_or_default())
    }
}

/// Log timestamps are microseconds since the epoch
fn map_log(project: &str, row: &Value) -> LogEntry {
    let timestamp = row["timestamp"]
        .as_i64()
        .and_then(|us| Utc.timestamp_micros(us).single())
        .unwrap_or_else(Utc::now);
    let message = str_field(row, "event_message");
    let level = if message.to_lowercase().contains("error") { "error" } else { "info" };
    LogEntry {
        timestamp,
        level: level.to_string(),
        message,
        source: Some(project.to_string()),
    }
}

fn map_project(project: &Value) -> Resource {
    let id = str_field(project, "id");
    let mut resource = Resource::new(id.clone(), str_field(project, "name"), "project")
        .with_url(format!("https://supabase.com/dashboard/project/{}", id))
        .with_updated_at(parse_time(&project["created_at"]));
    let status = str_field(project, "status");
    if !status.is_empty() {
        resource = resource.with_status(status.to_lowercase());
    }
    resource
}
