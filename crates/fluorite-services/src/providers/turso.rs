//! Turso adapter (Platform API)

use async_trait::async_trait;
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, Resource, Result, ServiceConfig, ServiceData, ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use super::{str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::http::ProviderApi;
use crate::probe::CommandRunner;

const NAME: &str = "turso";
const API_BASE_URL: &str = "https://api.turso.tech";

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "Turso", "Edge SQLite databases")
        .with_capabilities(&[
            Capability::ResourceManagement,
            Capability::MultiProject,
            Capability::Analytics,
            Capability::Database,
        ])
        .with_auth_methods(&[AuthMethod::Token, AuthMethod::Cli])
        .with_property("organization", "string", "Organization slug", None)
        .with_property("timeout", "number", "Request timeout in milliseconds", Some(json!(10000)))
}

pub struct TursoAdapter {
    base: AdapterBase,
    api: ProviderApi,
}

impl TursoAdapter {
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

    async fn organization(&self) -> Result<String> {
        self.base
            .setting(self.base.config().organization.as_ref(), "organization")
            .await
    }

    async fn fetch_databases(&self, token: &str, org: &str) -> Result<Vec<Resource>> {
        let path = format!("/v1/organizations/{}/databases", org);
        let body = self.api.get_json(&path, token, &[]).await?;
        Ok(body["databases"]
            .as_array()
            .map(|dbs| dbs.iter().map(map_database).collect())
            .unwrap_or_default())
    }

    async fn collect(&self) -> Result<ServiceData> {
        let token = self.base.require_token().await?;
        let org = self.organization().await?;
        let databases = self.fetch_databases(&token, &org).await?;

        let mut regions: Vec<String> = databases.iter().filter_map(|d| d.status.clone()).collect();
        regions.sort();
        regions.dedup();

        Ok(ServiceData::new(NAME)
            .authenticated(true)
            .with_metric("databases", databases.len() as f64)
            .with_metric("regions", regions.len() as f64)
            .with_details(json!({ "organization": org, "regions": regions }))
            .with_resources(databases))
    }
}

#[async_trait]
impl ServiceAdapter for TursoAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.has_token().await || self.base.runner().is_installed("turso").await
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
        let org = self.organization().await?;
        within_timeout(
            NAME,
            self.base.config().timeout(),
            self.fetch_databases(&token, &org),
        )
        .await
    }

    async fn get_analytics(&self, resource: &str) -> Result<Value> {
        let token = self.base.require_token().await?;
        let org = self.organization().await?;
        let path = format!("/v1/organizations/{}/databases/{}/usage", org, resource);
        let body = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.api.get_json(&path, &token, &[]),
        )
        .await?;
        Ok(usage_summary(resource, &body))
    }
}

/// Databases are keyed by `DbId` and carry their primary region as status
fn map_database(db: &Value) -> Resource {
    let mut resource = Resource::new(str_field(db, "DbId"), str_field(db, "Name"), "database");
    let hostname = str_field(db, "Hostname");
    if !hostname.is_empty() {
        resource = resource.with_url(format!("libsql://{}", hostname));
    }
    let region = str_field(db, "primaryRegion");
    if !region.is_empty() {
        resource = resource.with_status(region);
    }
    resource
}

fn usage_summary(database: &str, body: &Value) -> Value {
    let usage = &body["database"]["usage"];
    json!({
        "resource": database,
        "rowsRead": usage["rows_read"].as_u64().unwrap_or(0),
        "rowsWritten": usage["rows_written"].as_u64().unwrap_or(0),
        "storageBytes": usage["storage_bytes"].as_u64().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_database() {
        let db = json!({
            "Name": "orders",
            "DbId": "db-123",
            "Hostname": "orders-acme.turso.io",
            "primaryRegion": "ams"
        });
        let resource = map_database(&db);
        assert_eq!(resource.id, "db-123");
        assert_eq!(resource.name, "orders");
        assert_eq!(resource.url.as_deref(), Some("libsql://orders-acme.turso.io"));
        assert_eq!(resource.status.as_deref(), Some("ams"));
    }

    #[test]
    fn test_usage_summary_defaults_to_zero() {
        let body = json!({"database": {"usage": {"rows_read": 120}}});
        let summary = usage_summary("orders", &body);
        assert_eq!(summary["resource"], "orders");
        assert_eq!(summary["rowsRead"], 120);
        assert_eq!(summary["rowsWritten"], 0);
    }

    #[tokio::test]
    async fn test_organization_sources() {
        let adapter = TursoAdapter::new(ServiceConfig::new()).unwrap();
        adapter
            .authenticate(AuthConfig::with_token("t").with_field("organization", "acme"))
            .await
            .unwrap();
        assert_eq!(adapter.organization().await.unwrap(), "acme");

        let bare = TursoAdapter::new(ServiceConfig::new()).unwrap();
        bare.authenticate(AuthConfig::with_token("t")).await.unwrap();
        assert!(bare.list_databases().await.unwrap_err().is_config_error());
    }
}
