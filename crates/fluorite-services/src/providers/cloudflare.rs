//! Cloudflare adapter: Workers scripts and R2 buckets

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, FluoriteError, Resource, Result, ServiceConfig,
    ServiceData, ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{parse_time, str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::http::ProviderApi;
use crate::probe::CommandRunner;

const NAME: &str = "cloudflare";
const API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const ANALYTICS_WINDOW_HOURS: i64 = 24;

const WORKER_ANALYTICS_QUERY: &str = "query($account: String!, $script: String!, $since: Time!) {
  viewer {
    accounts(filter: {accountTag: $account}) {
      workersInvocationsAdaptive(limit: 1000, filter: {scriptName: $script, datetime_geq: $since}) {
        sum { requests errors subrequests }
      }
    }
  }
}";

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "Cloudflare", "Workers, R2 storage and edge network")
        .with_capabilities(&[
            Capability::ResourceManagement,
            Capability::MultiProject,
            Capability::FileOperations,
            Capability::Analytics,
        ])
        .with_auth_methods(&[AuthMethod::Token, AuthMethod::Cli])
        .with_property("accountId", "string", "Account that owns workers and buckets", None)
        .with_property("timeout", "number", "Request timeout in milliseconds", Some(json!(10000)))
}

pub struct CloudflareAdapter {
    base: AdapterBase,
    api: ProviderApi,
}

impl CloudflareAdapter {
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

    async fn account(&self) -> Result<String> {
        self.base
            .setting(self.base.config().account_id.as_ref(), "accountId")
            .await
    }

    async fn fetch_workers(&self, token: &str, account: &str) -> Result<Vec<Resource>> {
        let path = format!("/accounts/{}/workers/scripts", account);
        let body = self.api.get_json(&path, token, &[]).await?;
        let result = unwrap_envelope(body)?;
        Ok(result
            .as_array()
            .map(|scripts| scripts.iter().map(map_worker).collect())
            .unwrap_or_default())
    }

    async fn fetch_buckets(&self, token: &str, account: &str) -> Result<Vec<Resource>> {
        let path = format!("/accounts/{}/r2/buckets", account);
        let body = self.api.get_json(&path, token, &[]).await?;
        let result = unwrap_envelope(body)?;
        Ok(bucket_list(&result).iter().map(map_bucket).collect())
    }

    async fn collect(&self) -> Result<ServiceData> {
        let token = self.base.require_token().await?;
        let account = self.account().await?;

        let (workers, buckets) = tokio::join!(
            self.fetch_workers(&token, &account),
            self.fetch_buckets(&token, &account)
        );
        let workers = workers?;

        let mut data = ServiceData::new(NAME)
            .authenticated(true)
            .with_metric("workers", workers.len() as f64)
            .with_resources(workers)
            .with_details(json!({ "accountId": account }));

        match buckets {
            Ok(buckets) => {
                data = data
                    .with_metric("buckets", buckets.len() as f64)
                    .with_resources(buckets);
            }
            Err(e) => {
                // R2 is often not enabled on an account
                warn!("Cloudflare R2 unavailable: {}", e);
                data = data.with_error(format!("r2: {}", e));
            }
        }

        Ok(data)
    }
}

#[async_trait]
impl ServiceAdapter for CloudflareAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.has_token().await || self.base.runner().is_installed("wrangler").await
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

    /// Request totals for one Worker script over the last day
    async fn get_analytics(&self, resource: &str) -> Result<Value> {
        let token = self.base.require_token().await?;
        let account = self.account().await?;
        let since = Utc::now() - Duration::hours(ANALYTICS_WINDOW_HOURS);
        let body = json!({
            "query": WORKER_ANALYTICS_QUERY,
            "variables": {
                "account": account,
                "script": resource,
                "since": since.to_rfc3339(),
            }
        });

        let response = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.api.post_json("/graphql", &token, &body),
        )
        .await?;
        worker_usage(resource, &response)
    }

    async fn list_buckets(&self) -> Result<Vec<Resource>> {
        let token = self.base.require_token().await?;
        let account = self.account().await?;
        within_timeout(
            NAME,
            self.base.config().timeout(),
            self.fetch_buckets(&token, &account),
        )
        .await
    }

    async fn create_bucket(&self, name: &str) -> Result<Resource> {
        let token = self.base.require_token().await?;
        let account = self.account().await?;
        debug!("Creating R2 bucket {} in {}", name, account);

        let path = format!("/accounts/{}/r2/buckets", account);
        let body = within_timeout(
            NAME,
            self.base.config().timeout(),
            self.api.post_json(&path, &token, &json!({ "name": name })),
        )
        .await?;
        let result = unwrap_envelope(body)?;

        if result.is_object() {
            Ok(map_bucket(&result))
        } else {
            Ok(Resource::new(name, name, "bucket"))
        }
    }
}

/// Unwrap the `{success, errors, result}` envelope every v4 endpoint returns
fn unwrap_envelope(body: Value) -> Result<Value> {
    if body["success"].as_bool() == Some(false) {
        let message = body["errors"]
            .as_array()
            .and_then(|errors| errors.first())
            .map(|e| str_field(e, "message"))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "request failed".to_string());
        return Err(FluoriteError::provider(NAME, message));
    }
    match body {
        Value::Object(mut map) => Ok(map.remove("result").unwrap_or(Value::Null)),
        other => Ok(other),
    }
}

/// R2 returns `{buckets: [...]}` inside `result`; older responses return a bare list
fn bucket_list(result: &Value) -> Vec<Value> {
    result["buckets"]
        .as_array()
        .or_else(|| result.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Sum invocation groups from a GraphQL analytics response
fn worker_usage(script: &str, response: &Value) -> Result<Value> {
    if let Some(error) = response["errors"].as_array().and_then(|e| e.first()) {
        return Err(FluoriteError::provider(NAME, str_field(error, "message")));
    }

    let groups = response["data"]["viewer"]["accounts"][0]["workersInvocationsAdaptive"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let total = |field: &str| -> u64 {
        groups
            .iter()
            .filter_map(|g| g["sum"][field].as_u64())
            .sum()
    };

    Ok(json!({
        "resource": script,
        "windowHours": ANALYTICS_WINDOW_HOURS,
        "requests": total("requests"),
        "errors": total("errors"),
        "subrequests": total("subrequests"),
    }))
}

fn map_worker(script: &Value) -> Resource {
    let id = str_field(script, "id");
    Resource::new(id.clone(), id, "worker")
        .with_updated_at(parse_time(&script["modified_on"]))
}

fn map_bucket(bucket: &Value) -> Resource {
    let name = str_field(bucket, "name");
    let mut resource = Resource::new(name.clone(), name, "bucket")
        .with_updated_at(parse_time(&bucket["creation_date"]));
    let location = str_field(bucket, "location");
    if !location.is_empty() {
        resource = resource.with_status(location.to_lowercase());
    }
    resource
}
