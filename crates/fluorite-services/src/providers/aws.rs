//! AWS adapter
//!
//! Reads S3 state through the `aws` CLI rather than signing requests itself.
//! Credentials resolved from the environment (or installed via `authenticate`)
//! are forwarded to the child process; without them the CLI falls back to its
//! own profile chain.

use async_trait::async_trait;
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, FluoriteError, Resource, Result, ServiceConfig,
    ServiceData, ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{parse_time, str_field, AdapterBase};
use crate::adapter::{within_timeout, ServiceAdapter};
use crate::probe::{CommandOutput, CommandRunner};

const NAME: &str = "aws";
const CLI: &str = "aws";
const DEFAULT_REGION: &str = "us-east-1";

/// Credential fields and the variables the CLI expects them in
const FORWARDED_FIELDS: &[(&str, &str)] = &[
    ("secretAccessKey", "AWS_SECRET_ACCESS_KEY"),
    ("sessionToken", "AWS_SESSION_TOKEN"),
    ("profile", "AWS_PROFILE"),
];

pub(crate) fn info() -> ServiceInfo {
    ServiceInfo::new(NAME, "AWS", "S3 storage and account resources via the AWS CLI")
        .with_capabilities(&[Capability::ResourceManagement, Capability::FileOperations])
        .with_auth_methods(&[AuthMethod::AccessKey, AuthMethod::Cli])
        .with_property("region", "string", "Default region", Some(json!(DEFAULT_REGION)))
        .with_property("timeout", "number", "Command timeout in milliseconds", Some(json!(10000)))
}

pub struct AwsAdapter {
    base: AdapterBase,
}

impl AwsAdapter {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            base: AdapterBase::new(info(), config),
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.base = self.base.with_runner(runner);
        self
    }

    pub fn create(config: ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> {
        Ok(Arc::new(Self::new(config)?))
    }

    async fn region(&self) -> String {
        self.base
            .setting(self.base.config().region.as_ref(), "region")
            .await
            .unwrap_or_else(|_| DEFAULT_REGION.to_string())
    }

    /// Environment for the child process built from the current credentials
    async fn cli_env(&self) -> Vec<(String, String)> {
        let auth = self.base.credentials().await;
        let mut envs = Vec::new();
        if let Some(key) = auth.token {
            envs.push(("AWS_ACCESS_KEY_ID".to_string(), key));
        }
        for (field, var) in FORWARDED_FIELDS {
            if let Some(value) = auth.fields.get(*field) {
                envs.push((var.to_string(), value.clone()));
            }
        }
        envs.push(("AWS_REGION".to_string(), self.region().await));
        envs
    }

    async fn run(&self, args: &[&str]) -> Result<Value> {
        let envs = self.cli_env().await;
        let output = self.base.runner().exec(CLI, args, &envs).await?;
        parse_output(args, output)
    }

    async fn caller_identity(&self) -> Option<Value> {
        match self.run(&["sts", "get-caller-identity", "--output", "json"]).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("aws identity check failed: {}", e);
                None
            }
        }
    }

    async fn fetch_buckets(&self) -> Result<Vec<Resource>> {
        let body = self.run(&["s3api", "list-buckets", "--output", "json"]).await?;
        Ok(body["Buckets"]
            .as_array()
            .map(|buckets| buckets.iter().map(map_bucket).collect())
            .unwrap_or_default())
    }

    async fn collect(&self) -> Result<ServiceData> {
        if !self.is_authenticated().await {
            return Err(self.base.not_authenticated());
        }
        let buckets = self.fetch_buckets().await?;
        let region = self.region().await;

        Ok(ServiceData::new(NAME)
            .authenticated(true)
            .with_metric("buckets", buckets.len() as f64)
            .with_details(json!({ "region": region }))
            .with_resources(buckets))
    }
}

#[async_trait]
impl ServiceAdapter for AwsAdapter {
    fn info(&self) -> &ServiceInfo {
        self.base.info()
    }

    fn config(&self) -> &ServiceConfig {
        self.base.config()
    }

    async fn is_available(&self) -> bool {
        self.base.runner().is_installed(CLI).await
    }

    async fn is_authenticated(&self) -> bool {
        self.base.has_token().await || self.caller_identity().await.is_some()
    }

    async fn authenticate(&self, auth: AuthConfig) -> Result<bool> {
        self.base.set_credentials(auth).await;
        Ok(self.is_authenticated().await)
    }

    #[instrument(skip(self))]
    async fn get_dashboard_data(&self) -> Result<ServiceData> {
        within_timeout(NAME, self.base.config().timeout(), self.collect()).await
    }

    async fn list_buckets(&self) -> Result<Vec<Resource>> {
        within_timeout(NAME, self.base.config().timeout(), self.fetch_buckets()).await
    }

    async fn create_bucket(&self, name: &str) -> Result<Resource> {
        let region = self.region().await;
        let constraint = format!("LocationConstraint={}", region);
        let args = create_bucket_args(name, &region, &constraint);

        let body = within_timeout(NAME, self.base.config().timeout(), self.run(&args)).await?;
        let mut bucket = Resource::new(name, name, "bucket").with_status(region);
        if let Some(location) = body["Location"].as_str() {
            bucket = bucket.with_url(location.to_string());
        }
        Ok(bucket)
    }
}

/// `us-east-1` rejects an explicit location constraint
fn create_bucket_args<'a>(name: &'a str, region: &'a str, constraint: &'a str) -> Vec<&'a str> {
    let mut args = vec!["s3api", "create-bucket", "--bucket", name, "--output", "json"];
    if region != DEFAULT_REGION {
        args.extend(["--region", region, "--create-bucket-configuration", constraint]);
    }
    args
}

fn parse_output(args: &[&str], output: CommandOutput) -> Result<Value> {
    if !output.success {
        let detail = output.stderr.trim();
        return Err(FluoriteError::provider(
            NAME,
            format!("`aws {}` failed: {}", args.join(" "), detail),
        ));
    }
    if output.stdout.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&output.stdout)
        .map_err(|e| FluoriteError::provider(NAME, format!("Malformed CLI output: {}", e)))
}

fn map_bucket(bucket: &Value) -> Resource {
    let name = str_field(bucket, "Name");
    Resource::new(name.clone(), name, "bucket")
        .with_updated_at(parse_time(&bucket["CreationDate"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockRunner;

    const LIST_BUCKETS: &str = r#"{
        "Buckets": [
            {"Name": "logs", "CreationDate": "2023-05-01T10:00:00+00:00"},
            {"Name": "assets", "CreationDate": "2024-02-11T09:30:00+00:00"}
        ],
        "Owner": {"ID": "abc"}
    }"#;

    fn adapter(runner: MockRunner) -> AwsAdapter {
        AwsAdapter::new(ServiceConfig::new().with_region("eu-west-1"))
            .unwrap()
            .with_runner(Arc::new(runner))
    }

    #[tokio::test]
    async fn test_dashboard_data_from_cli() {
        let runner = MockRunner::new().with_response(
            "aws s3api list-buckets --output json",
            CommandOutput::ok(LIST_BUCKETS),
        );
        let adapter = adapter(runner);
        adapter
            .authenticate(AuthConfig::with_token("AKIA").with_field("secretAccessKey", "s"))
            .await
            .unwrap();

        let data = adapter.get_dashboard_data().await.unwrap();
        assert_eq!(data.resources.len(), 2);
        assert_eq!(data.metrics["buckets"], 2.0);
        assert_eq!(data.details["region"], "eu-west-1");
        assert!(data.resources.iter().all(|r| r.kind == "bucket"));
    }

    #[tokio::test]
    async fn test_profile_auth_via_identity() {
        let runner = MockRunner::new().with_response(
            "aws sts get-caller-identity --output json",
            CommandOutput::ok(r#"{"Account": "123456789012"}"#),
        );
        let adapter = adapter(runner);
        assert!(adapter.authenticate(AuthConfig::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let runner = MockRunner::new().with_response(
            "aws sts get-caller-identity --output json",
            CommandOutput::failed("Unable to locate credentials"),
        );
        let adapter = adapter(runner);
        assert!(!adapter.authenticate(AuthConfig::default()).await.unwrap());

        let err = adapter.get_dashboard_data().await.unwrap_err();
        assert!(matches!(err, FluoriteError::NotAuthenticated { ref env_var, .. } if env_var == "AWS_ACCESS_KEY_ID"));
    }

    #[tokio::test]
    async fn test_cli_failure_is_provider_error() {
        let runner = MockRunner::new().with_response(
            "aws s3api list-buckets --output json",
            CommandOutput::failed("AccessDenied"),
        );
        let adapter = adapter(runner);
        adapter.authenticate(AuthConfig::with_token("AKIA")).await.unwrap();

        let err = adapter.list_buckets().await.unwrap_err();
        assert_eq!(err.kind(), "provider");
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_create_bucket_outside_default_region() {
        let runner = MockRunner::new().with_response(
            "aws s3api create-bucket --bucket media --output json --region eu-west-1 \
             --create-bucket-configuration LocationConstraint=eu-west-1",
            CommandOutput::ok(r#"{"Location": "http://media.s3.amazonaws.com/"}"#),
        );
        let adapter = adapter(runner);
        adapter.authenticate(AuthConfig::with_token("AKIA")).await.unwrap();

        let bucket = adapter.create_bucket("media").await.unwrap();
        assert_eq!(bucket.name, "media");
        assert_eq!(bucket.status.as_deref(), Some("eu-west-1"));
        assert!(bucket.url.is_some());
    }

    #[test]
    fn test_default_region_has_no_constraint() {
        let args = create_bucket_args("media", DEFAULT_REGION, "unused");
        assert!(!args.contains(&"--create-bucket-configuration"));
    }
}
