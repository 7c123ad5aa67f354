//! Service Adapter Contract
//!
//! Every provider (Vercel, Cloudflare, Supabase, Turso, AWS, GitHub) sits behind
//! [`ServiceAdapter`]. The orchestrator only ever talks to this trait, so it never
//! depends on a provider's wire format.
//!
//! Optional operations are gated by [`ServiceInfo::capabilities`]. Their default
//! implementations fail with [`FluoriteError::CapabilityUnsupported`], which lets
//! callers tell "this service can't do that" apart from "the call failed".

use async_trait::async_trait;
use fluorite_core::{
    AuthConfig, Capability, FluoriteError, LogEntry, Resource, Result, ServiceConfig, ServiceData,
    ServiceInfo,
};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// The live binding between the orchestrator and one configured service
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Static descriptor for this provider
    fn info(&self) -> &ServiceInfo;

    /// Configuration this instance was built with
    fn config(&self) -> &ServiceConfig;

    /// Registry name of this provider
    fn name(&self) -> &str {
        &self.info().name
    }

    /// Whether provider tooling or credentials are reachable.
    ///
    /// Never fails; any detection problem reads as `false`.
    async fn is_available(&self) -> bool;

    /// Whether usable credentials are present
    async fn is_authenticated(&self) -> bool;

    /// Install explicit credentials instead of resolving them from the environment
    async fn authenticate(&self, auth: AuthConfig) -> Result<bool>;

    /// Provider snapshot, bounded by the configured timeout
    async fn get_dashboard_data(&self) -> Result<ServiceData>;

    /// Analytics for one resource (requires `analytics`)
    async fn get_analytics(&self, resource: &str) -> Result<Value> {
        let _ = resource;
        Err(unsupported(self.info(), Capability::Analytics))
    }

    /// Most recent deployments (requires `deployments`)
    async fn list_deployments(&self, limit: usize) -> Result<Vec<Resource>> {
        let _ = limit;
        Err(unsupported(self.info(), Capability::Deployments))
    }

    /// Recent log lines for a resource (requires `logStreaming`)
    async fn get_logs(&self, resource: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let _ = (resource, limit);
        Err(unsupported(self.info(), Capability::LogStreaming))
    }

    /// Storage buckets (requires `fileOperations`)
    async fn list_buckets(&self) -> Result<Vec<Resource>> {
        Err(unsupported(self.info(), Capability::FileOperations))
    }

    /// Create a storage bucket (requires `fileOperations`)
    async fn create_bucket(&self, name: &str) -> Result<Resource> {
        let _ = name;
        Err(unsupported(self.info(), Capability::FileOperations))
    }

    /// Databases managed by the provider (requires `database`)
    async fn list_databases(&self) -> Result<Vec<Resource>> {
        Err(unsupported(self.info(), Capability::Database))
    }
}

/// Build the error returned by an operation the service does not offer
pub fn unsupported(info: &ServiceInfo, capability: Capability) -> FluoriteError {
    FluoriteError::CapabilityUnsupported {
        service: info.name.clone(),
        capability: capability.to_string(),
    }
}

/// Check a capability flag before invoking a gated operation
pub fn require_capability(adapter: &dyn ServiceAdapter, capability: Capability) -> Result<()> {
    if adapter.info().capabilities.has(capability) {
        Ok(())
    } else {
        Err(unsupported(adapter.info(), capability))
    }
}

/// Run an adapter operation, failing with `Timeout` once `timeout` elapses
pub async fn within_timeout<T, F>(service: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(FluoriteError::Timeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
