//! Test doubles for code that consumes [`ServiceAdapter`]
//!
//! Used by this crate's tests and by the orchestrator and IPC crates, which
//! need adapters that never touch the network.

use async_trait::async_trait;
use fluorite_core::{
    AuthConfig, AuthMethod, Capability, FluoriteError, Resource, Result, ServiceConfig,
    ServiceData, ServiceInfo,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{require_capability, within_timeout, ServiceAdapter};
use crate::registry::ServiceRegistry;

#[derive(Debug, Clone)]
enum Behavior {
    Healthy { resources: usize },
    Failing { message: String },
    Slow { delay: Duration, resources: usize },
}

/// Scripted adapter with a shared call counter
#[derive(Debug, Clone)]
pub struct MockAdapter {
    info: ServiceInfo,
    config: ServiceConfig,
    behavior: Behavior,
    soft_errors: Vec<String>,
    calls: Arc<AtomicUsize>,
    authenticated: Arc<AtomicBool>,
}

/// Descriptor for a mock provider with no capabilities
pub fn mock_info(name: &str) -> ServiceInfo {
    ServiceInfo::new(name, name, format!("Mock {} service", name))
        .with_auth_methods(&[AuthMethod::Token])
}

impl MockAdapter {
    fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            info: mock_info(name),
            config: ServiceConfig::new(),
            behavior,
            soft_errors: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            authenticated: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Succeeds with `resources` resources
    pub fn healthy(name: &str, resources: usize) -> Self {
        Self::new(name, Behavior::Healthy { resources })
    }

    /// Fails every fetch with a provider error
    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(
            name,
            Behavior::Failing {
                message: message.to_string(),
            },
        )
    }

    /// Sleeps for `delay` before answering; subject to the config timeout
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self::new(name, Behavior::Slow { delay, resources: 1 })
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.info = self.info.with_capabilities(capabilities);
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Report a problem inside an otherwise successful snapshot
    pub fn with_soft_error(mut self, error: &str) -> Self {
        self.soft_errors.push(error.to_string());
        self
    }

    pub fn unauthenticated(self) -> Self {
        self.authenticated.store(false, Ordering::SeqCst);
        self
    }

    /// Number of `get_dashboard_data` calls across all clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self, resources: usize) -> ServiceData {
        let name = &self.info.name;
        let items = (0..resources).map(|i| {
            Resource::new(format!("{}-{}", name, i), format!("{} #{}", name, i), "mock")
                .with_status("ok")
        });
        let mut data = ServiceData::new(name.clone())
            .authenticated(self.authenticated.load(Ordering::SeqCst))
            .with_metric("resources", resources as f64)
            .with_resources(items);
        for error in &self.soft_errors {
            data = data.with_error(error.clone());
        }
        data
    }

    async fn fetch(&self) -> Result<ServiceData> {
        match &self.behavior {
            Behavior::Healthy { resources } => Ok(self.snapshot(*resources)),
            Behavior::Failing { message } => Err(FluoriteError::provider(&self.info.name, message)),
            Behavior::Slow { delay, resources } => {
                tokio::time::sleep(*delay).await;
                Ok(self.snapshot(*resources))
            }
        }
    }
}

#[async_trait]
impl ServiceAdapter for MockAdapter {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn is_available(&self) -> bool {
        !matches!(self.behavior, Behavior::Failing { .. })
    }

    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn authenticate(&self, auth: AuthConfig) -> Result<bool> {
        let ok = auth.token.is_some();
        self.authenticated.store(ok, Ordering::SeqCst);
        Ok(ok)
    }

    async fn get_dashboard_data(&self) -> Result<ServiceData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        within_timeout(&self.info.name, self.config.timeout(), self.fetch()).await
    }

    async fn get_analytics(&self, resource: &str) -> Result<Value> {
        require_capability(self, Capability::Analytics)?;
        Ok(json!({ "resource": resource, "views": 0 }))
    }
}

/// Registry whose constructors clone the given templates with the requested config
pub fn mock_registry(templates: Vec<MockAdapter>) -> ServiceRegistry {
    templates.into_iter().fold(ServiceRegistry::new(), |registry, template| {
        let info = template.info.clone();
        registry.with(info, move |config| {
            Ok(Arc::new(template.clone().with_config(config)) as Arc<dyn ServiceAdapter>)
        })
    })
}
