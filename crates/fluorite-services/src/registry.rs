//! Static table of provider descriptors and constructors

use fluorite_core::{Result, ServiceConfig, ServiceInfo};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::ServiceAdapter;
use crate::providers::{
    AwsAdapter, CloudflareAdapter, GitHubAdapter, SupabaseAdapter, TursoAdapter, VercelAdapter,
};

/// Builds an adapter from its configuration
pub type AdapterConstructor =
    Arc<dyn Fn(ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> + Send + Sync>;

fn constructor<F>(f: F) -> AdapterConstructor
where
    F: Fn(ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A provider the factory knows how to build
#[derive(Clone)]
pub struct RegistryEntry {
    pub info: ServiceInfo,
    pub constructor: AdapterConstructor,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("info", &self.info.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed provider table; iteration order is alphabetical
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ServiceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for info in crate::providers::builtin_infos() {
            let build = match info.name.as_str() {
                "vercel" => constructor(VercelAdapter::create),
                "cloudflare" => constructor(CloudflareAdapter::create),
                "supabase" => constructor(SupabaseAdapter::create),
                "turso" => constructor(TursoAdapter::create),
                "aws" => constructor(AwsAdapter::create),
                "github" => constructor(GitHubAdapter::create),
                _ => continue,
            };
            registry.register(info, build);
        }
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, info: ServiceInfo, constructor: AdapterConstructor) {
        self.entries
            .insert(info.name.clone(), RegistryEntry { info, constructor });
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(mut self, info: ServiceInfo, constructor: F) -> Self
    where
        F: Fn(ServiceConfig) -> Result<Arc<dyn ServiceAdapter>> + Send + Sync + 'static,
    {
        self.register(info, Arc::new(constructor));
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn infos(&self) -> Vec<ServiceInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_info, MockAdapter};

    #[test]
    fn test_builtin_registry() {
        let registry = ServiceRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["aws", "cloudflare", "github", "supabase", "turso", "vercel"]
        );
        assert!(registry.contains("turso"));
        assert!(!registry.contains("heroku"));
    }

    #[test]
    fn test_builtin_constructors_match_names() {
        let registry = ServiceRegistry::builtin();
        for name in registry.names() {
            let entry = registry.get(&name).unwrap();
            let adapter = (entry.constructor)(ServiceConfig::new()).unwrap();
            assert_eq!(adapter.name(), name);
        }
    }

    #[test]
    fn test_register_replaces() {
        let registry = ServiceRegistry::new()
            .with(mock_info("alpha"), |_| Ok(Arc::new(MockAdapter::healthy("alpha", 1))))
            .with(mock_info("alpha"), |_| Ok(Arc::new(MockAdapter::healthy("alpha", 3))));
        assert_eq!(registry.len(), 1);
    }
}
