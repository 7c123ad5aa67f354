//! Service Factory
//!
//! Builds adapters from the registry and caches them by `(type, config)`.
//! Construction runs while the cache lock is held, so concurrent requests for
//! the same key always observe a single live instance.

use fluorite_core::{Capability, FluoriteError, Result, ServiceConfig, ServiceInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::adapter::ServiceAdapter;
use crate::registry::ServiceRegistry;

type AdapterCache = HashMap<String, Arc<dyn ServiceAdapter>>;

pub struct ServiceFactory {
    registry: ServiceRegistry,
    cache: Mutex<AdapterCache>,
}

impl Default for ServiceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceFactory {
    /// Factory over the built-in providers
    pub fn new() -> Self {
        Self::with_registry(ServiceRegistry::builtin())
    }

    pub fn with_registry(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    // A panic inside a constructor poisons the lock; the map itself is still
    // consistent because inserts happen after construction succeeds.
    fn cache(&self) -> MutexGuard<'_, AdapterCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached adapter for `(service_type, config)` or build one.
    ///
    /// Unknown types fail before any construction. Configs with
    /// `unique_instance` always get a fresh, uncached adapter.
    pub fn create_service(
        &self,
        service_type: &str,
        config: Option<ServiceConfig>,
    ) -> Result<Arc<dyn ServiceAdapter>> {
        let entry = self
            .registry
            .get(service_type)
            .ok_or_else(|| FluoriteError::UnsupportedServiceType(service_type.to_string()))?;
        let config = config.unwrap_or_default();

        let build = |config: ServiceConfig| {
            (entry.constructor)(config).map_err(|e| FluoriteError::ServiceAdapterCreationFailed {
                service: service_type.to_string(),
                source: Box::new(e),
            })
        };

        if config.unique_instance {
            debug!("Building unique {} adapter", service_type);
            return build(config);
        }

        let key = config.cache_key(service_type);
        let mut cache = self.cache();
        if let Some(adapter) = cache.get(&key) {
            debug!("Reusing cached {} adapter", service_type);
            return Ok(Arc::clone(adapter));
        }

        let adapter = build(config)?;
        cache.insert(key, Arc::clone(&adapter));
        info!("Created {} adapter ({} cached)", service_type, cache.len());
        Ok(adapter)
    }

    /// Registered provider names, sorted
    pub fn supported_services(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn is_supported(&self, service_type: &str) -> bool {
        self.registry.contains(service_type)
    }

    pub fn service_info(&self, service_type: &str) -> Option<ServiceInfo> {
        self.registry.get(service_type).map(|e| e.info.clone())
    }

    pub fn all_service_info(&self) -> Vec<ServiceInfo> {
        self.registry.infos()
    }

    pub fn service_capabilities(&self, service_type: &str) -> Option<Vec<Capability>> {
        self.registry
            .get(service_type)
            .map(|e| e.info.capabilities.enabled())
    }

    /// Providers that advertise `capability`
    pub fn services_by_capability(&self, capability: Capability) -> Vec<String> {
        self.registry
            .infos()
            .into_iter()
            .filter(|info| info.capabilities.has(capability))
            .map(|info| info.name)
            .collect()
    }

    /// Drop every cached adapter; existing holders keep theirs
    pub fn clear_cache(&self) {
        let mut cache = self.cache();
        debug!("Clearing {} cached adapters", cache.len());
        cache.clear();
    }

    /// Evict one cached adapter; returns whether it was present
    pub fn remove_cached_instance(&self, service_type: &str, config: Option<&ServiceConfig>) -> bool {
        let key = match config {
            Some(config) => config.cache_key(service_type),
            None => ServiceConfig::default().cache_key(service_type),
        };
        self.cache().remove(&key).is_some()
    }

    pub fn cached_instance_count(&self) -> usize {
        self.cache().len()
    }
}
