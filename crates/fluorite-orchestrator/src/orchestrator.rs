//! Dashboard orchestrator implementation

use fluorite_core::fail_open::fail_open;
use fluorite_core::{
    AuthConfig, DashboardConfig, DashboardSnapshot, FluoriteError, Result, ServiceConfig,
    ServiceData, ServiceEntry,
};
use fluorite_services::{ServiceAdapter, ServiceFactory};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::{transition, Lifecycle, OrchestratorState};

type ServiceMap = BTreeMap<String, Arc<dyn ServiceAdapter>>;

/// State plus the background task it owns
#[derive(Default)]
struct LifecycleSlot {
    state: OrchestratorState,
    refresh_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: DashboardConfig,
    factory: Arc<ServiceFactory>,
    lifecycle: Mutex<LifecycleSlot>,
    services: RwLock<ServiceMap>,
    snapshots: watch::Sender<Option<DashboardSnapshot>>,
}

/// Owns the registered services and aggregates their data.
///
/// Cheap to clone; clones share the same services and lifecycle.
#[derive(Clone)]
pub struct DashboardOrchestrator {
    inner: Arc<Inner>,
}

impl DashboardOrchestrator {
    pub fn new(config: DashboardConfig, factory: Arc<ServiceFactory>) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                lifecycle: Mutex::new(LifecycleSlot::default()),
                services: RwLock::new(BTreeMap::new()),
                snapshots,
            }),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &Arc<ServiceFactory> {
        &self.inner.factory
    }

    pub fn state(&self) -> OrchestratorState {
        self.lifecycle().state
    }

    fn lifecycle(&self) -> MutexGuard<'_, LifecycleSlot> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `Ready`, bring up `autoInitServices` and start the refresh loop.
    ///
    /// A service that fails to come up is logged and skipped.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut slot = self.lifecycle();
            slot.state = transition(slot.state, Lifecycle::Initialize)?;
        }
        info!(
            "Initializing dashboard orchestrator ({} auto-init services)",
            self.inner.config.auto_init_services.len()
        );

        for name in &self.inner.config.auto_init_services {
            let config = self.inner.config.service_config(name);
            let label = format!("auto-init {}", name);
            fail_open(&label, || self.register(name, config, None)).await;
        }

        if let Some(period) = self.inner.config.refresh_period() {
            self.start_refresh(period);
        }
        Ok(())
    }

    /// Create (or reuse) an adapter through the factory and register it under `name`.
    ///
    /// `config` falls back to the dashboard's per-service settings. Explicit
    /// `auth` replaces environment credentials.
    pub async fn add_service(
        &self,
        name: &str,
        config: Option<ServiceConfig>,
        auth: Option<AuthConfig>,
    ) -> Result<Arc<dyn ServiceAdapter>> {
        self.state().ensure_ready()?;
        let config = config.unwrap_or_else(|| self.inner.config.service_config(name));
        self.register(name, config, auth).await
    }

    async fn register(
        &self,
        name: &str,
        config: ServiceConfig,
        auth: Option<AuthConfig>,
    ) -> Result<Arc<dyn ServiceAdapter>> {
        let adapter = self.inner.factory.create_service(name, Some(config))?;
        if let Some(auth) = auth {
            if !adapter.authenticate(auth).await? {
                warn!("{} registered without usable credentials", name);
            }
        }

        self.inner
            .services
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&adapter));
        info!("Registered service {}", name);
        Ok(adapter)
    }

    /// Forget a service; the factory keeps its cached adapter
    pub async fn remove_service(&self, name: &str) -> bool {
        let removed = self.inner.services.write().await.remove(name).is_some();
        if removed {
            info!("Removed service {}", name);
        }
        removed
    }

    pub async fn registered_services(&self) -> Vec<String> {
        self.inner.services.read().await.keys().cloned().collect()
    }

    /// Registered adapter, if any
    pub async fn service(&self, name: &str) -> Option<Arc<dyn ServiceAdapter>> {
        self.inner.services.read().await.get(name).cloned()
    }

    /// Data for a single registered service
    pub async fn service_dashboard_data(&self, name: &str) -> Result<ServiceData> {
        self.state().ensure_ready()?;
        let adapter = self
            .service(name)
            .await
            .ok_or_else(|| FluoriteError::ServiceNotRegistered(name.to_string()))?;
        adapter.get_dashboard_data().await
    }

    /// Fetch every registered service concurrently.
    ///
    /// Per-service failures become error entries; once initialized this never fails.
    pub async fn multi_service_dashboard_data(&self) -> Result<DashboardSnapshot> {
        self.state().ensure_ready()?;

        // Clone the adapters out so no lock is held while providers respond
        let services: Vec<(String, Arc<dyn ServiceAdapter>)> = self
            .inner
            .services
            .read()
            .await
            .iter()
            .map(|(name, adapter)| (name.clone(), Arc::clone(adapter)))
            .collect();

        let fetches = services.into_iter().map(|(name, adapter)| async move {
            let entry = match adapter.get_dashboard_data().await {
                Ok(data) => ServiceEntry::Data(data),
                Err(e) => {
                    warn!("{} dashboard data unavailable: {}", name, e);
                    ServiceEntry::failed(e.to_string(), Some(e.kind()))
                }
            };
            (name, entry)
        });

        let entries: BTreeMap<String, ServiceEntry> = join_all(fetches).await.into_iter().collect();
        let snapshot = DashboardSnapshot::from_entries(entries);
        debug!(
            "Snapshot: {} services, {} resources, {} errors ({})",
            snapshot.services.len(),
            snapshot.aggregated.total_resources,
            snapshot.aggregated.total_errors,
            snapshot.aggregated.overall_health
        );
        Ok(snapshot)
    }

    /// Compute a snapshot and publish it to subscribers
    pub async fn refresh(&self) -> Result<DashboardSnapshot> {
        let snapshot = self.multi_service_dashboard_data().await?;
        self.inner.snapshots.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardSnapshot>> {
        self.inner.snapshots.subscribe()
    }

    /// Most recently published snapshot
    pub fn latest_snapshot(&self) -> Option<DashboardSnapshot> {
        self.inner.snapshots.borrow().clone()
    }

    fn start_refresh(&self, period: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let orchestrator = DashboardOrchestrator { inner };
                if let Err(e) = orchestrator.refresh().await {
                    debug!("Refresh loop exiting: {}", e);
                    break;
                }
            }
        });

        let mut slot = self.lifecycle();
        if slot.state == OrchestratorState::Ready {
            info!("Refreshing every {}ms", period.as_millis());
            slot.refresh_task = Some(handle);
        } else {
            // Shut down while auto-init services were coming up
            handle.abort();
        }
    }

    /// Stop the refresh loop and move to `Stopped`.
    ///
    /// Adapters stay in the factory cache.
    pub fn shutdown(&self) {
        let task = {
            let mut slot = self.lifecycle();
            if slot.state == OrchestratorState::Stopped {
                return;
            }
            // Shutdown is valid from every state
            slot.state = transition(slot.state, Lifecycle::Shutdown).unwrap_or(OrchestratorState::Stopped);
            slot.refresh_task.take()
        };

        if let Some(task) = task {
            task.abort();
        }
        info!("Dashboard orchestrator stopped");
    }
}
