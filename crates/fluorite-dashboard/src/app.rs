//! Application state
//!
//! `App` keeps the last snapshot it saw, the tab and the selected service.
//! Snapshots arrive through the orchestrator's watch channel.

use fluorite_core::{DashboardSnapshot, ServiceEntry};
use fluorite_orchestrator::DashboardOrchestrator;
use tokio::sync::watch;
use tracing::warn;

/// Tabs, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabSelection {
    /// Roll-up plus one row per service
    Overview,
    /// Resources and errors of the selected service
    Detail,
}

impl TabSelection {
    pub const ALL: [TabSelection; 2] = [Self::Overview, Self::Detail];

    pub fn title(self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Detail => "Detail",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Overview => 0,
            Self::Detail => 1,
        }
    }
}

pub struct App {
    orchestrator: DashboardOrchestrator,
    updates: watch::Receiver<Option<DashboardSnapshot>>,
    /// Last snapshot seen; `None` until the first refresh lands
    pub snapshot: Option<DashboardSnapshot>,
    /// Failure of the last manual refresh
    pub last_error: Option<String>,
    pub selected_tab: TabSelection,
    /// Index into the snapshot's (sorted) service names
    pub selected: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(orchestrator: DashboardOrchestrator) -> Self {
        let updates = orchestrator.subscribe();
        let snapshot = orchestrator.latest_snapshot();
        Self {
            orchestrator,
            updates,
            snapshot,
            last_error: None,
            selected_tab: TabSelection::Overview,
            selected: 0,
            should_quit: false,
        }
    }

    /// Take the newest published snapshot, if any arrived since the last call
    pub fn pull_updates(&mut self) -> bool {
        if !self.updates.has_changed().unwrap_or(false) {
            return false;
        }
        let latest = self.updates.borrow_and_update().clone();
        if let Some(snapshot) = latest {
            self.apply(snapshot);
            return true;
        }
        false
    }

    /// Ask the orchestrator for a fresh snapshot now
    pub async fn refresh(&mut self) {
        match self.orchestrator.refresh().await {
            Ok(snapshot) => {
                // Already applied here; skip it on the next pull
                self.updates.borrow_and_update();
                self.apply(snapshot);
            }
            Err(e) => {
                warn!("Dashboard refresh failed: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn apply(&mut self, snapshot: DashboardSnapshot) {
        self.last_error = None;
        let count = snapshot.services.len();
        self.snapshot = Some(snapshot);
        if count == 0 {
            self.selected = 0;
        } else if self.selected >= count {
            self.selected = count - 1;
        }
    }

    pub fn service_count(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.services.len())
    }

    pub fn selected_service(&self) -> Option<(&str, &ServiceEntry)> {
        self.snapshot
            .as_ref()?
            .services
            .iter()
            .nth(self.selected)
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn select_next(&mut self) {
        let count = self.service_count();
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn select_prev(&mut self) {
        let count = self.service_count();
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn next_tab(&mut self) {
        self.selected_tab = match self.selected_tab {
            TabSelection::Overview => TabSelection::Detail,
            TabSelection::Detail => TabSelection::Overview,
        };
    }

    pub fn prev_tab(&mut self) {
        // Two tabs: backwards and forwards coincide
        self.next_tab();
    }

    pub fn current_tab_name(&self) -> &str {
        self.selected_tab.title()
    }
}
