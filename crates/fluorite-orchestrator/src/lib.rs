//! # fluorite-orchestrator
//!
//! The Dashboard Orchestrator: owns the set of services a dashboard shows,
//! fans out to their adapters concurrently and folds the results into a
//! [`DashboardSnapshot`](fluorite_core::DashboardSnapshot).
//!
//! A failing or slow provider only ever produces an error entry in the
//! snapshot. It never fails the aggregate call.

mod orchestrator;
mod state;

pub use orchestrator::DashboardOrchestrator;
pub use state::{transition, Lifecycle, OrchestratorState};
