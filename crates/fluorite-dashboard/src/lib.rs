//! # fluorite-dashboard
//!
//! Terminal dashboard over the snapshots a
//! [`DashboardOrchestrator`](fluorite_orchestrator::DashboardOrchestrator)
//! publishes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  FLUORITE DASHBOARD  degraded  12:04:31      [q]uit [r]efresh│
//! ├──────────────────────────────────────────────────────────────┤
//! │  Overview │ Detail                                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  SUMMARY   Services: 3   Resources: 14   Errors: 1           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  SERVICES                                                    │
//! │  │ Service  │ Status │ Resources │ Errors │ Fetched  │       │
//! │  ▶ vercel     ok         9           0       12:04:30        │
//! │    supabase   error      -           1       -               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The orchestrator's refresh loop drives periodic updates; the app only
//! picks up whatever was published last. `r` forces a refresh.

mod app;
mod event;
mod run;
mod terminal;
mod ui;
mod widgets;

pub use app::{App, TabSelection};
pub use event::{action_for, Action};
pub use run::run;
