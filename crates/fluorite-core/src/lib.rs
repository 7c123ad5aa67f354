//! # fluorite-core
//!
//! Core types for the fluorite-flake multi-service dashboard.
//!
//! Everything the adapters, the orchestrator and the IPC layer exchange is
//! defined here:
//!
//! - Static service descriptors ([`ServiceInfo`], [`Capabilities`])
//! - Per-instance configuration ([`ServiceConfig`], [`AuthConfig`])
//! - Read models ([`ServiceData`], [`DashboardSnapshot`])
//! - Orchestrator-wide settings ([`DashboardConfig`])
//! - The unified [`FluoriteError`]

mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{DashboardConfig, DisplayConfig, ProtocolConfig, TransportKind, DEFAULT_IPC_PORT};
pub use error::{FluoriteError, Result};
pub use types::*;
