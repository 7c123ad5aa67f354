//! # fluorite-ipc
//!
//! JSON-RPC 2.0 over newline-delimited JSON, on TCP or a Unix domain socket.
//!
//! - [`IpcServer`] accepts connections, gates them behind an optional token
//!   and dispatches to a [`MethodRegistry`]
//! - [`IpcClient`] correlates responses by id, streams chunks and reconnects
//! - [`dashboard_methods`] binds a [`DashboardOrchestrator`] to the wire
//!
//! [`DashboardOrchestrator`]: fluorite_orchestrator::DashboardOrchestrator

pub mod client;
pub mod error;
pub mod framing;
pub mod methods;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ClientConfig, ClientEvent, IpcClient};
pub use error::{IpcError, Result};
pub use framing::{Frame, LineBuffer};
pub use methods::{dashboard_methods, register_dashboard_methods};
pub use protocol::{RpcError, RpcId, RpcNotification, RpcRequest, RpcResponse};
pub use server::{CallContext, HandlerResult, IpcServer, MethodRegistry, ServerConfig, ServerEvent};
pub use transport::Endpoint;
