//! IPC error types and JSON-RPC error codes

use serde_json::Value;
use thiserror::Error;

use crate::protocol::RpcError;

/// Invalid JSON was received
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error, including handler panics
pub const INTERNAL_ERROR: i32 = -32603;
/// The connection has not completed `auth.login`
pub const UNAUTHORIZED: i32 = -32001;
/// An adapter or orchestrator operation failed; `data.kind` has the cause
pub const SERVICE_ERROR: i32 = -32002;

/// Errors seen by IPC server and client callers
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not connected")]
    NotConnected,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl IpcError {
    /// JSON-RPC error code, if the server answered with one
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RpcError> for IpcError {
    fn from(error: RpcError) -> Self {
        Self::Rpc {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

pub type Result<T> = std::result::Result<T, IpcError>;
