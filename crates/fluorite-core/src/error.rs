//! Unified error types for fluorite

use thiserror::Error;

/// Unified error type for adapters, the service factory and the orchestrator
#[derive(Error, Debug)]
pub enum FluoriteError {
    // Configuration errors
    #[error("Unsupported service type: {0}")]
    UnsupportedServiceType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Adapter errors
    #[error("Failed to create {service} adapter: {source}")]
    ServiceAdapterCreationFailed {
        service: String,
        #[source]
        source: Box<FluoriteError>,
    },

    #[error("{service} does not support {capability}")]
    CapabilityUnsupported { service: String, capability: String },

    #[error("{service} is not authenticated: set {env_var}")]
    NotAuthenticated { service: String, env_var: String },

    #[error("{service} request failed: {message}")]
    Provider { service: String, message: String },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    // Orchestrator errors
    #[error("Orchestrator is not initialized")]
    OrchestratorNotInitialized,

    #[error("Orchestrator has been shut down")]
    OrchestratorStopped,

    #[error("Service not registered: {0}")]
    ServiceNotRegistered(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl FluoriteError {
    /// Shorthand for a provider failure
    pub fn provider(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code, carried in snapshot error entries and
    /// JSON-RPC error data
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedServiceType(_) => "unsupported_service_type",
            Self::Config(_) => "config",
            Self::ServiceAdapterCreationFailed { .. } => "service_adapter_creation_failed",
            Self::CapabilityUnsupported { .. } => "capability_unsupported",
            Self::NotAuthenticated { .. } => "not_authenticated",
            Self::Provider { .. } => "provider",
            Self::Timeout { .. } => "timeout",
            Self::OrchestratorNotInitialized => "orchestrator_not_initialized",
            Self::OrchestratorStopped => "orchestrator_stopped",
            Self::ServiceNotRegistered(_) => "service_not_registered",
            Self::Orchestrator(_) => "orchestrator",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }

    /// Whether the error comes from bad caller input rather than a provider
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedServiceType(_)
                | Self::Config(_)
                | Self::ServiceNotRegistered(_)
                | Self::CapabilityUnsupported { .. }
        )
    }
}

/// Result type alias using FluoriteError
pub type Result<T> = std::result::Result<T, FluoriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_failure_keeps_cause() {
        let err = FluoriteError::ServiceAdapterCreationFailed {
            service: "vercel".to_string(),
            source: Box::new(FluoriteError::Config("bad team id".to_string())),
        };
        assert_eq!(err.kind(), "service_adapter_creation_failed");
        assert!(err.to_string().contains("bad team id"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_not_authenticated_names_env_var() {
        let err = FluoriteError::NotAuthenticated {
            service: "github".to_string(),
            env_var: "GITHUB_TOKEN".to_string(),
        };
        assert_eq!(err.to_string(), "github is not authenticated: set GITHUB_TOKEN");
    }

    #[test]
    fn test_config_error_classification() {
        assert!(FluoriteError::UnsupportedServiceType("x".into()).is_config_error());
        assert!(!FluoriteError::provider("turso", "502").is_config_error());
    }
}
