//! Configuration error types.

use thiserror::Error;

/// Errors produced while validating the supplied TLS configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A structurally invalid field combination.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Error message.
        message: String,
    },

    /// A per-route section failed validation.
    #[error("invalid configuration for route '{route}': {message}")]
    InvalidRoute {
        /// The offending route id.
        route: String,
        /// Error message.
        message: String,
    },
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
