//! Certificate store error types.

use thiserror::Error;

/// Errors that can occur in the certificate store module.
#[derive(Debug, Error)]
pub enum CertStoreError {
    /// No certificate exists under the requested id.
    #[error("certificate '{id}' not found")]
    NotFound {
        /// The requested certificate id.
        id: String,
    },

    /// The supplied PEM contained no usable certificate or key material.
    #[error("malformed PEM: {message}")]
    MalformedPem {
        /// Error message.
        message: String,
    },

    /// The parsed certificate could not be decoded as X.509.
    #[error("invalid certificate: {message}")]
    InvalidCertificate {
        /// Error message.
        message: String,
    },

    /// The storage backend failed.
    #[error("storage backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
    },

    /// IO error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for certificate store operations.
pub type CertStoreResult<T> = Result<T, CertStoreError>;
