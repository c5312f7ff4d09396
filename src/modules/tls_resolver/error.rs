//! TLS resolver error types.

use thiserror::Error;

use crate::modules::cert_store::CertStoreError;

/// Errors that can occur while building or serving listener TLS state.
#[derive(Debug, Error)]
pub enum TlsResolverError {
    /// No server identity resolves for the negotiated name. Surfaced to the
    /// client as a TLS internal error; no anonymous fallback is generated.
    #[error("no certificate resolves for SNI '{sni}'")]
    NoCertificate {
        /// The negotiated SNI, or empty.
        sni: String,
    },

    /// Cipher or protocol-version configuration left no usable set.
    #[error("cipher configuration error: {message}")]
    CipherConfig {
        /// Error message.
        message: String,
    },

    /// A stored certificate could not be turned into a server identity.
    #[error("invalid certificate chain: {message}")]
    InvalidCertificateChain {
        /// Error message.
        message: String,
    },

    /// TLS handshake failed or timed out.
    #[error("TLS handshake failed: {message}")]
    Handshake {
        /// Error message.
        message: String,
    },

    /// Configuration error while building a generation.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Certificate store failure during a rebuild.
    #[error(transparent)]
    Store(#[from] CertStoreError),
}

/// Result type alias for TLS resolver operations.
pub type TlsResolverResult<T> = Result<T, TlsResolverError>;
