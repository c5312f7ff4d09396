//! Upstream transport error types.
//!
//! Every variant surfaces to the original client as a 5xx upstream
//! failure; trust errors in particular are terminal and never trigger a
//! retry under a weaker policy.

use thiserror::Error;

use crate::modules::cert_store::CertStoreError;
use crate::modules::tls_resolver::TlsResolverError;

/// Errors that can occur building or using an upstream transport.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport configuration could not be built.
    #[error("upstream transport configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The forward-proxy URL is unusable.
    #[error("invalid proxy URL '{url}': {message}")]
    ProxyUrl {
        /// The configured proxy URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// The forward proxy refused or mangled the CONNECT tunnel.
    #[error("proxy CONNECT to {target} failed: {message}")]
    ProxyConnect {
        /// The tunnel target.
        target: String,
        /// Error message.
        message: String,
    },

    /// Upstream dial failed.
    #[error("failed to dial upstream {target}: {source}")]
    Dial {
        /// The dialled target.
        target: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Upstream connection did not complete within the configured bound.
    #[error("upstream connection to {target} timed out")]
    Timeout {
        /// The dialled target.
        target: String,
    },

    /// Upstream TLS failed: handshake error, pin mismatch, or an
    /// unresolvable pin id (which leaves an empty pin set and rejects
    /// every peer).
    #[error("upstream TLS to {target} failed: {message}")]
    Tls {
        /// The dialled target.
        target: String,
        /// Error message.
        message: String,
    },

    /// The bound upstream client certificate cannot be used.
    #[error("upstream client certificate '{id}' unusable: {message}")]
    ClientCertUnusable {
        /// The bound certificate id.
        id: String,
        /// Error message.
        message: String,
    },

    /// Cipher policy failure for the outbound direction.
    #[error(transparent)]
    Cipher(#[from] TlsResolverError),

    /// Certificate store failure while resolving bindings.
    #[error(transparent)]
    Store(#[from] CertStoreError),
}

impl UpstreamError {
    /// HTTP status surfaced to the original client.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Result type alias for upstream transport operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
