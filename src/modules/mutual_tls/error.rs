//! Mutual TLS policy error types.

use thiserror::Error;

/// Rejections produced by request-time mutual TLS enforcement.
///
/// Both variants map to an HTTP 403; the messages are part of the public
/// API surface and are matched verbatim by clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutualTlsError {
    /// The route requires a client certificate and none was presented.
    #[error("Client TLS certificate is required")]
    ClientCertRequired,

    /// The presented certificate's digest is not on the route allow-list.
    #[error("Certificate with SHA256 {digest} not allowed")]
    CertificateNotAllowed {
        /// Hex SHA-256 digest of the presented leaf certificate.
        digest: String,
    },
}

impl MutualTlsError {
    /// HTTP status for this rejection.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http::StatusCode::FORBIDDEN
    }
}

/// Result type alias for mutual TLS enforcement.
pub type MutualTlsResult<T> = Result<T, MutualTlsError>;
