//! Mutual TLS Module
//!
//! Request-time enforcement of per-route client-certificate allow-lists.
//! The handshake only requests a certificate; once the HTTP layer has
//! resolved the target route, this validator judges the already-presented
//! peer chain against that route's policy. Trust is pure digest
//! membership: no chain is walked, and a self-signed certificate passes
//! as long as its digest is explicitly allow-listed.

mod error;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tracing::{debug, warn};

pub use error::{MutualTlsError, MutualTlsResult};

use crate::config::RouteTlsConfig;
use crate::modules::cert_store::hex_sha256;

/// Validates the peer certificate presented during the handshake against
/// the resolved route's allow-list.
#[derive(Debug, Default)]
pub struct MutualTlsValidator;

impl MutualTlsValidator {
    /// Enforce a route's mutual TLS policy.
    ///
    /// `peer_chain` is the chain captured from the completed handshake,
    /// leaf first; `None` or empty means the client presented nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MutualTlsError::ClientCertRequired`] when the route
    /// requires a certificate and none was presented, or
    /// [`MutualTlsError::CertificateNotAllowed`] when the leaf digest is
    /// not on the allow-list.
    pub fn enforce(
        route: &RouteTlsConfig,
        peer_chain: Option<&[CertificateDer<'_>]>,
    ) -> MutualTlsResult<()> {
        if !route.use_mutual_tls {
            return Ok(());
        }

        let leaf = peer_chain
            .and_then(<[_]>::first)
            .ok_or(MutualTlsError::ClientCertRequired)?;

        let digest = hex_sha256(leaf.as_ref());
        if route
            .client_certificates
            .iter()
            .any(|allowed| *allowed == digest)
        {
            debug!(route = %route.route_id, digest = %digest, "Client certificate allowed");
            Ok(())
        } else {
            warn!(route = %route.route_id, digest = %digest, "Client certificate not on allow-list");
            Err(MutualTlsError::CertificateNotAllowed { digest })
        }
    }

    /// Render a rejection as the gateway's JSON error response.
    #[must_use]
    pub fn rejection_response(error: &MutualTlsError) -> http::Response<Bytes> {
        let body = serde_json::json!({ "error": error.to_string() });
        let mut response = http::Response::new(Bytes::from(body.to_string()));
        *response.status_mut() = error.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_cert() -> (CertificateDer<'static>, String) {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(Vec::<String>::new())
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let der = cert.der().clone();
        let digest = hex_sha256(der.as_ref());
        (der, digest)
    }

    #[test]
    fn test_route_without_mtls_passes_anything() {
        let route = RouteTlsConfig::new("open");
        assert!(MutualTlsValidator::enforce(&route, None).is_ok());
    }

    #[test]
    fn test_missing_certificate_rejected() {
        let route = RouteTlsConfig::new("secure").with_mutual_tls(vec!["abc".to_string()]);
        assert_eq!(
            MutualTlsValidator::enforce(&route, None),
            Err(MutualTlsError::ClientCertRequired)
        );
        assert_eq!(
            MutualTlsValidator::enforce(&route, Some(&[])),
            Err(MutualTlsError::ClientCertRequired)
        );
    }

    #[test]
    fn test_allowlisted_digest_accepted_then_rejected_after_removal() {
        let (der, digest) = client_cert();
        let route = RouteTlsConfig::new("secure").with_mutual_tls(vec![digest.clone()]);
        assert!(MutualTlsValidator::enforce(&route, Some(&[der.clone()])).is_ok());

        let emptied = RouteTlsConfig::new("secure").with_mutual_tls(vec!["other".to_string()]);
        assert_eq!(
            MutualTlsValidator::enforce(&emptied, Some(&[der])),
            Err(MutualTlsError::CertificateNotAllowed { digest })
        );
    }

    #[test]
    fn test_self_signed_accepted_when_listed() {
        // Membership trust only: no chain is walked.
        let (der, digest) = client_cert();
        let route = RouteTlsConfig::new("secure").with_mutual_tls(vec![digest]);
        assert!(MutualTlsValidator::enforce(&route, Some(&[der])).is_ok());
    }

    #[test]
    fn test_rejection_response_shape() {
        let response =
            MutualTlsValidator::rejection_response(&MutualTlsError::ClientCertRequired);
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("\"error\""));
        assert!(body.contains("Client TLS certificate is required"));
    }
}
