//! Public key pinning for outbound TLS.
//!
//! A pin is the hex SHA-256 digest of a SubjectPublicKeyInfo DER. Pins
//! are configured as certificate-store ids (a stored leaf certificate or
//! a bare public key) and resolved to digests when the transport is
//! built. When a pin set is present it replaces chain verification
//! entirely, so self-signed upstreams with a pinned key are accepted and
//! CA-valid upstreams with an unpinned key are rejected.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{CertificateError, DigitallySignedStruct, Error, SignatureScheme};
use tracing::warn;
use x509_parser::prelude::*;

use crate::modules::cert_store::{hex_sha256, CertificateStore};

use super::error::{UpstreamError, UpstreamResult};

/// Looks up the binding value for an upstream host.
///
/// Match order is exact host, then `*.suffix` wildcard (proper subdomain
/// only), then the `*` catch-all.
#[must_use]
pub fn binding_for_host<'a>(bindings: &'a HashMap<String, String>, host: &str) -> Option<&'a str> {
    if let Some(value) = bindings.get(host) {
        return Some(value.as_str());
    }
    for (pattern, value) in bindings {
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if let Some(label) = host.strip_suffix(suffix) {
                if label.len() > 1 && label.ends_with('.') {
                    return Some(value.as_str());
                }
            }
        }
    }
    bindings.get("*").map(String::as_str)
}

/// Resolves a comma-separated list of pin ids into SPKI digests.
///
/// Each id names a store entry; the pin is the entry's public key
/// fingerprint. Ids that do not resolve are skipped with a warning, so a
/// fully unresolvable pin set is empty and the verifier rejects every
/// peer rather than silently reverting to chain verification.
#[must_use]
pub fn resolve_pins(store: &CertificateStore, spec: &str) -> HashSet<String> {
    let mut pins = HashSet::new();
    for id in spec.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        match store.get(id).and_then(|r| r.public_key_fingerprint()) {
            Ok(digest) => {
                pins.insert(digest);
            }
            Err(err) => {
                warn!(id = %id, error = %err, "failed to resolve pinned public key");
            }
        }
    }
    pins
}

/// Server certificate verifier that checks the peer's leaf public key
/// against a fixed pin set instead of building a chain to a root.
#[derive(Debug)]
pub struct PinnedKeyVerifier {
    pins: HashSet<String>,
    provider: Arc<CryptoProvider>,
}

impl PinnedKeyVerifier {
    /// Creates a verifier over the given resolved pin set.
    #[must_use]
    pub fn new(pins: HashSet<String>, provider: Arc<CryptoProvider>) -> Self {
        Self { pins, provider }
    }
}

impl ServerCertVerifier for PinnedKeyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let (_, cert) = X509Certificate::from_der(end_entity.as_ref())
            .map_err(|_| Error::InvalidCertificate(CertificateError::BadEncoding))?;
        let digest = hex_sha256(cert.public_key().raw);
        if self.pins.contains(&digest) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Server certificate verifier that accepts any peer.
///
/// Used when a transport sets `insecure_skip_verify` without pins.
#[derive(Debug)]
pub struct InsecureServerVerifier {
    provider: Arc<CryptoProvider>,
}

impl InsecureServerVerifier {
    /// Creates an accept-all verifier.
    #[must_use]
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for InsecureServerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Selects the pin binding for an upstream host, route bindings first.
#[must_use]
pub fn pins_for_host<'a>(
    route_bindings: &'a HashMap<String, String>,
    global_bindings: &'a HashMap<String, String>,
    host: &str,
) -> Option<&'a str> {
    binding_for_host(route_bindings, host).or_else(|| binding_for_host(global_bindings, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn exact_host_wins_over_wildcard() {
        let map = bindings(&[
            ("api.example.com", "exact"),
            ("*.example.com", "wild"),
            ("*", "all"),
        ]);
        assert_eq!(binding_for_host(&map, "api.example.com"), Some("exact"));
        assert_eq!(binding_for_host(&map, "www.example.com"), Some("wild"));
        assert_eq!(binding_for_host(&map, "other.net"), Some("all"));
    }

    #[test]
    fn wildcard_requires_proper_subdomain() {
        let map = bindings(&[("*.example.com", "wild")]);
        assert_eq!(binding_for_host(&map, "example.com"), None);
        assert_eq!(binding_for_host(&map, "a.example.com"), Some("wild"));
    }

    #[test]
    fn route_bindings_take_precedence() {
        let route = bindings(&[("api.example.com", "route-pin")]);
        let global = bindings(&[("api.example.com", "global-pin"), ("*", "fallback")]);
        assert_eq!(
            pins_for_host(&route, &global, "api.example.com"),
            Some("route-pin")
        );
        assert_eq!(pins_for_host(&route, &global, "other.net"), Some("fallback"));
    }

    #[test]
    fn unresolvable_pin_spec_yields_empty_set() {
        let store =
            CertificateStore::new(Box::new(crate::modules::cert_store::InMemoryBackend::new()));
        let pins = resolve_pins(&store, "missing-a, missing-b");
        assert!(pins.is_empty());
    }

    #[test]
    fn resolves_pins_from_stored_public_key() {
        let store =
            CertificateStore::new(Box::new(crate::modules::cert_store::InMemoryBackend::new()));
        let key = rcgen::KeyPair::generate().unwrap();
        let id = store.add(key.public_key_pem().as_bytes(), None).unwrap();

        let pins = resolve_pins(&store, &format!("{id}, missing"));
        assert_eq!(pins.len(), 1);
        assert!(pins.contains(&hex_sha256(&rcgen::PublicKeyData::subject_public_key_info(
            &key
        ))));
    }
}
