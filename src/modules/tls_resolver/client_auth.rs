//! Client-certificate verifiers for the shared listener.
//!
//! Two policies coexist on one listener. Proxied routes use
//! [`DeferredClientVerifier`]: the handshake requests a certificate but
//! never rejects, because the route (and with it the mutual-TLS
//! requirement) is only known after HTTP routing. The control endpoint uses
//! [`ControlClientVerifier`]: mandatory, chain-verified against a pool in
//! which every allow-listed certificate is an exact trust anchor.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_rustls::rustls::client::danger::HandshakeSignatureValid;
use tokio_rustls::rustls::crypto::{
    verify_tls12_signature, verify_tls13_signature, CryptoProvider, WebPkiSupportedAlgorithms,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, UnixTime};
use tokio_rustls::rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{
    CertificateError, DigitallySignedStruct, DistinguishedName, Error as RustlsError,
    RootCertStore, SignatureScheme,
};
use tracing::{debug, warn};

use crate::modules::cert_store::{hex_sha256, CertificateRecord};

use super::error::{TlsResolverError, TlsResolverResult};

/// Requests a client certificate without requiring or judging it.
///
/// Routes with heterogeneous mutual-TLS requirements multiplex over one
/// listener, so the hard decision is deferred to the mutual-TLS validator
/// after routing. Signature verification still runs; only the trust
/// decision is postponed.
#[derive(Debug)]
pub struct DeferredClientVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl DeferredClientVerifier {
    /// Create a verifier using the provider's signature algorithms.
    #[must_use]
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for DeferredClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, RustlsError> {
        debug!(
            digest = %hex_sha256(end_entity.as_ref()),
            "Client certificate accepted at handshake, policy deferred to routing"
        );
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Mandatory, chain-verified client auth for the control endpoint.
///
/// The root pool holds each allow-listed certificate directly as a trust
/// anchor, so self-signed client certificates verify against themselves.
/// Chain verification alone is not enough: the presented leaf's own digest
/// must be in the allow-list, otherwise a certificate that merely shares an
/// authorized issuer would slip through.
#[derive(Debug)]
pub struct ControlClientVerifier {
    inner: Arc<dyn ClientCertVerifier>,
    allowed_digests: HashSet<String>,
}

impl ControlClientVerifier {
    /// Build the verifier from the resolved allow-list records.
    ///
    /// # Errors
    ///
    /// Returns an error when no allow-listed record yields a usable trust
    /// anchor; the control endpoint never falls open.
    pub fn build(
        allowed: &[Arc<CertificateRecord>],
        provider: &Arc<CryptoProvider>,
    ) -> TlsResolverResult<Arc<dyn ClientCertVerifier>> {
        let mut roots = RootCertStore::empty();
        let mut allowed_digests = HashSet::new();

        for record in allowed {
            let Some(leaf) = record.leaf() else {
                warn!(id = %record.id(), "Control allow-list entry has no certificate, skipping");
                continue;
            };
            if let Err(e) = roots.add(leaf.clone()) {
                warn!(id = %record.id(), error = %e, "Control allow-list entry rejected as anchor");
                continue;
            }
            allowed_digests.insert(hex_sha256(leaf.as_ref()));
        }

        if allowed_digests.is_empty() {
            return Err(TlsResolverError::Config {
                message: "control endpoint allow-list resolves to no usable certificates"
                    .to_string(),
            });
        }

        let inner = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| TlsResolverError::Config {
                message: format!("failed to build control client verifier: {e}"),
            })?;

        Ok(Arc::new(Self {
            inner,
            allowed_digests,
        }))
    }
}

impl ClientCertVerifier for ControlClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, RustlsError> {
        // Chain verification first: absent or unknown-authority certificates
        // fail here with the corresponding TLS alerts.
        self.inner
            .verify_client_cert(end_entity, intermediates, now)?;

        // Each pool entry is an exact, individually-authorized anchor. A
        // chain-compatible certificate whose own entry is absent is still
        // rejected.
        let digest = hex_sha256(end_entity.as_ref());
        if !self.allowed_digests.contains(&digest) {
            warn!(digest = %digest, "Control endpoint rejected chain-valid but unlisted certificate");
            return Err(RustlsError::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        }

        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
