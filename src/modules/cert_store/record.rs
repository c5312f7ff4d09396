//! Parsed certificate records and content-addressed id derivation.

use std::io::Cursor;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::prelude::*;

use super::error::{CertStoreError, CertStoreResult};

/// Hex-encoded SHA-256 digest of a byte slice.
///
/// Used everywhere a certificate fingerprint or content-addressed id is
/// needed, so all ids share one canonical form: lowercase hex.
#[must_use]
pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Summary of a stored certificate, as served by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CertMeta {
    /// Certificate id.
    pub id: String,

    /// Hex SHA-256 fingerprint of the certificate (or bare public key).
    pub fingerprint: String,

    /// Whether a private key is stored alongside the certificate.
    pub has_private: bool,
}

/// A parsed certificate store entry. Immutable once created; replacing
/// content requires delete + insert.
pub struct CertificateRecord {
    /// Content-addressed id (or the explicit id supplied at insertion).
    id: String,

    /// Raw PEM bytes as stored.
    pem: Vec<u8>,

    /// Certificate chain (leaf first). Empty for bare-public-key entries.
    chain: Vec<CertificateDer<'static>>,

    /// Private key, when the PEM carried one.
    private_key: Option<PrivateKeyDer<'static>>,

    /// DER-encoded SubjectPublicKeyInfo, for bare-public-key entries.
    public_key_der: Option<Vec<u8>>,
}

impl std::fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("id", &self.id)
            .field("chain_len", &self.chain.len())
            .field("has_private", &self.has_private())
            .field("is_public_key", &self.public_key_der.is_some())
            .finish()
    }
}

impl CertificateRecord {
    /// Parse PEM bytes into a record.
    ///
    /// The id defaults to the SHA-256 of the leaf certificate DER; for a PEM
    /// containing only a public key, the SHA-256 of the SubjectPublicKeyInfo
    /// DER. These are different preimages and are never mixed. An explicit
    /// id, when given, takes precedence over either derivation.
    ///
    /// # Errors
    ///
    /// Returns [`CertStoreError::MalformedPem`] if the input contains no
    /// certificate, private key, or public key block.
    pub fn parse(pem: &[u8], explicit_id: Option<&str>) -> CertStoreResult<Self> {
        let mut chain: Vec<CertificateDer<'static>> = Vec::new();
        let mut private_key: Option<PrivateKeyDer<'static>> = None;
        let mut public_key_der: Option<Vec<u8>> = None;

        let mut reader = Cursor::new(pem);
        for item in rustls_pemfile::read_all(&mut reader) {
            let item = item.map_err(|e| CertStoreError::MalformedPem {
                message: e.to_string(),
            })?;
            match item {
                rustls_pemfile::Item::X509Certificate(cert) => chain.push(cert),
                rustls_pemfile::Item::Pkcs1Key(key) => {
                    private_key.get_or_insert(PrivateKeyDer::from(key));
                },
                rustls_pemfile::Item::Pkcs8Key(key) => {
                    private_key.get_or_insert(PrivateKeyDer::from(key));
                },
                rustls_pemfile::Item::Sec1Key(key) => {
                    private_key.get_or_insert(PrivateKeyDer::from(key));
                },
                rustls_pemfile::Item::SubjectPublicKeyInfo(spki) => {
                    public_key_der.get_or_insert(spki.as_ref().to_vec());
                },
                _ => {},
            }
        }

        let derived = if let Some(leaf) = chain.first() {
            // Validate that the leaf actually decodes as X.509 before
            // admitting it to the store.
            X509Certificate::from_der(leaf.as_ref()).map_err(|e| {
                CertStoreError::InvalidCertificate {
                    message: e.to_string(),
                }
            })?;
            hex_sha256(leaf.as_ref())
        } else if let Some(ref spki) = public_key_der {
            hex_sha256(spki)
        } else {
            return Err(CertStoreError::MalformedPem {
                message: "no certificate or public key block found".to_string(),
            });
        };

        let id = explicit_id.map_or(derived, str::to_string);

        Ok(Self {
            id,
            pem: pem.to_vec(),
            chain,
            private_key,
            public_key_der,
        })
    }

    /// Get the record id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the raw PEM bytes.
    #[must_use]
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Get the certificate chain (leaf first; empty for bare keys).
    #[must_use]
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Get the leaf certificate, if this entry holds one.
    #[must_use]
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }

    /// Get the private key, if stored.
    #[must_use]
    pub fn private_key(&self) -> Option<&PrivateKeyDer<'static>> {
        self.private_key.as_ref()
    }

    /// Whether a private key is stored with this entry.
    #[must_use]
    pub fn has_private(&self) -> bool {
        self.private_key.is_some()
    }

    /// Content fingerprint: leaf certificate digest, or bare-key digest.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        if let Some(leaf) = self.chain.first() {
            hex_sha256(leaf.as_ref())
        } else if let Some(ref spki) = self.public_key_der {
            hex_sha256(spki)
        } else {
            // Unreachable by construction; parse() rejects empty material.
            String::new()
        }
    }

    /// Hex SHA-256 digest over the entry's public key (SPKI DER).
    ///
    /// For certificate entries this is the digest of the leaf's
    /// SubjectPublicKeyInfo; for bare-key entries, of the key itself.
    /// This is the value public-key pins are compared against.
    ///
    /// # Errors
    ///
    /// Returns an error if the leaf certificate cannot be re-parsed.
    pub fn public_key_fingerprint(&self) -> CertStoreResult<String> {
        if let Some(ref spki) = self.public_key_der {
            return Ok(hex_sha256(spki));
        }

        let leaf = self
            .chain
            .first()
            .ok_or_else(|| CertStoreError::InvalidCertificate {
                message: "entry holds neither certificate nor public key".to_string(),
            })?;

        let (_, cert) = X509Certificate::from_der(leaf.as_ref()).map_err(|e| {
            CertStoreError::InvalidCertificate {
                message: e.to_string(),
            }
        })?;

        Ok(hex_sha256(cert.public_key().raw))
    }

    /// Build the admin-facing summary for this record.
    #[must_use]
    pub fn meta(&self) -> CertMeta {
        CertMeta {
            id: self.id.clone(),
            fingerprint: self.fingerprint(),
            has_private: self.has_private(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_pem() -> (String, Vec<u8>) {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let combined = format!("{}{}", cert.pem(), key.serialize_pem());
        (combined, cert.der().as_ref().to_vec())
    }

    #[test]
    fn test_parse_combined_pem() {
        let (combined, leaf_der) = server_pem();
        let record = CertificateRecord::parse(combined.as_bytes(), None).unwrap();

        assert_eq!(record.id(), hex_sha256(&leaf_der));
        assert!(record.has_private());
        assert_eq!(record.fingerprint(), record.id());
    }

    #[test]
    fn test_parse_cert_only() {
        let (combined, _) = server_pem();
        let cert_only: String = combined
            .split_inclusive('\n')
            .take_while(|l| !l.contains("PRIVATE KEY"))
            .collect();
        let record = CertificateRecord::parse(cert_only.as_bytes(), None).unwrap();
        assert!(!record.has_private());
        assert_eq!(record.chain().len(), 1);
    }

    #[test]
    fn test_public_key_only_id_uses_spki_digest() {
        let key = rcgen::KeyPair::generate().unwrap();
        let pub_pem = key.public_key_pem();
        let record = CertificateRecord::parse(pub_pem.as_bytes(), None).unwrap();

        // Id is derived from the SPKI DER, not from any certificate digest.
        assert_eq!(
            record.id(),
            hex_sha256(&rcgen::PublicKeyData::subject_public_key_info(&key))
        );
        assert!(record.leaf().is_none());
        assert_eq!(record.public_key_fingerprint().unwrap(), record.id());
    }

    #[test]
    fn test_explicit_id_takes_precedence() {
        let (combined, _) = server_pem();
        let record = CertificateRecord::parse(combined.as_bytes(), Some("my-cert")).unwrap();
        assert_eq!(record.id(), "my-cert");
        // Fingerprint still reflects content.
        assert_ne!(record.fingerprint(), "my-cert");
    }

    #[test]
    fn test_malformed_pem_rejected() {
        let err = CertificateRecord::parse(b"not a pem", None).unwrap_err();
        assert!(matches!(err, CertStoreError::MalformedPem { .. }));
    }

    #[test]
    fn test_cert_public_key_fingerprint_differs_from_cert_digest() {
        let (combined, leaf_der) = server_pem();
        let record = CertificateRecord::parse(combined.as_bytes(), None).unwrap();
        let pin = record.public_key_fingerprint().unwrap();
        assert_ne!(pin, hex_sha256(&leaf_der));
    }
}
