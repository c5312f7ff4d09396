//! Cipher suite and protocol version policy.
//!
//! Translates configured suite names and a numeric minimum-version
//! identifier into rustls runtime parameters. The same policy type serves
//! the inbound listener and each outbound transport; the two directions are
//! resolved independently from their own configuration.

use std::sync::Arc;

use tokio_rustls::rustls::crypto::{aws_lc_rs, CryptoProvider};
use tokio_rustls::rustls::{version, SupportedCipherSuite, SupportedProtocolVersion};
use tracing::warn;

use crate::config::{TLS12_VERSION_ID, TLS13_VERSION_ID};

use super::error::{TlsResolverError, TlsResolverResult};

/// Resolved cipher-suite set and protocol versions.
#[derive(Clone)]
pub struct CipherPolicy {
    suites: Vec<SupportedCipherSuite>,
    versions: Vec<&'static SupportedProtocolVersion>,
}

impl std::fmt::Debug for CipherPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherPolicy")
            .field("suites", &self.suite_names())
            .field("versions", &self.versions.len())
            .finish()
    }
}

impl CipherPolicy {
    /// Resolve configured suite names and a minimum version into a policy.
    ///
    /// Unknown suite names are dropped with a warning. An empty name list
    /// selects the provider's full default set.
    ///
    /// # Errors
    ///
    /// Returns [`TlsResolverError::CipherConfig`] when names were given but
    /// none resolved, or the minimum-version identifier is unsupported.
    pub fn resolve(names: &[String], min_version: u16) -> TlsResolverResult<Self> {
        let all = aws_lc_rs::default_provider().cipher_suites;

        let suites = if names.is_empty() {
            all
        } else {
            let mut selected = Vec::with_capacity(names.len());
            for name in names {
                match all.iter().find(|s| Self::suite_name(s) == *name) {
                    Some(suite) => selected.push(*suite),
                    None => warn!(suite = %name, "Unknown cipher suite name, skipping"),
                }
            }
            if selected.is_empty() {
                return Err(TlsResolverError::CipherConfig {
                    message: "no configured cipher suite name resolved".to_string(),
                });
            }
            selected
        };

        let versions: Vec<&'static SupportedProtocolVersion> = match min_version {
            0 | TLS12_VERSION_ID => vec![&version::TLS13, &version::TLS12],
            TLS13_VERSION_ID => vec![&version::TLS13],
            other => {
                return Err(TlsResolverError::CipherConfig {
                    message: format!("unsupported minimum TLS version identifier {other}"),
                })
            },
        };

        Ok(Self { suites, versions })
    }

    /// Build a crypto provider restricted to this policy's suites.
    #[must_use]
    pub fn provider(&self) -> Arc<CryptoProvider> {
        Arc::new(CryptoProvider {
            cipher_suites: self.suites.clone(),
            ..aws_lc_rs::default_provider()
        })
    }

    /// The allowed protocol versions, newest first.
    #[must_use]
    pub fn versions(&self) -> &[&'static SupportedProtocolVersion] {
        &self.versions
    }

    /// Canonical name of a supported cipher suite.
    #[must_use]
    pub fn suite_name(suite: &SupportedCipherSuite) -> String {
        format!("{:?}", suite.suite())
    }

    /// Names of the suites in this policy.
    #[must_use]
    pub fn suite_names(&self) -> Vec<String> {
        self.suites.iter().map(Self::suite_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_names_select_default_set() {
        let policy = CipherPolicy::resolve(&[], 0).unwrap();
        assert!(!policy.suite_names().is_empty());
        assert_eq!(policy.versions().len(), 2);
    }

    #[test]
    fn test_known_name_resolves() {
        let policy =
            CipherPolicy::resolve(&["TLS13_AES_128_GCM_SHA256".to_string()], TLS13_VERSION_ID)
                .unwrap();
        assert_eq!(policy.suite_names(), vec!["TLS13_AES_128_GCM_SHA256"]);
        assert_eq!(policy.versions().len(), 1);
    }

    #[test]
    fn test_unknown_names_skipped_not_fatal() {
        let policy = CipherPolicy::resolve(
            &[
                "NOT_A_SUITE".to_string(),
                "TLS13_AES_256_GCM_SHA384".to_string(),
            ],
            0,
        )
        .unwrap();
        assert_eq!(policy.suite_names(), vec!["TLS13_AES_256_GCM_SHA384"]);
    }

    #[test]
    fn test_all_unknown_is_fatal() {
        let err = CipherPolicy::resolve(&["NOT_A_SUITE".to_string()], 0).unwrap_err();
        assert!(matches!(err, TlsResolverError::CipherConfig { .. }));
    }

    #[test]
    fn test_bad_min_version_is_fatal() {
        assert!(CipherPolicy::resolve(&[], 770).is_err());
    }
}
