//! SNI-aware server identity selection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_rustls::rustls::server::{ClientHello, ResolvesServerCert};
use tokio_rustls::rustls::sign::CertifiedKey;
use tracing::{debug, warn};

use super::error::TlsResolverError;

/// Resolves the server identity for each incoming handshake.
///
/// Selection order: exact domain binding, `*.suffix` wildcard binding, bare
/// `*` binding, then the single legacy/default certificate. When nothing
/// resolves the handshake fails with a TLS internal error; no anonymous or
/// self-signed fallback is generated.
pub struct ServerIdentityResolver {
    /// Exact domain to identity.
    exact: HashMap<String, Arc<CertifiedKey>>,

    /// `*.suffix` wildcard patterns (suffix, identity).
    wildcards: Vec<(String, Arc<CertifiedKey>)>,

    /// Bare `*` binding, matching any name.
    catch_all: Option<Arc<CertifiedKey>>,

    /// Legacy/default identity, used last and for SNI-less handshakes.
    default_identity: Option<Arc<CertifiedKey>>,
}

impl std::fmt::Debug for ServerIdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentityResolver")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("wildcards", &self.wildcards.len())
            .field("has_catch_all", &self.catch_all.is_some())
            .field("has_default", &self.default_identity.is_some())
            .finish()
    }
}

impl ServerIdentityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            wildcards: Vec::new(),
            catch_all: None,
            default_identity: None,
        }
    }

    /// Bind a host pattern (exact, `*.suffix`, or `*`) to an identity.
    pub fn add_binding(&mut self, pattern: &str, identity: Arc<CertifiedKey>) {
        if pattern == "*" {
            self.catch_all = Some(identity);
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            self.wildcards.push((suffix.to_string(), identity));
        } else {
            self.exact.insert(pattern.to_string(), identity);
        }
        debug!(pattern = %pattern, "Registered server identity binding");
    }

    /// Set the legacy/default identity.
    pub fn set_default(&mut self, identity: Arc<CertifiedKey>) {
        self.default_identity = Some(identity);
    }

    /// Resolve an identity for the negotiated SNI (possibly absent).
    #[must_use]
    pub fn resolve_sni(&self, sni: Option<&str>) -> Option<Arc<CertifiedKey>> {
        if let Some(name) = sni {
            if let Some(identity) = self.exact.get(name) {
                return Some(Arc::clone(identity));
            }

            for (suffix, identity) in &self.wildcards {
                if Self::suffix_matches(suffix, name) {
                    return Some(Arc::clone(identity));
                }
            }

            if let Some(ref identity) = self.catch_all {
                return Some(Arc::clone(identity));
            }
        }

        self.default_identity.clone()
    }

    /// Check that `hostname` is a proper subdomain of `suffix`.
    fn suffix_matches(suffix: &str, hostname: &str) -> bool {
        if !hostname.ends_with(suffix) {
            return false;
        }
        let prefix_len = hostname.len() - suffix.len();
        prefix_len > 0 && hostname.as_bytes()[prefix_len - 1] == b'.'
    }
}

impl Default for ServerIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolvesServerCert for ServerIdentityResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let sni = client_hello.server_name();
        let resolved = self.resolve_sni(sni);
        if resolved.is_none() {
            // rustls turns the None into a TLS internal error on the wire.
            let refusal = TlsResolverError::NoCertificate {
                sni: sni.unwrap_or_default().to_string(),
            };
            warn!(error = %refusal, "Refusing handshake without a server identity");
        }
        resolved
    }
}
