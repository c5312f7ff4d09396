//! Published listener TLS state, rebuilt as whole generations.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_rustls::rustls::crypto::aws_lc_rs::sign::any_supported_type;
use tokio_rustls::rustls::server::Acceptor;
use tokio_rustls::rustls::sign::CertifiedKey;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;
use tracing::{debug, info, warn};

use crate::config::GatewayTlsConfig;
use crate::modules::cert_store::{CertificateRecord, CertificateStore};

use super::cipher::CipherPolicy;
use super::client_auth::{ControlClientVerifier, DeferredClientVerifier};
use super::error::{TlsResolverError, TlsResolverResult};
use super::resolver::ServerIdentityResolver;

/// One fully-built TLS configuration generation.
///
/// Immutable once published. Handshake callbacks only ever read a single
/// generation, so a mid-rebuild connection sees the old state in full or
/// the new state in full, never a mix.
pub struct TlsState {
    /// Server config for proxied traffic (soft client auth when any route
    /// requires mutual TLS).
    default_config: Arc<ServerConfig>,

    /// Server config for the control endpoint (mandatory chain-verified
    /// client auth), when configured.
    control_config: Option<Arc<ServerConfig>>,

    /// Control endpoint hostname.
    control_hostname: Option<String>,
}

impl std::fmt::Debug for TlsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsState")
            .field("has_control", &self.control_config.is_some())
            .field("control_hostname", &self.control_hostname)
            .finish()
    }
}

impl TlsState {
    /// Build a generation from the store and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal cipher misconfiguration, an unusable
    /// control allow-list, or a rustls build failure.
    pub fn build(
        store: &CertificateStore,
        config: &GatewayTlsConfig,
    ) -> TlsResolverResult<Self> {
        let policy = CipherPolicy::resolve(&config.cipher_suites, config.min_version)?;
        let provider = policy.provider();

        let resolver = Arc::new(build_identity_resolver(store, config));

        let wants_client_auth = config.routes.iter().any(|route| route.use_mutual_tls);

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(policy.versions())
            .map_err(|e| TlsResolverError::CipherConfig {
                message: e.to_string(),
            })?;

        let default_config = if wants_client_auth {
            builder
                .with_client_cert_verifier(Arc::new(DeferredClientVerifier::new(&provider)))
                .with_cert_resolver(Arc::clone(&resolver) as _)
        } else {
            builder
                .with_no_client_auth()
                .with_cert_resolver(Arc::clone(&resolver) as _)
        };

        let control_config = match (
            config.control_hostname.as_deref(),
            config.control_client_certificates.is_empty(),
        ) {
            (Some(hostname), false) => {
                let allowed = resolve_records(store, &config.control_client_certificates);
                let verifier = ControlClientVerifier::build(&allowed, &provider)?;
                let control = ServerConfig::builder_with_provider(Arc::clone(&provider))
                    .with_protocol_versions(policy.versions())
                    .map_err(|e| TlsResolverError::CipherConfig {
                        message: e.to_string(),
                    })?
                    .with_client_cert_verifier(verifier)
                    .with_cert_resolver(resolver as _);
                info!(hostname = %hostname, anchors = allowed.len(), "Control endpoint TLS policy built");
                Some(Arc::new(control))
            },
            _ => None,
        };

        Ok(Self {
            default_config: Arc::new(default_config),
            control_config,
            control_hostname: config.control_hostname.clone(),
        })
    }

    /// The server config serving the given SNI.
    #[must_use]
    pub fn config_for_sni(&self, sni: Option<&str>) -> Arc<ServerConfig> {
        if let (Some(control), Some(hostname)) =
            (self.control_config.as_ref(), self.control_hostname.as_deref())
        {
            if sni == Some(hostname) {
                return Arc::clone(control);
            }
        }
        Arc::clone(&self.default_config)
    }
}

/// Listener-side TLS configuration resolver.
///
/// Holds the current [`TlsState`] generation behind an atomic pointer.
/// Rebuilds publish a complete new generation; in-flight handshakes keep
/// reading the one they started with. Readers never lock against writers.
pub struct TlsConfigResolver {
    state: ArcSwap<TlsState>,
}

impl std::fmt::Debug for TlsConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfigResolver")
            .field("state", &**self.state.load())
            .finish()
    }
}

impl TlsConfigResolver {
    /// Build the initial generation.
    ///
    /// # Errors
    ///
    /// Propagates [`TlsState::build`] failures.
    pub fn new(store: &CertificateStore, config: &GatewayTlsConfig) -> TlsResolverResult<Self> {
        let state = TlsState::build(store, config)?;
        Ok(Self {
            state: ArcSwap::from_pointee(state),
        })
    }

    /// Build and atomically publish a new generation.
    ///
    /// On error the previous generation remains in service.
    ///
    /// # Errors
    ///
    /// Propagates [`TlsState::build`] failures.
    pub fn rebuild(
        &self,
        store: &CertificateStore,
        config: &GatewayTlsConfig,
    ) -> TlsResolverResult<()> {
        let state = TlsState::build(store, config)?;
        self.state.store(Arc::new(state));
        info!("TLS configuration generation published");
        Ok(())
    }

    /// The current generation.
    #[must_use]
    pub fn current(&self) -> Arc<TlsState> {
        self.state.load_full()
    }

    /// Accept one TLS connection, selecting the server config by SNI.
    ///
    /// The control endpoint and proxied domains multiplex one listener;
    /// the ClientHello is inspected first and the matching policy applied.
    ///
    /// # Errors
    ///
    /// Returns [`TlsResolverError::Handshake`] on failure or timeout.
    pub async fn accept<IO>(
        &self,
        io: IO,
        handshake_timeout: Duration,
    ) -> TlsResolverResult<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        // Pin the generation for the whole handshake.
        let state = self.current();

        let handshake = async move {
            let start = LazyConfigAcceptor::new(Acceptor::default(), io)
                .await
                .map_err(|e| TlsResolverError::Handshake {
                    message: e.to_string(),
                })?;

            let sni = start.client_hello().server_name().map(str::to_string);
            let config = state.config_for_sni(sni.as_deref());
            debug!(sni = ?sni, "Resolved server config for handshake");

            start
                .into_stream(config)
                .await
                .map_err(|e| TlsResolverError::Handshake {
                    message: e.to_string(),
                })
        };

        timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| TlsResolverError::Handshake {
                message: "handshake timed out".to_string(),
            })?
    }
}

/// Build the per-generation identity resolver from domain bindings.
fn build_identity_resolver(
    store: &CertificateStore,
    config: &GatewayTlsConfig,
) -> ServerIdentityResolver {
    let mut resolver = ServerIdentityResolver::new();

    for route in &config.routes {
        let Some(ref domain) = route.domain else {
            continue;
        };
        for id in &route.certificates {
            match identity_for(store, id) {
                Ok(identity) => resolver.add_binding(domain, identity),
                Err(e) => {
                    warn!(id = %id, domain = %domain, error = %e, "Skipping unusable server certificate");
                },
            }
        }
    }

    // First usable legacy certificate becomes the default identity.
    for id in &config.certificates {
        match identity_for(store, id) {
            Ok(identity) => {
                resolver.set_default(identity);
                break;
            },
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping unusable default certificate");
            },
        }
    }

    resolver
}

/// Resolve ids through the store, skipping (with a warning) any that fail.
fn resolve_records(store: &CertificateStore, ids: &[String]) -> Vec<Arc<CertificateRecord>> {
    ids.iter()
        .filter_map(|id| match store.get(id) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(id = %id, error = %e, "Allow-listed certificate did not resolve");
                None
            },
        })
        .collect()
}

/// Turn a stored record into a server identity.
fn identity_for(store: &CertificateStore, id: &str) -> TlsResolverResult<Arc<CertifiedKey>> {
    let record = store.get(id)?;
    certified_key(&record)
}

fn certified_key(record: &CertificateRecord) -> TlsResolverResult<Arc<CertifiedKey>> {
    let key = record
        .private_key()
        .ok_or_else(|| TlsResolverError::InvalidCertificateChain {
            message: format!("certificate '{}' has no private key", record.id()),
        })?;

    let signing =
        any_supported_type(key).map_err(|e| TlsResolverError::InvalidCertificateChain {
            message: format!("unsupported private key for '{}': {e}", record.id()),
        })?;

    Ok(Arc::new(CertifiedKey::new(record.chain().to_vec(), signing)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteTlsConfig;
    use crate::modules::cert_store::InMemoryBackend;

    fn store_with_cert(domains: Vec<String>) -> (CertificateStore, String) {
        let store = CertificateStore::new(Box::new(InMemoryBackend::new()));
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(domains)
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let combined = format!("{}{}", cert.pem(), key.serialize_pem());
        let id = store.add(combined.as_bytes(), None).unwrap();
        (store, id)
    }

    #[test]
    fn test_state_builds_with_domain_binding() {
        let (store, id) = store_with_cert(vec!["api.example.com".to_string()]);
        let mut route = RouteTlsConfig::new("api").with_domain("api.example.com");
        route.certificates = vec![id];
        let config = GatewayTlsConfig {
            enabled: true,
            routes: vec![route],
            ..GatewayTlsConfig::default()
        };

        let resolver = TlsConfigResolver::new(&store, &config).unwrap();
        let state = resolver.current();
        assert!(state.control_config.is_none());
    }

    #[test]
    fn test_control_allowlist_requires_usable_entries() {
        let (store, _id) = store_with_cert(vec!["localhost".to_string()]);
        let config = GatewayTlsConfig {
            enabled: true,
            control_hostname: Some("control.example.com".to_string()),
            control_client_certificates: vec!["does-not-exist".to_string()],
            ..GatewayTlsConfig::default()
        };

        // A control allow-list that resolves to nothing must fail closed.
        assert!(TlsConfigResolver::new(&store, &config).is_err());
    }

    #[test]
    fn test_rebuild_publishes_new_generation() {
        let (store, id) = store_with_cert(vec!["localhost".to_string()]);
        let config = GatewayTlsConfig {
            enabled: true,
            certificates: vec![id.clone()],
            ..GatewayTlsConfig::default()
        };

        let resolver = TlsConfigResolver::new(&store, &config).unwrap();
        let before = resolver.current();

        let with_control = GatewayTlsConfig {
            control_hostname: Some("control.example.com".to_string()),
            control_client_certificates: vec![id],
            ..config
        };
        resolver.rebuild(&store, &with_control).unwrap();

        let after = resolver.current();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.control_config.is_some());
    }
}
