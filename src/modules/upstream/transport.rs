//! Outbound TLS transports and the per-route transport cache.
//!
//! A transport is a fully resolved rustls client configuration for one
//! (route, target host) pair: cipher policy, trust mode (pins, skip, or
//! the bundled web PKI roots), optional client identity, and optional
//! forward proxy. Transports are cached and rebuilt when their lifetime
//! elapses or their effective settings change; a negative lifetime
//! disables reuse so every request dials a fresh connection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::{GatewayTlsConfig, RouteTlsConfig, TransportSettings};
use crate::modules::cert_store::CertificateStore;
use crate::modules::tls_resolver::CipherPolicy;

use super::error::{UpstreamError, UpstreamResult};
use super::pinning::{
    binding_for_host, pins_for_host, resolve_pins, InsecureServerVerifier, PinnedKeyVerifier,
};

/// Byte stream capable of carrying an upstream TLS session.
///
/// Either a plain TCP connection or a TLS session to a forward proxy
/// with the tunnel already established.
pub trait UpstreamIo: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug> UpstreamIo for T {}

/// Resolved forward-proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProxyTarget {
    host: String,
    port: u16,
    /// Whether the hop to the proxy itself is TLS (`https://` proxy URL).
    tls: bool,
}

fn parse_proxy_url(url: &str) -> UpstreamResult<ProxyTarget> {
    let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
        UpstreamError::ProxyUrl {
            url: url.to_string(),
            message: e.to_string(),
        }
    })?;

    let tls = match uri.scheme_str() {
        Some("http") | None => false,
        Some("https") => true,
        Some(other) => {
            return Err(UpstreamError::ProxyUrl {
                url: url.to_string(),
                message: format!("unsupported proxy scheme '{other}'"),
            })
        }
    };

    let host = uri
        .host()
        .ok_or_else(|| UpstreamError::ProxyUrl {
            url: url.to_string(),
            message: "proxy URL has no host".to_string(),
        })?
        .to_string();

    Ok(ProxyTarget {
        host,
        port: uri.port_u16().unwrap_or(if tls { 443 } else { 80 }),
        tls,
    })
}

/// Maximum bytes accepted for a proxy CONNECT response head.
const CONNECT_RESPONSE_LIMIT: usize = 8 * 1024;

/// Establishes an HTTP CONNECT tunnel over an open proxy connection.
///
/// Only the response head is consumed; the stream is positioned at the
/// first tunnelled byte on success.
async fn establish_tunnel<S>(stream: &mut S, target: &str) -> UpstreamResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| UpstreamError::ProxyConnect {
            target: target.to_string(),
            message: e.to_string(),
        })?;

    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= CONNECT_RESPONSE_LIMIT {
            return Err(UpstreamError::ProxyConnect {
                target: target.to_string(),
                message: "proxy response head too large".to_string(),
            });
        }
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| UpstreamError::ProxyConnect {
                target: target.to_string(),
                message: e.to_string(),
            })?;
        if n == 0 {
            return Err(UpstreamError::ProxyConnect {
                target: target.to_string(),
                message: "proxy closed connection before responding".to_string(),
            });
        }
        head.push(byte[0]);
    }

    let status_line = head
        .split(|&b| b == b'\r')
        .next()
        .map(|line| String::from_utf8_lossy(line).to_string())
        .unwrap_or_default();
    let status_ok = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code == "200");
    if !status_ok {
        return Err(UpstreamError::ProxyConnect {
            target: target.to_string(),
            message: format!("proxy refused tunnel: {status_line}"),
        });
    }

    Ok(())
}

/// One resolved outbound transport.
///
/// Holds the rustls connector built for a specific trust mode, the
/// forward proxy (if any), and the effective settings it was built from.
/// Pinned transports never fall back to chain verification; an empty
/// resolved pin set rejects every peer at the handshake.
pub struct UpstreamTransport {
    connector: TlsConnector,
    proxy: Option<ProxyTarget>,
    /// Connector for the hop to a TLS (`https://`) proxy. The pin set
    /// never applies here; it judges the end-to-end upstream session.
    proxy_connector: Option<TlsConnector>,
    settings: TransportSettings,
    created_at: Instant,
}

impl UpstreamTransport {
    /// Whether this transport is past its configured lifetime.
    ///
    /// A negative lifetime expires immediately (no connection reuse);
    /// zero never expires.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.settings.max_conn_lifetime_secs {
            secs if secs < 0 => true,
            0 => false,
            secs => self.created_at.elapsed() >= Duration::from_secs(secs as u64),
        }
    }

    /// Opens a TLS connection to `host:port`, through the forward proxy
    /// when one is configured. The whole sequence (dial, proxy handshake,
    /// tunnel, upstream handshake) runs under the configured connect
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] for dial, tunnel, timeout, or TLS
    /// failures. Pin mismatches surface here as TLS failures.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> UpstreamResult<TlsStream<Box<dyn UpstreamIo>>> {
        let target = format!("{host}:{port}");

        let connect = async {
            let io: Box<dyn UpstreamIo> = match &self.proxy {
                Some(proxy) => {
                    let tcp = TcpStream::connect((proxy.host.as_str(), proxy.port))
                        .await
                        .map_err(|source| UpstreamError::Dial {
                            target: format!("{}:{}", proxy.host, proxy.port),
                            source,
                        })?;

                    let mut stream: Box<dyn UpstreamIo> = match &self.proxy_connector {
                        Some(connector) => {
                            let name = ServerName::try_from(proxy.host.clone()).map_err(|e| {
                                UpstreamError::ProxyUrl {
                                    url: proxy.host.clone(),
                                    message: e.to_string(),
                                }
                            })?;
                            let tls = connector.connect(name, tcp).await.map_err(|e| {
                                UpstreamError::ProxyConnect {
                                    target: target.clone(),
                                    message: format!("proxy TLS handshake failed: {e}"),
                                }
                            })?;
                            Box::new(tls)
                        }
                        None => Box::new(tcp),
                    };

                    establish_tunnel(&mut stream, &target).await?;
                    debug!(target = %target, proxy = %proxy.host, "CONNECT tunnel established");
                    stream
                }
                None => {
                    let tcp = TcpStream::connect((host, port)).await.map_err(|source| {
                        UpstreamError::Dial {
                            target: target.clone(),
                            source,
                        }
                    })?;
                    Box::new(tcp)
                }
            };

            let server_name =
                ServerName::try_from(host.to_string()).map_err(|e| UpstreamError::Tls {
                    target: target.clone(),
                    message: e.to_string(),
                })?;

            self.connector
                .connect(server_name, io)
                .await
                .map_err(|e| UpstreamError::Tls {
                    target: target.clone(),
                    message: e.to_string(),
                })
        };

        timeout(
            Duration::from_secs(self.settings.connect_timeout_secs),
            connect,
        )
        .await
        .map_err(|_| UpstreamError::Timeout { target })?
    }
}

impl std::fmt::Debug for UpstreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTransport")
            .field("proxy", &self.proxy)
            .field("max_lifetime_secs", &self.settings.max_conn_lifetime_secs)
            .finish()
    }
}

/// Cache of outbound transports keyed by (route id, target host).
///
/// A cached entry is reused only while it is within its lifetime and the
/// route's effective transport settings still match the ones it was
/// built from; a settings change rebuilds in place without an explicit
/// invalidation. `invalidate_route` drops every entry for a route so the
/// next request also re-resolves certificate and pin bindings.
pub struct UpstreamTransportCache {
    store: Arc<CertificateStore>,
    entries: DashMap<(String, String), Arc<UpstreamTransport>>,
}

impl UpstreamTransportCache {
    /// Creates an empty cache over the given certificate store.
    #[must_use]
    pub fn new(store: Arc<CertificateStore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// Returns the transport for a route and target host, building one
    /// if none is cached, the cached one has expired, or the effective
    /// settings no longer match the cached build.
    ///
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] when the transport cannot be built
    /// from the effective settings.
    pub fn transport_for(
        &self,
        global: &GatewayTlsConfig,
        route: &RouteTlsConfig,
        host: &str,
    ) -> UpstreamResult<Arc<UpstreamTransport>> {
        let key = (route.route_id.clone(), host.to_string());
        let settings = route.transport.as_ref().unwrap_or(&global.transport);

        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() && entry.settings == *settings {
                return Ok(Arc::clone(entry.value()));
            }
        }

        let transport = Arc::new(self.build(global, route, host, settings)?);
        info!(
            route = %route.route_id,
            host = %host,
            "Upstream transport built"
        );
        self.entries.insert(key, Arc::clone(&transport));
        Ok(transport)
    }

    /// Drops every cached transport bound to a route.
    pub fn invalidate_route(&self, route_id: &str) {
        self.entries.retain(|(route, _), _| route != route_id);
    }

    /// Number of cached transports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn build(
        &self,
        global: &GatewayTlsConfig,
        route: &RouteTlsConfig,
        host: &str,
        settings: &TransportSettings,
    ) -> UpstreamResult<UpstreamTransport> {
        let policy = CipherPolicy::resolve(&settings.cipher_suites, settings.min_version)?;
        let provider = policy.provider();

        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(policy.versions())
            .map_err(|e| UpstreamError::Config {
                message: e.to_string(),
            })?;

        // Pins take precedence over the skip flag; a pinned transport is
        // never silently downgraded to accept-all.
        let pin_spec = pins_for_host(&route.pinned_public_keys, &global.pinned_public_keys, host);
        let builder = if let Some(spec) = pin_spec {
            let pins: HashSet<String> = resolve_pins(&self.store, spec);
            if pins.is_empty() {
                warn!(
                    route = %route.route_id,
                    host = %host,
                    "no pinned public key resolved; transport will reject every peer"
                );
            }
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(PinnedKeyVerifier::new(
                    pins,
                    Arc::clone(&provider),
                )))
        } else if settings.insecure_skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureServerVerifier::new(
                    Arc::clone(&provider),
                )))
        } else {
            builder.with_root_certificates(web_pki_roots())
        };

        let identity = binding_for_host(&route.upstream_certificates, host)
            .or_else(|| binding_for_host(&global.upstream_certificates, host));
        let config = match identity {
            Some(id) => {
                let record = self.store.get(id)?;
                let key = record
                    .private_key()
                    .ok_or_else(|| UpstreamError::ClientCertUnusable {
                        id: id.to_string(),
                        message: "entry has no private key".to_string(),
                    })?;
                builder
                    .with_client_auth_cert(record.chain().to_vec(), key.clone_key())
                    .map_err(|e| UpstreamError::ClientCertUnusable {
                        id: id.to_string(),
                        message: e.to_string(),
                    })?
            }
            None => builder.with_no_client_auth(),
        };

        let proxy = settings
            .proxy_url
            .as_deref()
            .map(parse_proxy_url)
            .transpose()?;

        let proxy_connector = if matches!(proxy, Some(ProxyTarget { tls: true, .. })) {
            Some(build_proxy_connector(&policy, settings)?)
        } else {
            None
        };

        Ok(UpstreamTransport {
            connector: TlsConnector::from(Arc::new(config)),
            proxy,
            proxy_connector,
            settings: settings.clone(),
            created_at: Instant::now(),
        })
    }
}

/// Connector for the TLS hop to an `https://` forward proxy.
///
/// The proxy presents its own certificate, judged by the transport's
/// chain trust (web PKI roots, or accept-all under the skip flag). Pins
/// stay out of this hop.
fn build_proxy_connector(
    policy: &CipherPolicy,
    settings: &TransportSettings,
) -> UpstreamResult<TlsConnector> {
    let provider = policy.provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(policy.versions())
        .map_err(|e| UpstreamError::Config {
            message: e.to_string(),
        })?;

    let config = if settings.insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerVerifier::new(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(web_pki_roots())
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

fn web_pki_roots() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

impl std::fmt::Debug for UpstreamTransportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTransportCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cert_store::InMemoryBackend;

    fn cache() -> UpstreamTransportCache {
        UpstreamTransportCache::new(Arc::new(CertificateStore::new(Box::new(
            InMemoryBackend::new(),
        ))))
    }

    fn route(id: &str) -> RouteTlsConfig {
        RouteTlsConfig::new(id)
    }

    #[test]
    fn test_parse_proxy_url() {
        let proxy = parse_proxy_url("http://proxy.internal:3128").unwrap();
        assert_eq!(proxy.host, "proxy.internal");
        assert_eq!(proxy.port, 3128);
        assert!(!proxy.tls);

        let default_port = parse_proxy_url("http://proxy.internal").unwrap();
        assert_eq!(default_port.port, 80);

        let tls_proxy = parse_proxy_url("https://proxy.internal").unwrap();
        assert!(tls_proxy.tls);
        assert_eq!(tls_proxy.port, 443);

        assert!(matches!(
            parse_proxy_url("socks5://proxy.internal"),
            Err(UpstreamError::ProxyUrl { .. })
        ));
        assert!(matches!(
            parse_proxy_url("http://"),
            Err(UpstreamError::ProxyUrl { .. })
        ));
    }

    #[test]
    fn test_cache_reuses_unexpired_transport() {
        let cache = cache();
        let global = GatewayTlsConfig::default();
        let route = route("orders");

        let first = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        let second = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_settings_change_rebuilds_without_invalidation() {
        let cache = cache();
        let global = GatewayTlsConfig::default();
        let mut route = route("orders");

        let first = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();

        route.transport = Some(TransportSettings {
            insecure_skip_verify: true,
            ..TransportSettings::default()
        });
        let second = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        assert!(
            !Arc::ptr_eq(&first, &second),
            "changed settings must not be served from the cache"
        );

        // Unchanged settings reuse the rebuilt entry.
        let third = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_negative_lifetime_rebuilds_every_time() {
        let cache = cache();
        let global = GatewayTlsConfig::default();
        let mut route = route("orders");
        route.transport = Some(TransportSettings {
            max_conn_lifetime_secs: -1,
            ..TransportSettings::default()
        });

        let first = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        assert!(first.is_expired());
        let second = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_route_drops_only_that_route() {
        let cache = cache();
        let global = GatewayTlsConfig::default();

        cache
            .transport_for(&global, &route("orders"), "a.example.com")
            .unwrap();
        cache
            .transport_for(&global, &route("billing"), "b.example.com")
            .unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate_route("orders");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_client_identity_requires_private_key() {
        let store = Arc::new(CertificateStore::new(Box::new(InMemoryBackend::new())));
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["client.example.com".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        // Certificate only, no key material.
        let id = store.add(cert.pem().as_bytes(), None).unwrap();

        let cache = UpstreamTransportCache::new(store);
        let global = GatewayTlsConfig::default();
        let mut route = route("orders");
        route
            .upstream_certificates
            .insert("*".to_string(), id);

        let err = cache
            .transport_for(&global, &route, "upstream.example.com")
            .unwrap_err();
        assert!(matches!(err, UpstreamError::ClientCertUnusable { .. }));
    }
}
