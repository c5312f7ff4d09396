//! TLS configuration surface.
//!
//! These types are populated by the gateway's configuration loader and
//! handed to the trust engine; the engine never reads configuration files
//! itself. Minimum-version identifiers use the TLS wire values: 771 is
//! TLS 1.2, 772 is TLS 1.3, 0 means the library default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Minimum-version identifier for TLS 1.2.
pub const TLS12_VERSION_ID: u16 = 771;

/// Minimum-version identifier for TLS 1.3.
pub const TLS13_VERSION_ID: u16 = 772;

/// Global TLS configuration for the gateway listener and its routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayTlsConfig {
    /// Whether the listener serves TLS at all.
    pub enabled: bool,

    /// Legacy/default server-identity certificate ids, used when no domain
    /// binding matches the negotiated SNI.
    pub certificates: Vec<String>,

    /// Hostname of the administrative control endpoint, when bound to its
    /// own domain on the shared listener.
    pub control_hostname: Option<String>,

    /// Client-certificate allow-list protecting the control endpoint.
    /// When non-empty the control endpoint mandates and chain-verifies
    /// client certificates at the handshake.
    pub control_client_certificates: Vec<String>,

    /// Listener cipher-suite names (rustls IANA-style). Empty means the
    /// full default set.
    pub cipher_suites: Vec<String>,

    /// Listener minimum protocol version identifier.
    pub min_version: u16,

    /// Global pinned-public-key bindings (host pattern to pin ids),
    /// consulted when a route carries no binding of its own.
    pub pinned_public_keys: HashMap<String, String>,

    /// Global upstream client-certificate bindings (host pattern to id).
    pub upstream_certificates: HashMap<String, String>,

    /// Default outbound transport settings, overridable per route.
    pub transport: TransportSettings,

    /// Per-route TLS policy.
    pub routes: Vec<RouteTlsConfig>,
}

/// Per-route TLS policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTlsConfig {
    /// Route identity, used as the transport cache key component.
    pub route_id: String,

    /// Custom domain serving this route. Supports exact names,
    /// `*.suffix` patterns, and the bare `*` wildcard.
    pub domain: Option<String>,

    /// Server-identity certificate ids bound to this route's domain.
    pub certificates: Vec<String>,

    /// Whether requests on this route must present a client certificate.
    pub use_mutual_tls: bool,

    /// Allow-listed client-certificate digests/ids for mutual TLS.
    pub client_certificates: Vec<String>,

    /// Pinned-public-key bindings for upstream connections
    /// (host pattern to comma-separated pin ids).
    pub pinned_public_keys: HashMap<String, String>,

    /// Upstream client-certificate bindings (host pattern to id).
    pub upstream_certificates: HashMap<String, String>,

    /// Per-route transport overrides; `None` falls back to the global
    /// transport settings.
    pub transport: Option<TransportSettings>,
}

impl RouteTlsConfig {
    /// Create a route policy with the given id.
    #[must_use]
    pub fn new(route_id: &str) -> Self {
        Self {
            route_id: route_id.to_string(),
            ..Self::default()
        }
    }

    /// Bind the route to a domain.
    #[must_use]
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Require mutual TLS with the given allow-list.
    #[must_use]
    pub fn with_mutual_tls(mut self, allowed: Vec<String>) -> Self {
        self.use_mutual_tls = true;
        self.client_certificates = allowed;
        self
    }
}

/// Outbound transport settings for upstream connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportSettings {
    /// Outbound cipher-suite names. Empty means the full default set.
    pub cipher_suites: Vec<String>,

    /// Outbound minimum protocol version identifier.
    pub min_version: u16,

    /// Forward-proxy URL (`http://host:port`) for CONNECT tunnelling.
    pub proxy_url: Option<String>,

    /// Skip upstream chain verification entirely. Ignored for hosts with
    /// a pinned public key, which replace verification anyway.
    pub insecure_skip_verify: bool,

    /// Maximum lifetime of a cached transport in seconds. Zero keeps
    /// transports until invalidated; a negative value expires every
    /// transport immediately, forcing a fresh one per request.
    pub max_conn_lifetime_secs: i64,

    /// Bound on upstream dial + handshake time, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            cipher_suites: Vec::new(),
            min_version: 0,
            proxy_url: None,
            insecure_skip_verify: false,
            max_conn_lifetime_secs: 0,
            connect_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: GatewayTlsConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.enabled);
        assert!(config.certificates.is_empty());
        assert_eq!(config.transport.connect_timeout_secs, 30);
        assert_eq!(config.transport.max_conn_lifetime_secs, 0);
    }

    #[test]
    fn test_route_builder() {
        let route = RouteTlsConfig::new("orders")
            .with_domain("orders.example.com")
            .with_mutual_tls(vec!["abc".to_string()]);
        assert!(route.use_mutual_tls);
        assert_eq!(route.domain.as_deref(), Some("orders.example.com"));
    }
}
