//! Structural validation of the TLS configuration.
//!
//! Catches combinations that would otherwise first fail at handshake time.
//! Cipher-name resolution is deliberately not checked here; unknown names
//! are dropped with a warning when the policy is built, and only an empty
//! effective set is fatal.

use super::error::{ConfigError, ConfigResult};
use super::types::{GatewayTlsConfig, TLS12_VERSION_ID, TLS13_VERSION_ID};

/// Validate a gateway TLS configuration.
///
/// # Errors
///
/// Returns the first structural problem found.
pub fn validate(config: &GatewayTlsConfig) -> ConfigResult<()> {
    if !config.control_client_certificates.is_empty() && config.control_hostname.is_none() {
        return Err(ConfigError::Invalid {
            message: "control endpoint allow-list requires a control hostname".to_string(),
        });
    }

    validate_min_version(config.min_version, None)?;
    validate_min_version(config.transport.min_version, None)?;

    for route in &config.routes {
        if route.route_id.is_empty() {
            return Err(ConfigError::Invalid {
                message: "route with empty route_id".to_string(),
            });
        }

        if route.use_mutual_tls && route.client_certificates.is_empty() {
            return Err(ConfigError::InvalidRoute {
                route: route.route_id.clone(),
                message: "mutual TLS enabled with an empty client-certificate allow-list"
                    .to_string(),
            });
        }

        if !route.certificates.is_empty() && route.domain.is_none() {
            return Err(ConfigError::InvalidRoute {
                route: route.route_id.clone(),
                message: "server certificates bound without a domain".to_string(),
            });
        }

        if let Some(ref transport) = route.transport {
            validate_min_version(transport.min_version, Some(&route.route_id))?;
        }
    }

    Ok(())
}

fn validate_min_version(version: u16, route: Option<&str>) -> ConfigResult<()> {
    if matches!(version, 0 | TLS12_VERSION_ID | TLS13_VERSION_ID) {
        return Ok(());
    }
    let message = format!("unsupported minimum TLS version identifier {version}");
    match route {
        Some(route) => Err(ConfigError::InvalidRoute {
            route: route.to_string(),
            message,
        }),
        None => Err(ConfigError::Invalid { message }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::RouteTlsConfig;
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate(&GatewayTlsConfig::default()).is_ok());
    }

    #[test]
    fn test_control_allowlist_without_hostname_rejected() {
        let config = GatewayTlsConfig {
            control_client_certificates: vec!["abc".to_string()],
            ..GatewayTlsConfig::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mtls_route_with_empty_allowlist_rejected() {
        let mut route = RouteTlsConfig::new("orders");
        route.use_mutual_tls = true;
        let config = GatewayTlsConfig {
            routes: vec![route],
            ..GatewayTlsConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_bad_min_version_rejected() {
        let config = GatewayTlsConfig {
            min_version: 770,
            ..GatewayTlsConfig::default()
        };
        assert!(validate(&config).is_err());
    }
}
