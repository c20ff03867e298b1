//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Listener names unique, addresses parseable, no two listeners on one socket
//! - Encrypted listeners require `[tls]`
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::listeners::endpoint::ProtocolFamily;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no listeners configured")]
    NoListeners,
    #[error("listener name must not be empty")]
    EmptyName,
    #[error("duplicate listener name `{0}`")]
    DuplicateName(String),
    #[error("listener `{name}` has invalid bind address `{address}`")]
    InvalidAddress { name: String, address: String },
    #[error("listener `{name}` reuses {family:?} socket {address}")]
    DuplicateSocket {
        name: String,
        family: ProtocolFamily,
        address: SocketAddr,
    },
    #[error("listener `{0}` needs a [tls] section")]
    MissingTls(String),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("invalid {field} address `{address}`")]
    InvalidServiceAddress { field: &'static str, address: String },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    let mut names = HashSet::new();
    let mut sockets = HashSet::new();
    for listener in &config.listeners {
        if listener.name.is_empty() {
            errors.push(ValidationError::EmptyName);
        } else if !names.insert(listener.name.as_str()) {
            errors.push(ValidationError::DuplicateName(listener.name.clone()));
        }

        match listener.bind_address.parse::<SocketAddr>() {
            Ok(address) => {
                let family = listener.transport.family();
                // Port 0 asks the OS for a fresh port each time, so never collides.
                if address.port() != 0 && !sockets.insert((family, address)) {
                    errors.push(ValidationError::DuplicateSocket {
                        name: listener.name.clone(),
                        family,
                        address,
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                name: listener.name.clone(),
                address: listener.bind_address.clone(),
            }),
        }

        if listener.transport.requires_tls() && config.tls.is_none() {
            errors.push(ValidationError::MissingTls(listener.name.clone()));
        }
    }

    if config.limits.max_connections == 0 {
        errors.push(ValidationError::Zero("limits.max_connections"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::Zero("limits.max_body_size"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.handshake_secs"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidServiceAddress {
            field: "metrics",
            address: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidServiceAddress {
            field: "admin",
            address: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ListenerConfig, TlsConfig};
    use crate::listeners::endpoint::TransportKind;

    fn tls() -> Option<TlsConfig> {
        Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        })
    }

    #[test]
    fn tls_and_quic_may_share_a_port() {
        let config = GatewayConfig {
            listeners: vec![
                ListenerConfig::new("https", TransportKind::Tls, "0.0.0.0:443"),
                ListenerConfig::new("h3", TransportKind::Quic, "0.0.0.0:443"),
            ],
            tls: tls(),
            ..GatewayConfig::default()
        };
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn same_family_same_socket_is_rejected() {
        let config = GatewayConfig {
            listeners: vec![
                ListenerConfig::new("a", TransportKind::Tcp, "127.0.0.1:8080"),
                ListenerConfig::new("b", TransportKind::Tls, "127.0.0.1:8080"),
            ],
            tls: tls(),
            ..GatewayConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::DuplicateSocket { .. }));
    }

    #[test]
    fn ephemeral_ports_never_collide() {
        let config = GatewayConfig {
            listeners: vec![
                ListenerConfig::new("a", TransportKind::Tcp, "127.0.0.1:0"),
                ListenerConfig::new("b", TransportKind::Tcp, "127.0.0.1:0"),
            ],
            ..GatewayConfig::default()
        };
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.limits.max_connections = 0;
        config.timeouts.request_secs = 0;
        config.observability.metrics_address = "bogus".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoListeners));
        assert!(errors.contains(&ValidationError::Zero("limits.max_connections")));
        assert!(errors.contains(&ValidationError::Zero("timeouts.request_secs")));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn quic_without_tls_section() {
        let config = GatewayConfig {
            listeners: vec![ListenerConfig::new("h3", TransportKind::Quic, "0.0.0.0:443")],
            ..GatewayConfig::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MissingTls("h3".into())])
        );
    }
}
