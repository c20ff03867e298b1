//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::listeners::endpoint::TransportKind;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Transport endpoints serving the application.
    pub listeners: Vec<ListenerConfig>,

    /// Certificate chain shared by TLS and QUIC listeners.
    pub tls: Option<TlsConfig>,

    /// HTTP/3 advertisement settings.
    pub alt_svc: AltSvcConfig,

    /// Connection and body limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// One transport endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Unique name, used by the admin API and in logs.
    pub name: String,

    /// `tcp`, `tls` or `quic`.
    pub transport: TransportKind,

    /// Bind address (e.g., "0.0.0.0:443").
    pub bind_address: String,

    /// Offer `h2` via ALPN. Only meaningful for `tls`.
    #[serde(default = "default_http2")]
    pub http2: bool,
}

fn default_http2() -> bool {
    true
}

impl ListenerConfig {
    pub fn new(name: impl Into<String>, transport: TransportKind, bind_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport,
            bind_address: bind_address.into(),
            http2: true,
        }
    }
}

/// TLS configuration for encrypted listeners.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// When a connection gets an advertisement.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
    /// Every eligible response carries `Alt-Svc`.
    #[default]
    EveryResponse,
    /// Only the first eligible response on each connection.
    FirstPerConnection,
}

/// Alt-Svc advertisement configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AltSvcConfig {
    /// Advertise HTTP/3 endpoints at all.
    pub enabled: bool,

    /// Freshness lifetime sent as `ma`, in seconds.
    pub max_age_secs: u64,

    pub mode: AdvertiseMode,

    /// Also try a connection-level ALTSVC frame on HTTP/2.
    pub h2_altsvc_frame: bool,
}

impl Default for AltSvcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 86_400,
            mode: AdvertiseMode::EveryResponse,
            h2_altsvc_frame: false,
        }
    }
}

/// Connection and request size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections per TCP endpoint (backpressure).
    pub max_connections: usize,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// TLS handshake timeout in seconds.
    pub handshake_secs: u64,

    /// How long a draining endpoint waits for in-flight connections.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            handshake_secs: 10,
            drain_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
