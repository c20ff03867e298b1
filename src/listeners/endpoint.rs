//! Listener endpoint model and state machine.
//!
//! # State Transitions
//! ```text
//! Unbound → Binding → Bound → Draining → Unbound
//!              │
//!              └──(bind failure)──→ Unbound
//! ```
//!
//! Only `Bound` endpoints may be advertised. `Unbound` endpoints are not
//! kept in the published set at all.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolVersion;

static ENDPOINT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a bound (or binding) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointId(u64);

impl EndpointId {
    pub fn new() -> Self {
        Self(ENDPOINT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Transport a listener terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP, HTTP/1.1 only.
    Tcp,
    /// TCP + TLS, HTTP/1.1 and (via ALPN) HTTP/2.
    Tls,
    /// UDP + QUIC, HTTP/3.
    Quic,
}

/// Socket family underneath a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Tcp,
    Udp,
}

impl TransportKind {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::Tcp | Self::Tls => ProtocolFamily::Tcp,
            Self::Quic => ProtocolFamily::Udp,
        }
    }

    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Tls | Self::Quic)
    }

    /// Versions a connection accepted on this transport may negotiate.
    pub fn versions(&self, http2: bool) -> &'static [ProtocolVersion] {
        match self {
            Self::Tcp => &[ProtocolVersion::Http11],
            Self::Tls if http2 => &[ProtocolVersion::Http11, ProtocolVersion::Http2],
            Self::Tls => &[ProtocolVersion::Http11],
            Self::Quic => &[ProtocolVersion::Http3],
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
            Self::Quic => write!(f, "quic"),
        }
    }
}

/// Lifecycle state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Unbound,
    Binding,
    Bound,
    /// No new connections; existing ones finish.
    Draining,
}

impl EndpointState {
    pub fn can_transition_to(&self, next: EndpointState) -> bool {
        use EndpointState::*;
        matches!(
            (self, next),
            (Unbound, Binding) | (Binding, Bound) | (Binding, Unbound) | (Bound, Draining) | (Draining, Unbound)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Binding => "binding",
            Self::Bound => "bound",
            Self::Draining => "draining",
        }
    }
}

/// Immutable view of one endpoint inside a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointView {
    pub id: EndpointId,
    pub name: Arc<str>,
    pub transport: TransportKind,
    pub family: ProtocolFamily,
    /// Configured address while binding, actual local address once bound.
    pub local_addr: SocketAddr,
    pub versions: &'static [ProtocolVersion],
    pub state: EndpointState,
}

impl EndpointView {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_bound_h3(&self) -> bool {
        self.state == EndpointState::Bound && self.versions.contains(&ProtocolVersion::Http3)
    }
}
