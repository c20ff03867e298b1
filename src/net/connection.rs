//! Connection identity, negotiated facts and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry the immutable per-connection facts (version, security, addresses)
//! - Track live connections so a draining endpoint can wait for them
//! - Describe transport-boundary failures

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::{ClassificationError, ProtocolVersion, TransportSecurity};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Facts fixed when a connection is classified. Shared by all its requests.
#[derive(Debug)]
pub struct ConnectionInfo {
    id: ConnectionId,
    endpoint: Arc<str>,
    protocol: ProtocolVersion,
    security: TransportSecurity,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    server_name: Option<Arc<str>>,
    advertised: AtomicBool,
}

impl ConnectionInfo {
    pub fn new(
        endpoint: Arc<str>,
        protocol: ProtocolVersion,
        security: TransportSecurity,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            endpoint,
            protocol,
            security,
            local_addr,
            remote_addr,
            server_name: None,
            advertised: AtomicBool::new(false),
        }
    }

    /// Attach the TLS SNI value, if the client sent one.
    pub fn with_server_name(mut self, server_name: Option<String>) -> Self {
        self.server_name = server_name.map(Arc::from);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Arc<str> {
        &self.endpoint
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn security(&self) -> TransportSecurity {
        self.security
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub(crate) fn server_name_arc(&self) -> Option<Arc<str>> {
        self.server_name.clone()
    }

    /// Record that this connection has been sent an advertisement.
    ///
    /// Returns true only for the first call.
    pub fn mark_advertised(&self) -> bool {
        !self.advertised.swap(true, Ordering::AcqRel)
    }
}

/// Failures at the transport boundary, before or instead of dispatch.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("connection rejected: {0}")]
    Classification(#[from] ClassificationError),
    #[error("HTTP/1.1 or HTTP/2 connection error: {0}")]
    Http(#[from] hyper::Error),
    #[error("QUIC connection error: {0}")]
    Quic(#[from] quinn::ConnectionError),
    #[error("HTTP/3 error: {0}")]
    H3(String),
}

impl ConnectionError {
    /// Metric label for rejected connections.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Handshake(_) => "handshake",
            Self::HandshakeTimeout(_) => "handshake_timeout",
            Self::Classification(_) => "classification",
            Self::Http(_) => "http",
            Self::Quic(_) => "quic",
            Self::H3(_) => "h3",
        }
    }
}

/// Tracks active connections of one endpoint so draining can wait for them.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all tracked connections are closed.
    pub async fn wait_idle(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Wait for idle, giving up after `timeout`. Returns true if idle was reached.
    pub async fn wait_idle_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo::new(
            Arc::from("web"),
            ProtocolVersion::Http11,
            TransportSecurity::Plaintext,
            "127.0.0.1:8080".parse().unwrap(),
            "127.0.0.1:50000".parse().unwrap(),
        )
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_busy() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        assert!(!tracker.wait_idle_for(Duration::from_millis(150)).await);
        drop(guard);
        assert!(tracker.wait_idle_for(Duration::from_millis(500)).await);
    }

    #[test]
    fn advertised_flag_flips_once() {
        let info = info();
        assert!(info.mark_advertised());
        assert!(!info.mark_advertised());
        assert!(!info.mark_advertised());
    }

    #[test]
    fn server_name_is_optional() {
        assert_eq!(info().server_name(), None);
        let named = info().with_server_name(Some("localhost".into()));
        assert_eq!(named.server_name(), Some("localhost"));
        assert_eq!(named.endpoint().as_ref(), "web");
    }
}
