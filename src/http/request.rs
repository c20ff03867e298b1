//! Per-request metadata.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Expose the connection's negotiated protocol and security to handlers
//!
//! # Design Decisions
//! - Built by the dispatcher before the application runs, never after
//! - Read-only: handlers extract a clone, nothing writes back

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::net::connection::{ConnectionId, ConnectionInfo};
use crate::protocol::{ProtocolVersion, TransportSecurity};

/// Header carrying the request ID on responses.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Immutable facts about the request being handled.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    request_id: Uuid,
    #[serde(serialize_with = "serialize_connection_id")]
    connection_id: ConnectionId,
    endpoint: Arc<str>,
    protocol: ProtocolVersion,
    security: TransportSecurity,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    server_name: Option<Arc<str>>,
}

fn serialize_connection_id<S: serde::Serializer>(id: &ConnectionId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(id.as_u64())
}

impl RequestContext {
    pub fn new(conn: &ConnectionInfo) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            connection_id: conn.id(),
            endpoint: Arc::clone(conn.endpoint()),
            protocol: conn.protocol(),
            security: conn.security(),
            local_addr: conn.local_addr(),
            remote_addr: conn.remote_addr(),
            server_name: conn.server_name_arc(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `"HTTP/1.1"`, `"HTTP/2"` or `"HTTP/3"`.
    pub fn protocol(&self) -> &'static str {
        self.protocol.as_str()
    }

    pub fn version(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn security(&self) -> TransportSecurity {
        self.security
    }

    pub fn is_secure(&self) -> bool {
        self.security.is_secure()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// TLS SNI sent by the client, if any.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "request context missing"))
    }
}
