//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection                 Incoming QUIC connection
//!     → listener.rs (accept, limits)          → quic.rs (endpoint, transport limits)
//!     → tls.rs (optional TLS handshake)       → tls.rs (h3 ALPN config)
//!     → connection.rs (ConnectionInfo, tracking)
//!     → hand off to http::tcp / http::h3
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so draining endpoints can wait for it
//! - One certificate chain, ALPN list chosen per endpoint

pub mod connection;
pub mod listener;
pub mod quic;
pub mod tls;

pub use connection::{ConnectionError, ConnectionId, ConnectionInfo, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use tls::{TlsError, TlsMaterial};
