//! Connection classification.
//!
//! # Responsibilities
//! - Map transport-negotiated facts to exactly one ProtocolVersion
//! - Reject connections whose ALPN result cannot be mapped
//!
//! # Rules
//! ```text
//! QUIC                         → HTTP/3
//! TLS, ALPN "h2"               → HTTP/2
//! TLS, ALPN absent/"http/1.x"  → HTTP/1.1
//! TLS, any other ALPN          → reject
//! plaintext TCP                → HTTP/1.1 (no h2c)
//! ```

use thiserror::Error;

use crate::protocol::{ProtocolVersion, TransportSecurity};

pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";
pub const ALPN_HTTP10: &[u8] = b"http/1.0";
pub const ALPN_H3: &[u8] = b"h3";

/// What the transport learned about a connection before any HTTP bytes were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFacts<'a> {
    /// Accepted by a QUIC endpoint.
    Quic,
    /// TCP + TLS with the ALPN protocol the handshake settled on.
    Tls { alpn: Option<&'a [u8]> },
    /// TCP without TLS.
    Plaintext,
}

impl TransportFacts<'_> {
    pub fn security(&self) -> TransportSecurity {
        match self {
            Self::Plaintext => TransportSecurity::Plaintext,
            Self::Quic | Self::Tls { .. } => TransportSecurity::Encrypted,
        }
    }
}

/// A connection could not be mapped onto exactly one protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("unexpected ALPN protocol {0:?} on TCP/TLS")]
    UnexpectedAlpn(String),
}

/// Classify a newly accepted connection.
pub fn classify(facts: TransportFacts<'_>) -> Result<ProtocolVersion, ClassificationError> {
    match facts {
        TransportFacts::Quic => Ok(ProtocolVersion::Http3),
        TransportFacts::Tls { alpn: Some(ALPN_H2) } => Ok(ProtocolVersion::Http2),
        TransportFacts::Tls { alpn: None }
        | TransportFacts::Tls { alpn: Some(ALPN_HTTP11) }
        | TransportFacts::Tls { alpn: Some(ALPN_HTTP10) } => Ok(ProtocolVersion::Http11),
        TransportFacts::Tls { alpn: Some(other) } => Err(ClassificationError::UnexpectedAlpn(
            String::from_utf8_lossy(other).into_owned(),
        )),
        TransportFacts::Plaintext => Ok(ProtocolVersion::Http11),
    }
}
