//! Protocol version model and connection classification.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → transport facts (QUIC, or TLS + ALPN result, or plaintext)
//!     → classifier.rs (exactly one ProtocolVersion, or reject)
//!     → ConnectionInfo (immutable for the connection lifetime)
//!     → every request on that connection sees the same version
//! ```
//!
//! # Design Decisions
//! - One enum tag for all three stacks; behaviour branches on the tag
//! - HTTP/1.0 collapses into the HTTP/1.1 handling path
//! - Ambiguous transports are rejected, never guessed

pub mod classifier;

use serde::{Serialize, Serializer};

pub use classifier::{classify, ClassificationError, TransportFacts};

/// Negotiated HTTP protocol version of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    /// Wire-style name exposed to application code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http11 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
            Self::Http3 => "HTTP/3",
        }
    }

    /// Map a codec-reported request version onto the connection version set.
    pub fn from_http_version(version: http::Version) -> Option<Self> {
        match version {
            http::Version::HTTP_10 | http::Version::HTTP_11 => Some(Self::Http11),
            http::Version::HTTP_2 => Some(Self::Http2),
            http::Version::HTTP_3 => Some(Self::Http3),
            _ => None,
        }
    }

    /// Whether a request carrying `version` may travel on a connection of this version.
    pub fn accepts(&self, version: http::Version) -> bool {
        Self::from_http_version(version) == Some(*self)
    }

    /// Whether clients on this version can be told about a better one.
    pub fn can_upgrade(&self) -> bool {
        !matches!(self, Self::Http3)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether the bytes of a connection are encrypted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    Plaintext,
    /// TLS over TCP, or QUIC's built-in encryption.
    Encrypted,
}

impl TransportSecurity {
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Encrypted)
    }
}
