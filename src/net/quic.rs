//! QUIC endpoint setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{Endpoint, IdleTimeout, ServerConfig, TransportConfig, VarInt};

/// Per-connection limits applied to every QUIC endpoint.
#[derive(Debug, Clone, Copy)]
pub struct QuicLimits {
    pub idle_timeout: Duration,
    pub keep_alive: Duration,
    pub max_bidi_streams: u32,
}

impl Default for QuicLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(10),
            max_bidi_streams: 100,
        }
    }
}

/// Bind a UDP socket and start a QUIC server endpoint on it.
pub fn bind_endpoint(
    addr: SocketAddr,
    mut server_config: ServerConfig,
    limits: QuicLimits,
) -> std::io::Result<Endpoint> {
    let mut transport = TransportConfig::default();
    transport.keep_alive_interval(Some(limits.keep_alive));
    transport.max_concurrent_bidi_streams(VarInt::from_u32(limits.max_bidi_streams));
    let idle: IdleTimeout = limits.idle_timeout.try_into().map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "QUIC idle timeout out of range")
    })?;
    transport.max_idle_timeout(Some(idle));
    server_config.transport = Arc::new(transport);

    let endpoint = Endpoint::server(server_config, addr)?;
    tracing::info!(address = %endpoint.local_addr()?, "QUIC endpoint bound");
    Ok(endpoint)
}
