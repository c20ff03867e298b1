//! TLS configuration and certificate loading.
//!
//! One certificate chain serves every encrypted endpoint. Each TLS listener
//! gets its own `rustls::ServerConfig` because the ALPN list depends on
//! whether HTTP/2 is enabled; QUIC endpoints offer `h3` only.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::TlsConfig;
use crate::protocol::classifier::{ALPN_H2, ALPN_H3, ALPN_HTTP10, ALPN_HTTP11};

/// Errors raised while loading certificates or building TLS configs.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in PEM input")]
    NoCertificates,
    #[error("no private key found in PEM input")]
    NoPrivateKey,
    #[error("malformed PEM input: {0}")]
    Pem(#[source] std::io::Error),
    #[error("rustls rejected the configuration: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("certificate cannot be used for QUIC: {0}")]
    Quic(String),
}

/// Certificate chain and private key shared by all encrypted endpoints.
#[derive(Debug)]
pub struct TlsMaterial {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for TlsMaterial {
    fn clone(&self) -> Self {
        Self {
            certs: self.certs.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl TlsMaterial {
    /// Parse an in-memory PEM certificate chain and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(TlsError::Pem)?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificates);
        }

        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(TlsError::Pem)?
            .ok_or(TlsError::NoPrivateKey)?;

        Ok(Self { certs, key })
    }

    /// Load certificate chain and key from the files named in `[tls]`.
    pub fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let certs = {
            let mut reader = open(Path::new(&config.cert_path))?;
            rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .map_err(TlsError::Pem)?
        };
        if certs.is_empty() {
            return Err(TlsError::NoCertificates);
        }

        let key = {
            let mut reader = open(Path::new(&config.key_path))?;
            rustls_pemfile::private_key(&mut reader)
                .map_err(TlsError::Pem)?
                .ok_or(TlsError::NoPrivateKey)?
        };

        tracing::info!(
            cert_path = %config.cert_path,
            chain_len = certs.len(),
            "TLS material loaded"
        );

        Ok(Self { certs, key })
    }

    /// Server config for a TLS-over-TCP endpoint.
    ///
    /// Offers `h2` first when HTTP/2 is enabled, then HTTP/1.x.
    pub fn tcp_server_config(&self, http2: bool) -> Result<Arc<rustls::ServerConfig>, TlsError> {
        let mut alpn = Vec::with_capacity(3);
        if http2 {
            alpn.push(ALPN_H2.to_vec());
        }
        alpn.push(ALPN_HTTP11.to_vec());
        alpn.push(ALPN_HTTP10.to_vec());

        let config = self.server_config(alpn)?;
        Ok(Arc::new(config))
    }

    /// Server config for a QUIC endpoint, offering `h3` only.
    pub fn quic_server_config(&self) -> Result<quinn::ServerConfig, TlsError> {
        let mut config = self.server_config(vec![ALPN_H3.to_vec()])?;
        config.max_early_data_size = 0;

        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(config)
            .map_err(|e| TlsError::Quic(e.to_string()))?;
        Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
    }

    fn server_config(&self, alpn: Vec<Vec<u8>>) -> Result<rustls::ServerConfig, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())?;
        config.alpn_protocols = alpn;
        Ok(config)
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}
