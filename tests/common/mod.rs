//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use altsvc_gateway::config::{AltSvcConfig, GatewayConfig, ListenerConfig, TransportKind};
use altsvc_gateway::http::{default_app, GatewayServer};
use altsvc_gateway::net::TlsMaterial;
use bytes::{Buf, BytesMut};
use rustls::pki_types::CertificateDer;

/// Self-signed certificate for `localhost`.
pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: CertificateDer<'static>,
}

impl TestCert {
    pub fn generate() -> Self {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            der: cert.der().clone(),
        }
    }

    pub fn material(&self) -> TlsMaterial {
        TlsMaterial::from_pem(self.cert_pem.as_bytes(), self.key_pem.as_bytes()).unwrap()
    }
}

/// A started gateway plus the ports it ended up on.
pub struct TestGateway {
    pub server: GatewayServer,
    pub cert: TestCert,
}

impl TestGateway {
    pub fn addr(&self, name: &str) -> SocketAddr {
        self.server.coordinator().snapshot().get(name).unwrap().local_addr
    }

    pub async fn stop(&self) {
        self.server.coordinator().shutdown().await;
    }
}

/// Start a gateway with `listeners` already bound.
pub async fn start_gateway(listeners: Vec<ListenerConfig>, alt_svc: AltSvcConfig) -> TestGateway {
    start_gateway_with_app(listeners, alt_svc, default_app()).await
}

/// Like [`start_gateway`], serving `app` instead of the default report.
pub async fn start_gateway_with_app(
    listeners: Vec<ListenerConfig>,
    alt_svc: AltSvcConfig,
    app: axum::Router,
) -> TestGateway {
    let cert = TestCert::generate();
    let config = GatewayConfig {
        listeners,
        alt_svc,
        ..GatewayConfig::default()
    };
    let server = GatewayServer::new(config, app, Some(cert.material()));
    let failures = server.start().await;
    assert!(failures.is_empty(), "bind failures: {failures:?}");
    TestGateway { server, cert }
}

/// TLS (`https`) and QUIC (`h3`) endpoints sharing one port number.
pub async fn start_dual_stack(alt_svc: AltSvcConfig) -> (TestGateway, u16) {
    start_dual_stack_with_app(alt_svc, default_app()).await
}

pub async fn start_dual_stack_with_app(alt_svc: AltSvcConfig, app: axum::Router) -> (TestGateway, u16) {
    let gateway = start_gateway_with_app(
        vec![ListenerConfig::new("https", TransportKind::Tls, "127.0.0.1:0")],
        alt_svc,
        app,
    )
    .await;
    let port = gateway.addr("https").port();
    gateway
        .server
        .coordinator()
        .add(&ListenerConfig::new("h3", TransportKind::Quic, format!("127.0.0.1:{port}")))
        .await
        .unwrap();
    (gateway, port)
}

fn reqwest_builder(cert: &TestCert, addr: SocketAddr) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(cert.cert_pem.as_bytes()).unwrap())
        .resolve("localhost", addr)
}

pub fn http1_client(cert: &TestCert, addr: SocketAddr) -> reqwest::Client {
    reqwest_builder(cert, addr).http1_only().build().unwrap()
}

pub fn http2_client(cert: &TestCert, addr: SocketAddr) -> reqwest::Client {
    reqwest_builder(cert, addr).http2_prior_knowledge().build().unwrap()
}

/// Response seen by the HTTP/3 client.
pub struct H3Response {
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub body: serde_json::Value,
}

/// Send one GET over HTTP/3 and collect the JSON body.
pub async fn h3_get(cert: &TestCert, addr: SocketAddr, path: &str) -> Result<H3Response, Box<dyn std::error::Error>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.der.clone())?;
    let mut tls = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    tls.alpn_protocols = vec![b"h3".to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(tls)?;
    let mut endpoint = quinn::Endpoint::client("127.0.0.1:0".parse()?)?;
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic)));

    let connection = endpoint.connect(addr, "localhost")?.await?;
    let (mut driver, mut send_request) = h3::client::new(h3_quinn::Connection::new(connection)).await?;
    let drive = tokio::spawn(async move {
        let _ = futures_util::future::poll_fn(|cx| driver.poll_close(cx)).await;
    });

    let request = http::Request::get(format!("https://localhost:{}{}", addr.port(), path)).body(())?;
    let mut stream = send_request.send_request(request).await?;
    stream.finish().await?;

    let response = stream.recv_response().await?;
    let mut body = BytesMut::new();
    while let Some(mut chunk) = stream.recv_data().await? {
        let bytes = chunk.copy_to_bytes(chunk.remaining());
        body.extend_from_slice(&bytes);
    }

    drop(stream);
    drop(send_request);
    drive.abort();
    endpoint.close(0u32.into(), b"done");

    Ok(H3Response {
        status: response.status(),
        headers: response.headers().clone(),
        body: serde_json::from_slice(&body)?,
    })
}
