//! HTTP/1.1 and HTTP/2 over TCP.
//!
//! # Data Flow
//! ```text
//! accept (bounded) → TLS handshake (tls endpoints, with timeout)
//!     → classify (ALPN) → ConnectionInfo
//!     → hyper http1 or http2 connection, explicitly by ProtocolVersion
//!     → every request through Dispatcher
//! ```
//!
//! Cleartext endpoints speak HTTP/1.1 only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper::server::conn::{http1, http2};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulConnection;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::altsvc::HyperH2FrameSink;
use crate::http::dispatch::{DispatchError, Dispatcher};
use crate::listeners::coordinator::{stop_requested, EndpointContext};
use crate::net::connection::{ConnectionError, ConnectionInfo};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::protocol::{classify, ProtocolVersion, TransportFacts, TransportSecurity};

/// Accept until `stop` flips, then return (dropping the listening socket).
pub(crate) async fn serve(
    listener: Listener,
    tls: Option<Arc<rustls::ServerConfig>>,
    context: EndpointContext,
    mut stop: watch::Receiver<bool>,
) {
    let acceptor = tls.map(TlsAcceptor::from);

    loop {
        let (stream, remote_addr, permit) = tokio::select! {
            _ = stop_requested(&mut stop) => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(endpoint = %context.name, error = %e, "Accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        let guard = context.tracker.track();
        let context = context.clone();
        let acceptor = acceptor.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let endpoint = Arc::clone(&context.name);
            if let Err(e) = handle_connection(stream, remote_addr, acceptor, context, stop).await {
                match &e {
                    ConnectionError::Http(_) | ConnectionError::Io(_) => {
                        tracing::debug!(endpoint = %endpoint, peer_addr = %remote_addr, error = %e, "Connection closed with error");
                    }
                    _ => {
                        metrics::record_rejected(e.reason());
                        tracing::warn!(endpoint = %endpoint, peer_addr = %remote_addr, error = %e, "Connection rejected");
                    }
                }
            }
        });
    }

    tracing::info!(endpoint = %context.name, "Stopped accepting TCP connections");
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    context: EndpointContext,
    stop: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let local_addr = stream.local_addr().unwrap_or(context.local_addr);
    let _ = stream.set_nodelay(true);

    let Some(acceptor) = acceptor else {
        let protocol = classify(TransportFacts::Plaintext)?;
        let info = ConnectionInfo::new(
            Arc::clone(&context.name),
            protocol,
            TransportSecurity::Plaintext,
            local_addr,
            remote_addr,
        );
        return serve_http(stream, info, context.dispatcher, stop).await;
    };

    let handshake = context.timeouts.handshake();
    let tls_stream = tokio::time::timeout(handshake, acceptor.accept(stream))
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout(handshake))?
        .map_err(ConnectionError::Handshake)?;

    let (protocol, server_name) = {
        let (_, session) = tls_stream.get_ref();
        let protocol = classify(TransportFacts::Tls {
            alpn: session.alpn_protocol(),
        })?;
        (protocol, session.server_name().map(str::to_string))
    };

    let info = ConnectionInfo::new(
        Arc::clone(&context.name),
        protocol,
        TransportSecurity::Encrypted,
        local_addr,
        remote_addr,
    )
    .with_server_name(server_name);

    serve_http(tls_stream, info, context.dispatcher, stop).await
}

async fn serve_http<S>(
    stream: S,
    info: ConnectionInfo,
    dispatcher: Arc<Dispatcher>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let info = Arc::new(info);
    tracing::debug!(
        connection_id = %info.id(),
        protocol = %info.protocol(),
        peer_addr = %info.remote_addr(),
        sni = ?info.server_name(),
        "Connection classified"
    );

    let service = {
        let info = Arc::clone(&info);
        let dispatcher = Arc::clone(&dispatcher);
        service_fn(move |request: Request<Incoming>| {
            let info = Arc::clone(&info);
            let dispatcher = Arc::clone(&dispatcher);
            async move { respond(&dispatcher, &info, request.map(Body::new)).await }
        })
    };

    let io = TokioIo::new(stream);
    match info.protocol() {
        ProtocolVersion::Http11 => {
            let conn = http1::Builder::new().keep_alive(true).serve_connection(io, service);
            drive(conn, &mut stop).await
        }
        ProtocolVersion::Http2 => {
            dispatcher.announce(&info, &HyperH2FrameSink);
            let conn = http2::Builder::new(TokioExecutor::new()).serve_connection(io, service);
            drive(conn, &mut stop).await
        }
        ProtocolVersion::Http3 => Err(ConnectionError::H3("HTTP/3 negotiated over TCP".into())),
    }
}

async fn respond(
    dispatcher: &Dispatcher,
    info: &ConnectionInfo,
    request: Request<Body>,
) -> Result<Response, DispatchError> {
    match dispatcher.dispatch(info, request).await {
        Ok(response) => Ok(response),
        // Returning the error makes hyper close an HTTP/1.1 connection. On
        // HTTP/2 only the stream is reset and the connection stays up.
        Err(e) if e.is_fault() => Err(e),
        Err(e) => Ok(e.into_response()),
    }
}

/// Run a connection to completion, switching to graceful shutdown on drain.
async fn drive<C>(conn: C, stop: &mut watch::Receiver<bool>) -> Result<(), ConnectionError>
where
    C: GracefulConnection<Error = hyper::Error>,
{
    tokio::pin!(conn);
    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => return result.map_err(ConnectionError::from),
            _ = stop_requested(stop), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
