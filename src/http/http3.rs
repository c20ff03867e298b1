//! HTTP/3 over QUIC.
//!
//! # Data Flow
//! ```text
//! quinn accept → QUIC handshake (ALPN "h3")
//!     → classify → ConnectionInfo
//!     → h3 server connection → request streams
//!     → Dispatcher (same path as TCP)
//! ```
//!
//! Draining refuses new QUIC connections, sends GOAWAY on live ones and
//! closes whatever is still open once the drain timeout passes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use bytes::{Buf, Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::{Request, Response, StatusCode};
use quinn::VarInt;
use tokio::sync::watch;

use crate::http::dispatch::DispatchError;
use crate::listeners::coordinator::{stop_requested, EndpointContext};
use crate::net::connection::{ConnectionError, ConnectionInfo};
use crate::observability::metrics;
use crate::protocol::{classify, TransportFacts, TransportSecurity};

type RequestStream = h3::server::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

/// Accept QUIC connections until `stop` flips, then drain them.
pub(crate) async fn serve(endpoint: quinn::Endpoint, context: EndpointContext, mut stop: watch::Receiver<bool>) {
    loop {
        let incoming = tokio::select! {
            _ = stop_requested(&mut stop) => break,
            incoming = endpoint.accept() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
        };

        let remote_addr = incoming.remote_address();
        let guard = context.tracker.track();
        let context = context.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let endpoint = Arc::clone(&context.name);
            if let Err(e) = handle_connection(incoming, context, stop).await {
                match &e {
                    ConnectionError::Quic(_) | ConnectionError::H3(_) => {
                        tracing::debug!(endpoint = %endpoint, peer_addr = %remote_addr, error = %e, "QUIC connection closed with error");
                    }
                    _ => {
                        metrics::record_rejected(e.reason());
                        tracing::warn!(endpoint = %endpoint, peer_addr = %remote_addr, error = %e, "QUIC connection rejected");
                    }
                }
            }
        });
    }

    endpoint.set_server_config(None);
    tracing::info!(endpoint = %context.name, "Stopped accepting QUIC connections");

    let drain = context.timeouts.drain();
    if !context.tracker.wait_idle_for(drain).await {
        tracing::warn!(
            endpoint = %context.name,
            active = context.tracker.active_count(),
            "Drain timeout elapsed, closing QUIC connections"
        );
        endpoint.close(VarInt::from_u32(0), b"draining");
    }
    endpoint.wait_idle().await;
}

async fn handle_connection(
    incoming: quinn::Incoming,
    context: EndpointContext,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let handshake = context.timeouts.handshake();
    let connecting = incoming.accept()?;
    let connection = tokio::time::timeout(handshake, connecting)
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout(handshake))??;

    let protocol = classify(TransportFacts::Quic)?;
    let server_name = connection
        .handshake_data()
        .and_then(|data| data.downcast::<quinn::crypto::rustls::HandshakeData>().ok())
        .and_then(|data| data.server_name);
    let local_addr = SocketAddr::new(
        connection.local_ip().unwrap_or(context.local_addr.ip()),
        context.local_addr.port(),
    );

    let info = Arc::new(
        ConnectionInfo::new(
            Arc::clone(&context.name),
            protocol,
            TransportSecurity::Encrypted,
            local_addr,
            connection.remote_address(),
        )
        .with_server_name(server_name),
    );
    tracing::debug!(
        connection_id = %info.id(),
        protocol = %info.protocol(),
        peer_addr = %info.remote_addr(),
        sni = ?info.server_name(),
        "Connection classified"
    );

    let mut h3_conn = h3::server::Connection::<_, Bytes>::new(h3_quinn::Connection::new(connection))
        .await
        .map_err(h3_error)?;

    let mut draining = false;
    loop {
        let accepted = tokio::select! {
            accepted = h3_conn.accept() => Some(accepted),
            _ = stop_requested(&mut stop), if !draining => None,
        };

        let resolver = match accepted {
            None => {
                draining = true;
                h3_conn.shutdown(0).await.map_err(h3_error)?;
                continue;
            }
            Some(Ok(Some(resolver))) => resolver,
            Some(Ok(None)) => return Ok(()),
            Some(Err(e)) => return Err(h3_error(e)),
        };

        let info = Arc::clone(&info);
        let context = context.clone();
        tokio::spawn(async move {
            let (request, stream) = match resolver.resolve_request().await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::debug!(connection_id = %info.id(), error = %e, "Failed to resolve HTTP/3 request");
                    return;
                }
            };
            if let Err(e) = handle_request(request, stream, &info, &context).await {
                tracing::debug!(connection_id = %info.id(), error = %e, "HTTP/3 stream closed with error");
            }
        });
    }
}

async fn handle_request(
    request: Request<()>,
    mut stream: RequestStream,
    info: &ConnectionInfo,
    context: &EndpointContext,
) -> Result<(), ConnectionError> {
    let mut body = BytesMut::new();
    while let Some(mut chunk) = stream.recv_data().await.map_err(h3_error)? {
        if body.len() + chunk.remaining() > context.max_body_size {
            let response = Response::builder()
                .status(StatusCode::PAYLOAD_TOO_LARGE)
                .body(())
                .map_err(|e| ConnectionError::H3(e.to_string()))?;
            stream.send_response(response).await.map_err(h3_error)?;
            return stream.finish().await.map_err(h3_error);
        }
        while chunk.has_remaining() {
            let part = chunk.chunk();
            let len = part.len();
            body.extend_from_slice(part);
            chunk.advance(len);
        }
    }

    let request = request.map(|()| Body::from(body.freeze()));
    let response = match context.dispatcher.dispatch(info, request).await {
        Ok(response) => response,
        Err(DispatchError::ApplicationFault { .. }) => {
            stream.stop_stream(h3::error::Code::H3_INTERNAL_ERROR);
            return Ok(());
        }
        Err(e) => axum::response::IntoResponse::into_response(e),
    };

    let (parts, mut body) = response.into_parts();
    stream
        .send_response(Response::from_parts(parts, ()))
        .await
        .map_err(h3_error)?;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(connection_id = %info.id(), error = %e, "Response body failed");
                stream.stop_stream(h3::error::Code::H3_INTERNAL_ERROR);
                return Ok(());
            }
        };
        match frame.into_data() {
            Ok(data) => stream.send_data(data).await.map_err(h3_error)?,
            Err(frame) => {
                if let Ok(trailers) = frame.into_trailers() {
                    stream.send_trailers(trailers).await.map_err(h3_error)?;
                }
            }
        }
    }

    stream.finish().await.map_err(h3_error)
}

fn h3_error(e: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::H3(e.to_string())
}
