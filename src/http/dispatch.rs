//! Protocol-aware request dispatch.
//!
//! # Responsibilities
//! - Reject requests whose HTTP version contradicts the connection
//! - Attach [`RequestContext`] and call the application exactly once
//! - Surface application panics instead of masking them
//! - Apply the Alt-Svc policy to every successful response
//!
//! The same dispatcher serves HTTP/1.1, HTTP/2 and HTTP/3; transports only
//! differ in how they report a fault back to the peer.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::FutureExt;
use http::{HeaderValue, Request, StatusCode};
use thiserror::Error;
use tower::ServiceExt;

use crate::altsvc::{AltSvcAdvertisement, AltSvcEmitter, AltSvcFrameSink, AltSvcPolicy, FrameOutcome};
use crate::config::AdvertiseMode;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::listeners::registry::EndpointRegistry;
use crate::net::connection::ConnectionInfo;
use crate::observability::metrics;
use crate::protocol::ProtocolVersion;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{request:?} request on a {connection} connection")]
    VersionMismatch {
        connection: ProtocolVersion,
        request: http::Version,
    },
    #[error("application panicked handling request {request_id}: {message}")]
    ApplicationFault { request_id: uuid::Uuid, message: String },
}

impl DispatchError {
    /// Faults abort the exchange at the transport level; other errors are
    /// answered with a status code.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::ApplicationFault { .. })
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::VersionMismatch { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            Self::ApplicationFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Routes classified requests to the application.
pub struct Dispatcher {
    app: Router,
    registry: Arc<EndpointRegistry>,
    policy: ArcSwap<AltSvcPolicy>,
    emitter: AltSvcEmitter,
}

impl Dispatcher {
    pub fn new(app: Router, registry: Arc<EndpointRegistry>, policy: AltSvcPolicy) -> Self {
        Self {
            app,
            registry,
            policy: ArcSwap::from_pointee(policy),
            emitter: AltSvcEmitter::new(),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> Arc<AltSvcPolicy> {
        self.policy.load_full()
    }

    /// Swap the advertisement policy; in-flight requests keep the old one.
    pub fn set_policy(&self, policy: AltSvcPolicy) {
        self.policy.store(Arc::new(policy));
    }

    /// Advertisements a response on such a connection would carry right now.
    pub fn advertisements(
        &self,
        protocol: ProtocolVersion,
        local_addr: Option<SocketAddr>,
    ) -> Vec<AltSvcAdvertisement> {
        self.policy
            .load()
            .evaluate(protocol, local_addr, &self.registry.snapshot())
    }

    /// Offer a connection-level ALTSVC frame when the policy asks for one.
    ///
    /// Called once, at connection start, against the endpoints bound at that
    /// moment. Endpoints bound later reach open connections only through the
    /// `Alt-Svc` header.
    pub fn announce(&self, conn: &ConnectionInfo, sink: &dyn AltSvcFrameSink) -> FrameOutcome {
        let policy = self.policy.load();
        if !policy.h2_frame_enabled() {
            return FrameOutcome::Skipped;
        }
        let ads = policy.evaluate(conn.protocol(), Some(conn.local_addr()), &self.registry.snapshot());
        self.emitter.announce(conn, &ads, sink)
    }

    pub async fn dispatch(&self, conn: &ConnectionInfo, mut request: Request<Body>) -> Result<Response, DispatchError> {
        let start = Instant::now();
        let protocol = conn.protocol();

        if !protocol.accepts(request.version()) {
            tracing::debug!(
                connection_id = %conn.id(),
                protocol = %protocol,
                version = ?request.version(),
                "Request version does not match connection"
            );
            metrics::record_request(protocol, StatusCode::HTTP_VERSION_NOT_SUPPORTED.as_u16(), start);
            return Err(DispatchError::VersionMismatch {
                connection: protocol,
                request: request.version(),
            });
        }

        let context = RequestContext::new(conn);
        let request_id = context.request_id();
        request.extensions_mut().insert(context);

        tracing::debug!(
            request_id = %request_id,
            connection_id = %conn.id(),
            protocol = %protocol,
            method = %request.method(),
            path = %request.uri().path(),
            "Dispatching request"
        );

        let outcome = AssertUnwindSafe(self.app.clone().oneshot(request))
            .catch_unwind()
            .await;
        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(never)) => match never {},
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    request_id = %request_id,
                    connection_id = %conn.id(),
                    protocol = %protocol,
                    panic = %message,
                    "Application fault"
                );
                metrics::record_request(protocol, StatusCode::INTERNAL_SERVER_ERROR.as_u16(), start);
                return Err(DispatchError::ApplicationFault { request_id, message });
            }
        };

        self.advertise(conn, &mut response);

        if !response.headers().contains_key(X_REQUEST_ID) {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(X_REQUEST_ID, value);
            }
        }

        metrics::record_request(protocol, response.status().as_u16(), start);
        Ok(response)
    }

    fn advertise(&self, conn: &ConnectionInfo, response: &mut Response) {
        let protocol = conn.protocol();
        let policy = self.policy.load();
        let mut ads = policy.evaluate(protocol, Some(conn.local_addr()), &self.registry.snapshot());

        if !ads.is_empty() && policy.mode() == AdvertiseMode::FirstPerConnection && !conn.mark_advertised() {
            ads.clear();
        }

        if self.emitter.apply_header(protocol, &ads, response.headers_mut()) {
            metrics::record_advertisement(protocol);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
