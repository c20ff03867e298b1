//! Default application: reports how the request reached the gateway.

use axum::http::Uri;
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;

use crate::http::request::RequestContext;

#[derive(Debug, Serialize)]
pub struct ProtocolReport {
    pub protocol: &'static str,
    pub secure: bool,
    pub path: String,
    pub endpoint: String,
}

/// Router answering every path with a [`ProtocolReport`].
pub fn default_app() -> Router {
    Router::new()
        .route("/", any(report))
        .route("/{*path}", any(report))
}

async fn report(ctx: RequestContext, uri: Uri) -> Json<ProtocolReport> {
    Json(ProtocolReport {
        protocol: ctx.protocol(),
        secure: ctx.is_secure(),
        path: uri.path().to_string(),
        endpoint: ctx.endpoint().to_string(),
    })
}
