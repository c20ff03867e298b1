use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::AdminState;
use crate::altsvc::advertisement::render_field_value;
use crate::config::AdvertiseMode;
use crate::listeners::{CoordinatorError, EndpointState, EndpointView};
use crate::protocol::ProtocolVersion;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub endpoints_bound: usize,
    pub endpoints_draining: usize,
}

#[derive(Serialize)]
pub struct AltSvcStatus {
    pub enabled: bool,
    pub mode: AdvertiseMode,
    pub max_age_secs: u64,
    pub h2_altsvc_frame: bool,
    /// Field value an HTTP/1.1 or HTTP/2 response would carry right now.
    pub header: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.coordinator.snapshot();
    let count = |wanted: EndpointState| snapshot.iter().filter(|e| e.state == wanted).count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if count(EndpointState::Bound) > 0 { "serving" } else { "idle" },
        uptime_secs: state.started.elapsed().as_secs(),
        endpoints_bound: count(EndpointState::Bound),
        endpoints_draining: count(EndpointState::Draining),
    })
}

pub async fn get_endpoints(State(state): State<AdminState>) -> Json<Vec<EndpointView>> {
    Json(state.coordinator.snapshot().iter().cloned().collect())
}

pub async fn get_altsvc(State(state): State<AdminState>) -> Json<AltSvcStatus> {
    let policy = state.dispatcher.policy();
    let ads = state.dispatcher.advertisements(ProtocolVersion::Http11, None);

    Json(AltSvcStatus {
        enabled: policy.is_enabled(),
        mode: policy.mode(),
        max_age_secs: policy.max_age_secs(),
        h2_altsvc_frame: policy.h2_frame_enabled(),
        header: render_field_value(&ads),
    })
}

pub async fn drain_endpoint(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    match state.coordinator.drain(&name).await {
        Ok(handle) => {
            tracing::info!(endpoint = %name, "Drain requested via admin API");
            tokio::spawn(handle.finished());
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "endpoint": name, "state": "draining" })),
            )
                .into_response()
        }
        Err(e @ CoordinatorError::UnknownEndpoint(_)) => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
    }
}
