//! Operator API: endpoint state, advertisement preview and manual drains.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::http::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::listeners::Coordinator;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub coordinator: Arc<Coordinator>,
    pub dispatcher: Arc<Dispatcher>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(coordinator: Arc<Coordinator>, dispatcher: Arc<Dispatcher>, api_key: &str) -> Self {
        Self {
            coordinator,
            dispatcher,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/endpoints", get(get_endpoints))
        .route("/admin/altsvc", get(get_altsvc))
        .route("/admin/endpoints/{name}/drain", post(drain_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(addr: SocketAddr, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::altsvc::AltSvcPolicy;
    use crate::config::{ListenerConfig, TransportKind};
    use crate::http::default_app;
    use crate::listeners::{CoordinatorSettings, EndpointRegistry, EndpointState};

    const KEY: &str = "test-key";

    fn state() -> AdminState {
        let dispatcher = Arc::new(Dispatcher::new(
            default_app(),
            Arc::new(EndpointRegistry::new()),
            AltSvcPolicy::default(),
        ));
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&dispatcher), CoordinatorSettings::default()));
        AdminState::new(coordinator, dispatcher, KEY)
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_key() {
        let app = setup_admin_router(state());
        let response = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_endpoints_and_drains() {
        let state = state();
        let coordinator = Arc::clone(&state.coordinator);
        coordinator
            .add(&ListenerConfig::new("web", TransportKind::Tcp, "127.0.0.1:0"))
            .await
            .unwrap();
        let app = setup_admin_router(state);

        let response = app.clone().oneshot(request("GET", "/admin/endpoints", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let endpoints = json(response).await;
        assert_eq!(endpoints[0]["name"], "web");
        assert_eq!(endpoints[0]["state"], "bound");

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/endpoints/web/drain", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(coordinator
            .snapshot()
            .get("web")
            .map_or(true, |e| e.state == EndpointState::Draining));

        let response = app
            .oneshot(request("POST", "/admin/endpoints/web/drain", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn altsvc_reports_policy_without_quic() {
        let app = setup_admin_router(state());
        let response = app.oneshot(request("GET", "/admin/altsvc", Some(KEY))).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["mode"], "every_response");
        assert_eq!(body["max_age_secs"], 86400);
        assert!(body["header"].is_null());
    }
}
