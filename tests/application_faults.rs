//! A panicking handler is a fault, not a response: each transport abandons
//! the exchange the way its protocol allows, and the gateway keeps serving.

use altsvc_gateway::config::AltSvcConfig;
use altsvc_gateway::http::{default_app, RequestContext};
use axum::routing::get;
use axum::Router;
use reqwest::Version;

mod common;

async fn boom() -> &'static str {
    panic!("handler exploded")
}

async fn peer(ctx: RequestContext) -> String {
    ctx.remote_addr().to_string()
}

fn faulty_app() -> Router {
    default_app()
        .route("/boom", get(boom))
        .route("/peer", get(peer))
}

#[tokio::test]
async fn http11_fault_closes_the_connection() {
    let (gateway, port) = common::start_dual_stack_with_app(AltSvcConfig::default(), faulty_app()).await;
    let client = common::http1_client(&gateway.cert, gateway.addr("https"));
    let url = |path: &str| format!("https://localhost:{port}{path}");

    let before = client.get(url("/peer")).send().await.unwrap();
    assert_eq!(before.version(), Version::HTTP_11);
    let before = before.text().await.unwrap();

    assert!(client.get(url("/boom")).send().await.is_err());

    let after = client.get(url("/peer")).send().await.unwrap();
    assert_eq!(after.status(), reqwest::StatusCode::OK);
    assert_ne!(after.text().await.unwrap(), before, "fault should have closed the connection");

    gateway.stop().await;
}

#[tokio::test]
async fn http2_fault_resets_only_the_stream() {
    let (gateway, port) = common::start_dual_stack_with_app(AltSvcConfig::default(), faulty_app()).await;
    let client = common::http2_client(&gateway.cert, gateway.addr("https"));
    let url = |path: &str| format!("https://localhost:{port}{path}");

    let before = client.get(url("/peer")).send().await.unwrap();
    assert_eq!(before.version(), Version::HTTP_2);
    let before = before.text().await.unwrap();

    assert!(client.get(url("/boom")).send().await.is_err());

    let after = client.get(url("/peer")).send().await.unwrap();
    assert_eq!(after.status(), reqwest::StatusCode::OK);
    assert_eq!(after.text().await.unwrap(), before, "connection should survive the reset");

    gateway.stop().await;
}

#[tokio::test]
async fn http3_fault_resets_the_stream() {
    let (gateway, _port) = common::start_dual_stack_with_app(AltSvcConfig::default(), faulty_app()).await;
    let addr = gateway.addr("h3");

    assert!(common::h3_get(&gateway.cert, addr, "/boom").await.is_err());

    let next = common::h3_get(&gateway.cert, addr, "/after").await.unwrap();
    assert_eq!(next.status, http::StatusCode::OK);
    assert_eq!(next.body["protocol"], "HTTP/3");

    gateway.stop().await;
}
