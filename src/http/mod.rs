//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection ─→ tcp.rs (hyper http1 / http2)  ─┐
//!                                                       ├→ dispatch.rs → application
//! QUIC connection    ─→ http3.rs (h3 request streams)  ─┘        ↓
//!                                                        Alt-Svc, x-request-id
//! ```

pub mod app;
pub mod dispatch;
pub(crate) mod http3;
pub mod request;
pub mod server;
pub(crate) mod tcp;

pub use app::default_app;
pub use dispatch::{DispatchError, Dispatcher};
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{GatewayServer, ServerError};
