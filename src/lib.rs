//! Alt-Svc gateway library.
//!
//! Serves one application over HTTP/1.1, HTTP/2 and HTTP/3 and advertises
//! the HTTP/3 endpoints to TCP clients with `Alt-Svc`.

pub mod admin;
pub mod altsvc;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod listeners;
pub mod net;
pub mod observability;
pub mod protocol;

pub use config::GatewayConfig;
pub use http::{default_app, Dispatcher, GatewayServer, RequestContext};
pub use lifecycle::Shutdown;
pub use listeners::Coordinator;
pub use protocol::ProtocolVersion;
