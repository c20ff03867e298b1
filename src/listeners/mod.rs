//! Endpoint lifecycle and the shared endpoint registry.
//!
//! # Data Flow
//! ```text
//! ListenerConfig → Coordinator::add → bind → registry publishes Bound
//!                                              ↓
//!                  Dispatcher reads registry snapshots for Alt-Svc
//! ```

pub mod coordinator;
pub mod endpoint;
pub mod registry;

pub use coordinator::{BindError, Coordinator, CoordinatorError, CoordinatorSettings, DrainHandle, ReconcileReport};
pub use endpoint::{EndpointId, EndpointState, EndpointView, ProtocolFamily, TransportKind};
pub use registry::{EndpointRegistry, EndpointSet};
