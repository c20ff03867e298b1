//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → listeners reconciled, Alt-Svc policy swapped
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs re-reads the file
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → changed config sent to the running server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use crate::listeners::endpoint::TransportKind;
pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AdvertiseMode, AltSvcConfig, GatewayConfig, LimitsConfig, ListenerConfig,
    ObservabilityConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
