//! Alt-Svc advertisement subsystem.
//!
//! # Data Flow
//! ```text
//! EndpointRegistry snapshot + connection facts
//!     → policy.rs (which HTTP/3 endpoints, if any)
//!     → advertisement.rs (value objects, field rendering)
//!     → emitter.rs (Alt-Svc header, or frame.rs ALTSVC frame on HTTP/2)
//! ```
//!
//! # Design Decisions
//! - Advertisements are rebuilt per decision, never cached across requests
//! - Only Bound endpoints are advertised; Draining ones disappear at once
//! - Emission failures are swallowed; requests never fail because of them

pub mod advertisement;
pub mod emitter;
pub mod frame;
pub mod policy;

pub use advertisement::{AltSvcAdvertisement, DEFAULT_MAX_AGE_SECS};
pub use emitter::{AltSvcEmitter, AltSvcFrameSink, EmitError, FrameOutcome, HyperH2FrameSink};
pub use frame::{AltSvcFrame, FrameError};
pub use policy::AltSvcPolicy;
