//! # devrig-core - Core Domain Types
//!
//! Foundation crate for devrig. Provides domain types, error handling, and
//! the per-device allocation state machine.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (thiserror, tracing, tracing-subscriber, tracing-appender, dirs).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ConnectivityMode`] - Which transport currently reaches a device
//! - [`is_valid_serial()`] - Reject placeholder ("all `?`") serials
//!
//! ### Allocation (`allocation`)
//! - [`AllocationState`] - Per-device allocation state (Unknown, Available, Allocated, ...)
//! - [`DeviceEvent`] - Input alphabet of the state machine
//! - [`DeviceEventResponse`] - New state + change flag from one transition
//! - [`AllocationStateMachine`] - Event-driven transition table, one per device
//! - [`FreeMode`] - Condition a device is released in
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use devrig_core::prelude::*;
//! ```

pub mod allocation;
pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all devrig crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use allocation::{
    AllocationState, AllocationStateMachine, DeviceEvent, DeviceEventResponse, FreeMode,
};
pub use error::{Error, Result};
pub use types::{is_valid_serial, ConnectivityMode};
