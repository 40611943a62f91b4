//! # devrig-fleet - Device Registry and Discovery Reconciliation
//!
//! Tracks every reachable test device, arbitrates exclusive allocation to
//! test jobs, and reconciles the registry against periodic discovery
//! snapshots (normal connection daemon + bootloader enumeration).
//!
//! Depends on [`devrig_core`] for domain types, the allocation state
//! machine, and error handling.
//!
//! ## Public API
//!
//! ### Registry
//! - [`DeviceRegistry`] - serial -> device map with allocation dispatch and
//!   fastboot-mode reconciliation
//! - [`ManagedDevice`] - one tracked entry per physical identity
//! - [`DeviceSelection`] - scheduler-facing selection criteria
//!
//! ### Discovery
//! - [`FastbootScanner`] - bootloader-mode enumeration via the fastboot binary
//! - [`DeviceFactory`] - serial classification and framework-readiness probe
//! - [`DeviceConnection`] - closed set of transport variants (local / TCP /
//!   nested remote)
//!
//! ### External Commands
//! - [`CommandRunner`] - timed command execution seam
//! - [`TokioCommandRunner`] - production implementation
//!
//! ### Configuration
//! - [`FleetConfig`] - TOML configuration with defaults for every field

pub mod config;
pub mod connection;
pub mod device;
pub mod factory;
pub mod fastboot;
pub mod registry;
pub mod runner;
pub mod selection;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use config::{FactoryConfig, FastbootConfig, FleetConfig, RegistryConfig};
pub use connection::{DeviceConnection, ADB_BINARY};
pub use device::ManagedDevice;
pub use factory::DeviceFactory;
pub use fastboot::FastbootScanner;
pub use registry::DeviceRegistry;
pub use runner::{CommandResult, CommandRunner, CommandStatus, TokioCommandRunner};
pub use selection::DeviceSelection;
