//! Fleet configuration
//!
//! TOML configuration for the discovery loop, device factory, and registry.
//! Every field has a default so an absent file or empty table still yields
//! a working setup.

use std::path::Path;

use devrig_core::prelude::*;
use serde::{Deserialize, Serialize};

/// Top-level configuration, usually loaded from `devrig.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    pub fastboot: FastbootConfig,
    pub factory: FactoryConfig,
    pub registry: RegistryConfig,
}

/// Bootloader discovery settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FastbootConfig {
    /// Path to the fastboot binary; resolved from PATH when unset
    pub path: Option<String>,

    /// Seconds between bootloader enumeration snapshots
    pub poll_interval_secs: u64,
}

impl Default for FastbootConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

impl FastbootConfig {
    /// Resolve the fastboot binary path, falling back to a PATH lookup
    pub fn resolve_path(&self) -> Result<String> {
        match &self.path {
            Some(path) if !path.trim().is_empty() => Ok(path.clone()),
            Some(_) => Err(Error::config_invalid(
                "fastboot.path must not be empty when set",
            )),
            None => which::which("fastboot")
                .map(|p| p.display().to_string())
                .map_err(|_| Error::FastbootNotFound),
        }
    }
}

/// Device factory settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Whether the harness runs inside a remote execution environment
    /// (TCP-style serials get the nested-remote transport)
    pub remote_execution: bool,

    /// Framework probe attempts before defaulting to supported
    pub probe_attempts: u32,

    /// Milliseconds slept between framework probe attempts
    pub probe_delay_ms: u64,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            remote_execution: false,
            probe_attempts: default_probe_attempts(),
            probe_delay_ms: default_probe_delay_ms(),
        }
    }
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_delay_ms() -> u64 {
    500
}

/// Registry settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Serials tracked but never allocated
    pub ignored_serials: Vec<String>,
}

impl FleetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::config_invalid(e.to_string()))
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(Error::ConfigNotFound { .. }) => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}
