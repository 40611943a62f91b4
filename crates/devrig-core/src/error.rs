//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
///
/// Transient external failures (command timeouts, non-zero exits, silent
/// probes) never surface here: the runner and scanner absorb them into
/// empty/absent results. Only construction-time rejections and the few
/// genuinely fatal conditions are errors.
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fastboot binary not found. Ensure 'fastboot' is in your PATH or set fastboot.path in the config.")]
    FastbootNotFound,

    // ─────────────────────────────────────────────────────────────
    // Device/Registry Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid device serial: {serial:?}")]
    InvalidSerial { serial: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn invalid_serial(serial: impl Into<String>) -> Self {
        Self::InvalidSerial {
            serial: serial.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors are absorbed by the caller: a single device's
    /// failure never aborts a batch operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InvalidSerial { .. })
    }

    /// Check if this error should abort the constructing call
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FastbootNotFound
                | Error::Config { .. }
                | Error::ConfigNotFound { .. }
                | Error::ConfigInvalid { .. }
        )
    }
}
