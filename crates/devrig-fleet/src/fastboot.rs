//! Bootloader-mode device discovery
//!
//! [`FastbootScanner`] talks to the bootloader discovery binary and turns
//! its line-oriented listing into structured serial/mode pairs. The output
//! is free-form CLI text with no stable schema across binary releases, so
//! the parser is intentionally permissive (malformed lines are skipped, not
//! errors) and the availability check is heuristic enough to recognize old
//! binaries that print usage text instead of a help page.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use devrig_core::prelude::*;
use devrig_core::is_valid_serial;

use crate::runner::CommandRunner;

/// Timeout for the device-listing subcommand
const DEVICES_TIMEOUT: Duration = Duration::from_secs(30);

/// Short timeout for the help probe
const HELP_TIMEOUT: Duration = Duration::from_secs(10);

/// Mode token for plain bootloader mode
const MODE_FASTBOOT: &str = "fastboot";

/// Mode token for userspace bootloader mode
const MODE_FASTBOOTD: &str = "fastbootd";

/// Wrapper around the bootloader discovery binary
#[derive(Debug)]
pub struct FastbootScanner<R> {
    fastboot_path: String,
    runner: R,
}

impl<R: CommandRunner> FastbootScanner<R> {
    /// Create a scanner for the binary at `fastboot_path`.
    ///
    /// An empty path is a construction error; nothing else is validated
    /// here — a missing or broken binary surfaces through
    /// [`FastbootScanner::is_fastboot_available`] and empty scan results.
    pub fn new(fastboot_path: impl Into<String>, runner: R) -> Result<Self> {
        let fastboot_path = fastboot_path.into();
        if fastboot_path.trim().is_empty() {
            return Err(Error::config("fastboot binary path must not be empty"));
        }
        Ok(Self {
            fastboot_path,
            runner,
        })
    }

    /// Parse a raw device listing, keeping one mode category.
    ///
    /// Each useful line is `<serial><whitespace><mode>` with mode exactly
    /// `fastboot` or `fastbootd`. Placeholder serials (all `?`), blank
    /// lines, unknown mode tokens, and otherwise malformed lines are
    /// silently dropped.
    pub fn parse_devices(raw_output: &str, fastbootd_only: bool) -> HashSet<String> {
        let wanted = if fastbootd_only {
            MODE_FASTBOOTD
        } else {
            MODE_FASTBOOT
        };
        Self::parse_all_devices(raw_output)
            .into_iter()
            .filter(|(_, is_fastbootd)| {
                let mode = if *is_fastbootd {
                    MODE_FASTBOOTD
                } else {
                    MODE_FASTBOOT
                };
                mode == wanted
            })
            .map(|(serial, _)| serial)
            .collect()
    }

    /// Parse a raw device listing into serial -> is-fastbootd, all
    /// categories.
    pub fn parse_all_devices(raw_output: &str) -> HashMap<String, bool> {
        let mut devices = HashMap::new();
        for line in raw_output.lines() {
            let mut tokens = line.split_whitespace();
            let (Some(serial), Some(mode), None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                continue;
            };
            if !is_valid_serial(serial) {
                continue;
            }
            match mode {
                MODE_FASTBOOT => devices.insert(serial.to_string(), false),
                MODE_FASTBOOTD => devices.insert(serial.to_string(), true),
                // Unknown mode tokens from future binaries: excluded
                _ => continue,
            };
        }
        devices
    }

    /// Enumerate every bootloader-mode device, serial -> is-fastbootd.
    ///
    /// A failed or timed-out listing yields an empty map, never an error.
    pub async fn get_bootloader_and_fastbootd_devices(&self) -> HashMap<String, bool> {
        let result = self
            .runner
            .run_timed_quiet(DEVICES_TIMEOUT, &self.fastboot_path, &["devices"])
            .await;
        if !result.is_success() {
            warn!(
                "fastboot devices failed ({:?}): {}",
                result.status,
                result.stderr.trim()
            );
            return HashMap::new();
        }
        Self::parse_all_devices(&result.stdout)
    }

    /// Enumerate plain-bootloader-mode devices only
    pub async fn get_devices(&self) -> HashSet<String> {
        let result = self
            .runner
            .run_timed_quiet(DEVICES_TIMEOUT, &self.fastboot_path, &["devices"])
            .await;
        if !result.is_success() {
            warn!(
                "fastboot devices failed ({:?}): {}",
                result.status,
                result.stderr.trim()
            );
            return HashSet::new();
        }
        Self::parse_devices(&result.stdout, false)
    }

    /// Check whether a usable discovery binary is installed.
    ///
    /// Runs the help subcommand with a short timeout. Old binaries have no
    /// help page: they print usage text to stderr and exit non-zero, which
    /// still proves the binary exists and runs.
    pub async fn is_fastboot_available(&self) -> bool {
        let result = self
            .runner
            .run_timed_quiet(HELP_TIMEOUT, &self.fastboot_path, &["help"])
            .await;
        if result.is_success() {
            return true;
        }
        if result.stderr.contains("usage:") {
            debug!("{} is an older binary without a help page", self.fastboot_path);
            return true;
        }
        warn!(
            "fastboot binary unavailable at {}: {}",
            self.fastboot_path,
            result.stderr.trim()
        );
        false
    }

    /// Run a fastboot subcommand against one device.
    ///
    /// Returns stdout on success; on any failure the error is logged and
    /// the result is absent.
    pub async fn execute_command(
        &self,
        time_limit: Duration,
        serial: &str,
        args: &[&str],
    ) -> Option<String> {
        let mut full_args = vec!["-s", serial];
        full_args.extend_from_slice(args);
        let result = self
            .runner
            .run_timed(time_limit, &self.fastboot_path, &full_args)
            .await;
        if result.is_success() {
            Some(result.stdout)
        } else {
            warn!(
                "fastboot {:?} on {} failed ({:?}): {}",
                args,
                serial,
                result.status,
                result.stderr.trim()
            );
            None
        }
    }
}
