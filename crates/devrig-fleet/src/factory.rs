//! Device classification and construction
//!
//! [`DeviceFactory`] turns a freshly discovered serial into the right
//! [`DeviceConnection`] variant and probes whether the device's software
//! framework is ready. Classification is purely syntactic: a serial of the
//! shape `host:port` is TCP-style; in a remote execution environment such
//! serials get the nested-remote variant.

use std::sync::LazyLock;
use std::time::Duration;

use devrig_core::prelude::*;
use devrig_core::{is_valid_serial, ConnectivityMode};
use regex::Regex;

use crate::config::FactoryConfig;
use crate::connection::DeviceConnection;
use crate::device::ManagedDevice;
use crate::runner::CommandRunner;

/// Token echoed through the device shell to probe framework readiness
const FRAMEWORK_PROBE_TOKEN: &str = "framework-ok";

/// Timeout for one framework probe round-trip
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Static pattern for TCP-style serials: non-empty host, decimal port
static TCP_SERIAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:\s]+):(\d{1,5})$").expect("Invalid TCP serial regex"));

/// Classifies serials and builds managed device wrappers
#[derive(Debug, Clone)]
pub struct DeviceFactory {
    /// Whether the harness runs inside a remote execution environment
    remote_execution: bool,
    /// Maximum framework probe attempts when the device stays silent
    probe_attempts: u32,
    /// Fixed delay between probe attempts
    probe_delay: Duration,
}

impl Default for DeviceFactory {
    fn default() -> Self {
        Self::from_config(&FactoryConfig::default())
    }
}

impl DeviceFactory {
    pub fn new(remote_execution: bool, probe_attempts: u32, probe_delay: Duration) -> Self {
        Self {
            remote_execution,
            probe_attempts: probe_attempts.max(1),
            probe_delay,
        }
    }

    pub fn from_config(config: &FactoryConfig) -> Self {
        Self::new(
            config.remote_execution,
            config.probe_attempts,
            Duration::from_millis(config.probe_delay_ms),
        )
    }

    /// Check whether a serial has the `host:port` shape with a valid port.
    ///
    /// Rejects missing hosts, non-numeric ports, and ports outside
    /// [0, 65535].
    pub fn is_tcp_device_serial(serial: &str) -> bool {
        parse_tcp_serial(serial).is_some()
    }

    /// Build the transport handle for a serial
    pub fn create_connection(&self, serial: &str) -> Result<DeviceConnection> {
        if !is_valid_serial(serial) {
            return Err(Error::invalid_serial(serial));
        }
        let serial = serial.trim().to_string();

        let connection = match parse_tcp_serial(&serial) {
            Some((host, port)) if self.remote_execution => DeviceConnection::NestedRemote {
                serial,
                host,
                port,
            },
            Some((host, port)) => DeviceConnection::Tcp { serial, host, port },
            None => DeviceConnection::Local { serial },
        };
        Ok(connection)
    }

    /// Classify a serial, probe its framework, and wrap it.
    ///
    /// Blocks its caller up to `probe_attempts x probe_delay` when the
    /// device answers nothing; callers must not hold registry locks.
    pub async fn create_device<R: CommandRunner>(
        &self,
        runner: &R,
        serial: &str,
    ) -> Result<ManagedDevice> {
        let connection = self.create_connection(serial)?;
        let framework_supported = self.check_framework_support(runner, &connection).await;
        Ok(ManagedDevice::new(
            connection,
            ConnectivityMode::Normal,
            framework_supported,
        ))
    }

    /// Wrap a device first seen in bootloader mode.
    ///
    /// No shell is reachable in bootloader mode, so no probe runs; the
    /// framework flag stays pessimistic until the device reconnects
    /// normally.
    pub fn create_bootloader_device(
        &self,
        serial: &str,
        fastbootd: bool,
    ) -> Result<ManagedDevice> {
        let connection = self.create_connection(serial)?;
        let mode = if fastbootd {
            ConnectivityMode::Fastbootd
        } else {
            ConnectivityMode::Fastboot
        };
        Ok(ManagedDevice::new(connection, mode, false))
    }

    /// Probe framework readiness with a sentinel-echo shell round-trip.
    ///
    /// - Output contains the sentinel: ready, no retry.
    /// - Output is empty: retried up to the attempt limit with a fixed
    ///   sleep; if every attempt stays silent the device is optimistically
    ///   treated as ready (silence is an environment quirk, not a confirmed
    ///   negative).
    /// - Non-empty output without the sentinel (an explicit "not found"
    ///   style error): not ready, immediately.
    pub async fn check_framework_support<R: CommandRunner>(
        &self,
        runner: &R,
        connection: &DeviceConnection,
    ) -> bool {
        for attempt in 1..=self.probe_attempts {
            let result = connection
                .execute_shell_raw(runner, PROBE_TIMEOUT, &["echo", FRAMEWORK_PROBE_TOKEN])
                .await;
            let combined = result.combined_output();
            let combined = combined.trim();

            if combined.contains(FRAMEWORK_PROBE_TOKEN) {
                return true;
            }
            if !combined.is_empty() {
                info!(
                    "{}: framework probe answered {:?}, treating as unsupported",
                    connection.serial(),
                    combined
                );
                return false;
            }

            debug!(
                "{}: empty framework probe response (attempt {}/{})",
                connection.serial(),
                attempt,
                self.probe_attempts
            );
            if attempt < self.probe_attempts {
                tokio::time::sleep(self.probe_delay).await;
            }
        }

        warn!(
            "{}: framework probe stayed silent after {} attempts, assuming supported",
            connection.serial(),
            self.probe_attempts
        );
        true
    }
}

/// Split a TCP-style serial into host and port
fn parse_tcp_serial(serial: &str) -> Option<(String, u16)> {
    let caps = TCP_SERIAL_PATTERN.captures(serial.trim())?;
    let host = caps.get(1)?.as_str().to_string();
    // u16 parse enforces the [0, 65535] range on top of the digit pattern
    let port: u16 = caps.get(2)?.as_str().parse().ok()?;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandResult;
    use crate::test_utils::ScriptedRunner;

    fn fast_factory() -> DeviceFactory {
        DeviceFactory::new(false, 3, Duration::from_millis(1))
    }

    #[test]
    fn test_is_tcp_device_serial() {
        assert!(DeviceFactory::is_tcp_device_serial("127.0.0.1:5555"));
        assert!(DeviceFactory::is_tcp_device_serial("lab-host-03:0"));
        assert!(DeviceFactory::is_tcp_device_serial("host:65535"));
    }

    #[test]
    fn test_is_tcp_device_serial_rejects_malformed() {
        // Port out of range
        assert!(!DeviceFactory::is_tcp_device_serial("host:65536"));
        assert!(!DeviceFactory::is_tcp_device_serial("host:99999"));
        // Non-numeric port
        assert!(!DeviceFactory::is_tcp_device_serial("host:port"));
        // Missing host / missing port
        assert!(!DeviceFactory::is_tcp_device_serial(":5555"));
        assert!(!DeviceFactory::is_tcp_device_serial("host:"));
        // Not TCP-shaped at all
        assert!(!DeviceFactory::is_tcp_device_serial("04035EEB0B01F01C"));
        assert!(!DeviceFactory::is_tcp_device_serial("a:b:5555"));
    }

    #[test]
    fn test_create_connection_local() {
        let conn = fast_factory().create_connection("04035EEB0B01F01C").unwrap();
        assert_eq!(
            conn,
            DeviceConnection::Local {
                serial: "04035EEB0B01F01C".to_string()
            }
        );
    }

    #[test]
    fn test_create_connection_tcp() {
        let conn = fast_factory().create_connection("10.0.0.2:5555").unwrap();
        assert_eq!(
            conn,
            DeviceConnection::Tcp {
                serial: "10.0.0.2:5555".to_string(),
                host: "10.0.0.2".to_string(),
                port: 5555,
            }
        );
    }

    #[test]
    fn test_create_connection_nested_remote() {
        let factory = DeviceFactory::new(true, 3, Duration::from_millis(1));
        let conn = factory.create_connection("10.0.0.2:5555").unwrap();
        assert!(matches!(conn, DeviceConnection::NestedRemote { .. }));

        // Non-TCP serials stay local even in remote execution
        let conn = factory.create_connection("HT99PP800024").unwrap();
        assert!(matches!(conn, DeviceConnection::Local { .. }));
    }

    #[test]
    fn test_create_connection_rejects_placeholder_serial() {
        let err = fast_factory().create_connection("????????????").unwrap_err();
        assert!(matches!(err, Error::InvalidSerial { .. }));
    }

    #[tokio::test]
    async fn test_framework_probe_sentinel_match() {
        let runner = ScriptedRunner::new();
        runner.enqueue(CommandResult::success("framework-ok\n", ""));

        let factory = fast_factory();
        let conn = factory.create_connection("serial1").unwrap();
        assert!(factory.check_framework_support(&runner, &conn).await);
        // Matched on the first attempt, no retry
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_framework_probe_definitive_negative() {
        let runner = ScriptedRunner::new();
        runner.enqueue(CommandResult::failed("", "/system/bin/sh: echo: not found"));

        let factory = fast_factory();
        let conn = factory.create_connection("serial1").unwrap();
        assert!(!factory.check_framework_support(&runner, &conn).await);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_framework_probe_silence_is_optimistic() {
        let runner = ScriptedRunner::new();
        runner.enqueue_repeated(CommandResult::success("", ""), 3);

        let factory = fast_factory();
        let conn = factory.create_connection("serial1").unwrap();
        assert!(factory.check_framework_support(&runner, &conn).await);
        // All attempts consumed before defaulting to true
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_framework_probe_recovers_after_empty_attempt() {
        let runner = ScriptedRunner::new();
        runner.enqueue(CommandResult::success("", ""));
        runner.enqueue(CommandResult::success("framework-ok\n", ""));

        let factory = fast_factory();
        let conn = factory.create_connection("serial1").unwrap();
        assert!(factory.check_framework_support(&runner, &conn).await);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_create_device_carries_probe_result() {
        let runner = ScriptedRunner::new();
        runner.enqueue(CommandResult::failed("", "sh: not found"));

        let device = fast_factory().create_device(&runner, "serial1").await.unwrap();
        assert_eq!(device.serial(), "serial1");
        assert!(!device.framework_supported());
        assert_eq!(device.connectivity(), ConnectivityMode::Normal);
    }

    #[test]
    fn test_create_bootloader_device() {
        let device = fast_factory()
            .create_bootloader_device("serial1", true)
            .unwrap();
        assert_eq!(device.connectivity(), ConnectivityMode::Fastbootd);
        assert!(!device.framework_supported());
    }
}
