//! Device connection variants
//!
//! A managed device talks to its hardware through one of a closed set of
//! transports, selected once by the factory: the local connection daemon, a
//! TCP-style endpoint, or a TCP endpoint reached from inside a remote
//! execution environment. All variants expose the same capability surface
//! (`serial`, `connect`, `execute_shell`).

use std::time::Duration;

use devrig_core::prelude::*;

use crate::runner::{CommandResult, CommandRunner};

/// Binary of the normal connection daemon client
pub const ADB_BINARY: &str = "adb";

/// Timeout for establishing a TCP-style connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport handle for one device, replaceable on reconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceConnection {
    /// Device on the local bus, addressed by plain serial
    Local { serial: String },
    /// Device reachable at `host:port` through the local daemon
    Tcp {
        serial: String,
        host: String,
        port: u16,
    },
    /// `host:port` device inside a remote execution environment, where the
    /// daemon endpoint itself is forwarded
    NestedRemote {
        serial: String,
        host: String,
        port: u16,
    },
}

impl DeviceConnection {
    /// Serial the transport addresses; identical across reconnects
    pub fn serial(&self) -> &str {
        match self {
            DeviceConnection::Local { serial } => serial,
            DeviceConnection::Tcp { serial, .. } => serial,
            DeviceConnection::NestedRemote { serial, .. } => serial,
        }
    }

    /// Establish the transport.
    ///
    /// A no-op success for local devices. TCP-style variants ask the daemon
    /// to connect; a refused or timed-out attempt yields `false`, never an
    /// error.
    pub async fn connect<R: CommandRunner>(&self, runner: &R) -> bool {
        let endpoint = match self {
            DeviceConnection::Local { .. } => return true,
            DeviceConnection::Tcp { host, port, .. }
            | DeviceConnection::NestedRemote { host, port, .. } => format!("{host}:{port}"),
        };

        let result = runner
            .run_timed(CONNECT_TIMEOUT, ADB_BINARY, &["connect", &endpoint])
            .await;

        // `adb connect` exits zero even on refusal; the verdict is in stdout
        let connected = result.is_success()
            && result.stdout.contains("connected")
            && !result.stdout.contains("unable to connect");
        if !connected {
            debug!("connect to {} failed: {}", endpoint, result.stdout.trim());
        }
        connected
    }

    /// Run a shell command on the device, returning the raw captured result.
    ///
    /// Probes use this to inspect combined output of failed runs.
    pub async fn execute_shell_raw<R: CommandRunner>(
        &self,
        runner: &R,
        time_limit: Duration,
        args: &[&str],
    ) -> CommandResult {
        let mut full_args = vec!["-s", self.serial(), "shell"];
        full_args.extend_from_slice(args);
        runner.run_timed(time_limit, ADB_BINARY, &full_args).await
    }

    /// Run a shell command, returning stdout on success and `None` on any
    /// failure.
    pub async fn execute_shell<R: CommandRunner>(
        &self,
        runner: &R,
        time_limit: Duration,
        args: &[&str],
    ) -> Option<String> {
        let result = self.execute_shell_raw(runner, time_limit, args).await;
        if result.is_success() {
            Some(result.stdout)
        } else {
            debug!(
                "shell {:?} on {} failed: {}",
                args,
                self.serial(),
                result.stderr.trim()
            );
            None
        }
    }
}
