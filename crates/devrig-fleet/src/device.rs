//! Managed device wrapper
//!
//! One [`ManagedDevice`] exists per physical identity (serial). The registry
//! exclusively owns the entry; the entry owns its allocation state machine
//! and a replaceable transport handle. A single per-device mutex guards the
//! machine, the connectivity mode, and the handle so that an allocation
//! request and a concurrent disconnect reconciliation on the *same* device
//! resolve in a deterministic order. The mutex is never held across I/O.

use std::sync::{Mutex, MutexGuard};

use devrig_core::prelude::*;
use devrig_core::{
    AllocationState, AllocationStateMachine, ConnectivityMode, DeviceEvent, DeviceEventResponse,
};

use crate::connection::DeviceConnection;

/// One registry entry per physical device identity
#[derive(Debug)]
pub struct ManagedDevice {
    serial: String,
    inner: Mutex<DeviceInner>,
}

#[derive(Debug)]
struct DeviceInner {
    machine: AllocationStateMachine,
    connectivity: ConnectivityMode,
    connection: DeviceConnection,
    framework_supported: bool,
}

impl ManagedDevice {
    /// Wrap a freshly discovered device, starting in the Unknown allocation
    /// state on the given connectivity mode.
    pub fn new(
        connection: DeviceConnection,
        connectivity: ConnectivityMode,
        framework_supported: bool,
    ) -> Self {
        Self {
            serial: connection.serial().to_string(),
            inner: Mutex::new(DeviceInner {
                machine: AllocationStateMachine::new(),
                connectivity,
                connection,
                framework_supported,
            }),
        }
    }

    // Transitions are pure, so data behind a poisoned lock is still
    // consistent; recover instead of unwinding the whole registry.
    fn inner(&self) -> MutexGuard<'_, DeviceInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Primary key; immutable for the lifetime of the entry
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn allocation_state(&self) -> AllocationState {
        self.inner().machine.state()
    }

    pub fn connectivity(&self) -> ConnectivityMode {
        self.inner().connectivity
    }

    pub fn set_connectivity(&self, mode: ConnectivityMode) {
        let mut inner = self.inner();
        if inner.connectivity != mode {
            debug!(
                "{}: connectivity {} -> {}",
                self.serial, inner.connectivity, mode
            );
            inner.connectivity = mode;
        }
    }

    /// Whether the software framework answered the readiness probe
    pub fn framework_supported(&self) -> bool {
        self.inner().framework_supported
    }

    /// Snapshot of the current transport handle
    pub fn connection(&self) -> DeviceConnection {
        self.inner().connection.clone()
    }

    /// Swap the transport handle on reconnect.
    ///
    /// The new handle must address the same serial; a mismatched handle is
    /// rejected rather than silently re-keying the entry.
    pub fn set_connection(&self, connection: DeviceConnection) -> Result<()> {
        if connection.serial() != self.serial {
            return Err(Error::invalid_serial(connection.serial()));
        }
        self.inner().connection = connection;
        Ok(())
    }

    /// Feed one event through this device's allocation state machine.
    ///
    /// Safe to call concurrently from the reconciliation path and from
    /// scheduler allocation requests; the per-device lock decides exactly
    /// one winner for a race on the same device.
    pub fn handle_allocation_event(&self, event: DeviceEvent) -> DeviceEventResponse {
        let mut inner = self.inner();
        let before = inner.machine.state();
        let response = inner.machine.handle_event(event);
        if response.state_changed {
            debug!(
                "{}: {:?} moved allocation {} -> {}",
                self.serial, event, before, response.state
            );
        }
        response
    }

    /// Put the entry on the ignore list before it is shared.
    ///
    /// Construction-time marking for configured ignore lists; ignored
    /// devices stay tracked but absorb allocation traffic.
    pub(crate) fn mark_ignored(&self) {
        self.inner().machine = AllocationStateMachine::starting_in(AllocationState::Ignored);
    }
}
