//! Process-wide device registry
//!
//! [`DeviceRegistry`] owns the serial -> device map, dispatches allocation
//! requests, and reconciles the map against discovery snapshots. One mutex
//! guards structural mutation (insert, remove, snapshot); each device's
//! allocation transitions are serialized by its own lock, so allocation
//! races are decided per device, not globally. No lock is ever held across
//! I/O: the factory's framework probe runs before the insert lock is taken,
//! and bootloader enumeration happens in the scanner, outside the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use devrig_core::prelude::*;
use devrig_core::{is_valid_serial, ConnectivityMode, DeviceEvent, DeviceEventResponse, FreeMode};

use crate::device::ManagedDevice;
use crate::factory::DeviceFactory;
use crate::runner::CommandRunner;
use crate::selection::DeviceSelection;

/// Registry of every currently tracked device, keyed by serial
#[derive(Debug)]
pub struct DeviceRegistry<R> {
    /// Insertion-ordered entries; allocation is first-fit over this order
    devices: Mutex<Vec<Arc<ManagedDevice>>>,
    factory: DeviceFactory,
    runner: R,
    /// Serials inserted as Ignored: tracked, never allocated
    ignored_serials: Vec<String>,
}

impl<R: CommandRunner> DeviceRegistry<R> {
    pub fn new(factory: DeviceFactory, runner: R) -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            factory,
            runner,
            ignored_serials: Vec::new(),
        }
    }

    /// Configure serials that are tracked but never handed to a job
    pub fn with_ignored_serials(mut self, serials: Vec<String>) -> Self {
        self.ignored_serials = serials;
        self
    }

    // Entries behind a poisoned lock are still consistent (every mutation
    // is a push or retain); recover rather than propagate the panic.
    fn entries(&self) -> MutexGuard<'_, Vec<Arc<ManagedDevice>>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of distinct tracked serials
    pub fn size(&self) -> usize {
        self.entries().len()
    }

    /// Snapshot of all tracked devices in insertion order
    pub fn devices(&self) -> Vec<Arc<ManagedDevice>> {
        self.entries().clone()
    }

    /// Read-only lookup by serial
    pub fn find(&self, serial: &str) -> Option<Arc<ManagedDevice>> {
        self.entries()
            .iter()
            .find(|d| d.serial() == serial)
            .cloned()
    }

    /// Return the tracked device for `serial`, creating it on first sight.
    ///
    /// Placeholder-only serials are never admitted and yield `None`, as
    /// does a serial the factory cannot wrap. Creation probes the device's
    /// framework outside every registry lock, so this call can block up to
    /// the probe's worst case; a concurrent creation of the same serial is
    /// resolved by keeping whichever entry landed first.
    pub async fn find_or_create(&self, serial: &str) -> Option<Arc<ManagedDevice>> {
        if !is_valid_serial(serial) {
            debug!("Refusing to track placeholder serial {:?}", serial);
            return None;
        }
        if let Some(existing) = self.find(serial) {
            return Some(existing);
        }

        let device = match self.factory.create_device(&self.runner, serial).await {
            Ok(device) => device,
            Err(e) => {
                warn!("Could not create device for {:?}: {}", serial, e);
                return None;
            }
        };

        Some(self.insert(device))
    }

    /// Like [`DeviceRegistry::find_or_create`], for a serial first seen in
    /// bootloader mode where no framework probe is possible.
    pub fn find_or_create_fastboot(&self, serial: &str, fastbootd: bool) -> Option<Arc<ManagedDevice>> {
        if !is_valid_serial(serial) {
            debug!("Refusing to track placeholder serial {:?}", serial);
            return None;
        }
        if let Some(existing) = self.find(serial) {
            return Some(existing);
        }

        let device = match self.factory.create_bootloader_device(serial, fastbootd) {
            Ok(device) => device,
            Err(e) => {
                warn!("Could not create device for {:?}: {}", serial, e);
                return None;
            }
        };

        Some(self.insert(device))
    }

    fn insert(&self, device: ManagedDevice) -> Arc<ManagedDevice> {
        if self.ignored_serials.iter().any(|s| s == device.serial()) {
            info!("{} is on the ignore list", device.serial());
            device.mark_ignored();
        }

        let mut entries = self.entries();
        // A concurrent find_or_create for the same serial may have won while
        // the probe ran; keep the entry that landed first.
        if let Some(existing) = entries.iter().find(|d| d.serial() == device.serial()) {
            return Arc::clone(existing);
        }

        let device = Arc::new(device);
        entries.push(Arc::clone(&device));
        info!(
            "Tracking {} ({} devices total)",
            device.serial(),
            entries.len()
        );
        device
    }

    /// Allocate the first matching available device.
    ///
    /// Walks tracked devices in insertion order and returns the first one
    /// matching `selection` whose state machine accepts the allocation
    /// request. `None` when nothing matches or nothing is available.
    pub fn allocate(&self, selection: &DeviceSelection) -> Option<Arc<ManagedDevice>> {
        let snapshot = self.devices();
        for device in snapshot {
            if !selection.matches(&device) {
                continue;
            }
            let response = device.handle_allocation_event(DeviceEvent::AllocateRequest);
            if response.state_changed {
                info!("Allocated {}", device.serial());
                return Some(device);
            }
        }
        debug!("No allocatable device for {:?}", selection);
        None
    }

    /// Release a previously allocated device back to the pool.
    ///
    /// A call with an untracked device is ignored (the device may have been
    /// removed by reconciliation while the job held it).
    pub fn free(&self, device: &Arc<ManagedDevice>, mode: FreeMode) {
        if self.find(device.serial()).is_none() {
            warn!("Ignoring free of untracked device {}", device.serial());
            return;
        }
        let response = device.handle_allocation_event(mode.as_event());
        if !response.state_changed {
            warn!(
                "Freeing {} in state {} had no effect",
                device.serial(),
                response.state
            );
        }
    }

    /// Feed a connectivity event into a device's state machine.
    ///
    /// A disconnect of an unowned device removes it from the registry; an
    /// allocated device survives the disconnect and stays tracked for its
    /// job.
    pub fn handle_device_event(
        &self,
        device: &Arc<ManagedDevice>,
        event: DeviceEvent,
    ) -> DeviceEventResponse {
        let response = device.handle_allocation_event(event);
        if event == DeviceEvent::Disconnected && response.state_changed {
            self.remove(device.serial());
        }
        response
    }

    fn remove(&self, serial: &str) {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|d| d.serial() != serial);
        if entries.len() < before {
            info!("{} no longer tracked ({} devices total)", serial, entries.len());
        }
    }

    /// Reconcile tracked devices against one single-category bootloader
    /// snapshot.
    ///
    /// Devices in `current_serials` get their connectivity set to the
    /// snapshot's category. Devices previously in either bootloader mode
    /// but absent from the snapshot have left bootloader mode (rebooted or
    /// vanished): they are marked unreachable and fed a disconnect, which
    /// removes them unless a job owns them. A single device's failure never
    /// stops the sweep.
    pub fn update_fastboot_states(&self, current_serials: &HashSet<String>, fastbootd_only: bool) {
        let mode = if fastbootd_only {
            ConnectivityMode::Fastbootd
        } else {
            ConnectivityMode::Fastboot
        };
        for device in self.devices() {
            if current_serials.contains(device.serial()) {
                device.set_connectivity(mode);
            } else if device.connectivity().is_bootloader() {
                device.set_connectivity(ConnectivityMode::NotAvailable);
                self.handle_device_event(&device, DeviceEvent::Disconnected);
            }
        }
    }

    /// Reconcile against one combined bootloader snapshot
    /// (serial -> is-fastbootd).
    ///
    /// Single pass over both categories, so a fastbootd device still listed
    /// in the snapshot is never aged out by a plain-fastboot sweep. The
    /// poll loop prefers this over two [`DeviceRegistry::update_fastboot_states`]
    /// calls.
    pub fn reconcile_bootloader(&self, snapshot: &HashMap<String, bool>) {
        for device in self.devices() {
            match snapshot.get(device.serial()) {
                Some(true) => device.set_connectivity(ConnectivityMode::Fastbootd),
                Some(false) => device.set_connectivity(ConnectivityMode::Fastboot),
                None if device.connectivity().is_bootloader() => {
                    device.set_connectivity(ConnectivityMode::NotAvailable);
                    self.handle_device_event(&device, DeviceEvent::Disconnected);
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandResult;
    use crate::test_utils::ScriptedRunner;
    use devrig_core::AllocationState;
    use std::time::Duration;

    fn test_registry() -> DeviceRegistry<ScriptedRunner> {
        let factory = DeviceFactory::new(false, 1, Duration::from_millis(1));
        DeviceRegistry::new(factory, ScriptedRunner::new())
    }

    /// Track a device whose framework probe answers immediately
    async fn track(registry: &DeviceRegistry<ScriptedRunner>, serial: &str) -> Arc<ManagedDevice> {
        registry
            .runner
            .enqueue(CommandResult::success("framework-ok\n", ""));
        registry.find_or_create(serial).await.unwrap()
    }

    async fn track_available(
        registry: &DeviceRegistry<ScriptedRunner>,
        serial: &str,
    ) -> Arc<ManagedDevice> {
        let device = track(registry, serial).await;
        device.handle_allocation_event(DeviceEvent::ForceAvailable);
        device
    }

    #[tokio::test]
    async fn test_find_or_create_inserts_once() {
        let registry = test_registry();
        let first = track(&registry, "serial1").await;
        let second = registry.find_or_create("serial1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.size(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_rejects_placeholder() {
        let registry = test_registry();
        assert!(registry.find_or_create("????????????").await.is_none());
        assert!(registry.find_or_create("").await.is_none());
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_find_is_idempotent() {
        let registry = test_registry();
        let device = track(&registry, "serial1").await;

        for _ in 0..3 {
            let found = registry.find("serial1").unwrap();
            assert!(Arc::ptr_eq(&device, &found));
        }
        assert!(registry.find("serial2").is_none());
    }

    #[tokio::test]
    async fn test_allocate_empty_registry() {
        let registry = test_registry();
        assert!(registry.allocate(&DeviceSelection::any()).is_none());
    }

    #[tokio::test]
    async fn test_allocate_requires_available_state() {
        let registry = test_registry();
        track(&registry, "serial1").await; // still Unknown

        assert!(registry.allocate(&DeviceSelection::any()).is_none());
    }

    #[tokio::test]
    async fn test_allocate_twice_returns_device_once() {
        let registry = test_registry();
        let device = track_available(&registry, "serial1").await;

        let allocated = registry.allocate(&DeviceSelection::any()).unwrap();
        assert!(Arc::ptr_eq(&device, &allocated));
        assert_eq!(allocated.allocation_state(), AllocationState::Allocated);

        assert!(registry.allocate(&DeviceSelection::any()).is_none());
    }

    #[tokio::test]
    async fn test_allocate_first_fit_in_insertion_order() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;
        track_available(&registry, "serial2").await;

        let first = registry.allocate(&DeviceSelection::any()).unwrap();
        assert_eq!(first.serial(), "serial1");
        let second = registry.allocate(&DeviceSelection::any()).unwrap();
        assert_eq!(second.serial(), "serial2");
    }

    #[tokio::test]
    async fn test_allocate_by_serial_selection() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;
        let wanted = track_available(&registry, "serial2").await;

        let allocated = registry.allocate(&DeviceSelection::serial("serial2")).unwrap();
        assert!(Arc::ptr_eq(&wanted, &allocated));
    }

    #[tokio::test]
    async fn test_free_returns_device_to_pool() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;

        let device = registry.allocate(&DeviceSelection::any()).unwrap();
        registry.free(&device, FreeMode::Available);
        assert_eq!(device.allocation_state(), AllocationState::Available);

        // Allocatable again
        assert!(registry.allocate(&DeviceSelection::any()).is_some());
    }

    #[tokio::test]
    async fn test_free_unavailable_takes_device_out_of_pool() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;

        let device = registry.allocate(&DeviceSelection::any()).unwrap();
        registry.free(&device, FreeMode::Unavailable);
        assert_eq!(device.allocation_state(), AllocationState::Unavailable);
        assert!(registry.allocate(&DeviceSelection::any()).is_none());
        // Still tracked
        assert_eq!(registry.size(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_removes_unowned_device() {
        let registry = test_registry();
        let device = track_available(&registry, "serial1").await;

        registry.handle_device_event(&device, DeviceEvent::Disconnected);
        assert_eq!(registry.size(), 0);
        assert!(registry.find("serial1").is_none());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_allocated_device() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;
        let device = registry.allocate(&DeviceSelection::any()).unwrap();

        let response = registry.handle_device_event(&device, DeviceEvent::Disconnected);
        assert!(!response.state_changed);
        assert_eq!(registry.size(), 1);
        assert_eq!(device.allocation_state(), AllocationState::Allocated);
    }

    #[tokio::test]
    async fn test_disconnect_of_unknown_device_removes_it() {
        let registry = test_registry();
        let device = track(&registry, "serial1").await;
        assert_eq!(device.allocation_state(), AllocationState::Unknown);

        registry.handle_device_event(&device, DeviceEvent::Disconnected);
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_update_fastboot_states_marks_mode() {
        let registry = test_registry();
        let device = track(&registry, "serial1").await;

        registry.update_fastboot_states(&HashSet::from(["serial1".to_string()]), false);
        assert_eq!(device.connectivity(), ConnectivityMode::Fastboot);
        assert_eq!(registry.size(), 1);

        registry.update_fastboot_states(&HashSet::from(["serial1".to_string()]), true);
        assert_eq!(device.connectivity(), ConnectivityMode::Fastbootd);
    }

    #[tokio::test]
    async fn test_update_fastboot_states_removes_vanished_device() {
        let registry = test_registry();
        let device = track(&registry, "serial1").await;
        registry.update_fastboot_states(&HashSet::from(["serial1".to_string()]), false);

        registry.update_fastboot_states(&HashSet::new(), false);
        assert_eq!(device.connectivity(), ConnectivityMode::NotAvailable);
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_update_fastboot_states_keeps_allocated_vanished_device() {
        let registry = test_registry();
        track_available(&registry, "serial1").await;
        let device = registry.allocate(&DeviceSelection::any()).unwrap();
        registry.update_fastboot_states(&HashSet::from(["serial1".to_string()]), false);

        registry.update_fastboot_states(&HashSet::new(), false);
        assert_eq!(device.connectivity(), ConnectivityMode::NotAvailable);
        // The owning job still holds the device record
        assert_eq!(registry.size(), 1);
        assert_eq!(device.allocation_state(), AllocationState::Allocated);
    }

    #[tokio::test]
    async fn test_update_fastboot_states_ignores_normal_devices() {
        let registry = test_registry();
        let device = track(&registry, "serial1").await;

        // Not in the snapshot, but never was in bootloader mode either
        registry.update_fastboot_states(&HashSet::new(), false);
        assert_eq!(device.connectivity(), ConnectivityMode::Normal);
        assert_eq!(registry.size(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_bootloader_single_pass() {
        let registry = test_registry();
        let plain = track(&registry, "serial1").await;
        let userspace = track(&registry, "serial2").await;

        let snapshot = HashMap::from([
            ("serial1".to_string(), false),
            ("serial2".to_string(), true),
        ]);
        registry.reconcile_bootloader(&snapshot);
        assert_eq!(plain.connectivity(), ConnectivityMode::Fastboot);
        assert_eq!(userspace.connectivity(), ConnectivityMode::Fastbootd);

        // A fastbootd device still listed must not be aged out
        registry.reconcile_bootloader(&snapshot);
        assert_eq!(registry.size(), 2);

        // Gone from the snapshot entirely: reclaimed
        registry.reconcile_bootloader(&HashMap::new());
        assert_eq!(registry.size(), 0);
    }

    #[tokio::test]
    async fn test_find_or_create_fastboot_skips_probe() {
        let registry = test_registry();
        let device = registry.find_or_create_fastboot("serial1", false).unwrap();

        assert_eq!(device.connectivity(), ConnectivityMode::Fastboot);
        // No shell probe ran
        assert!(registry.runner.calls().is_empty());
        assert_eq!(registry.size(), 1);
    }

    #[tokio::test]
    async fn test_ignored_serial_is_tracked_but_never_allocated() {
        let factory = DeviceFactory::new(false, 1, Duration::from_millis(1));
        let registry = DeviceRegistry::new(factory, ScriptedRunner::new())
            .with_ignored_serials(vec!["serial1".to_string()]);

        registry
            .runner
            .enqueue(CommandResult::success("framework-ok\n", ""));
        let device = registry.find_or_create("serial1").await.unwrap();
        assert_eq!(device.allocation_state(), AllocationState::Ignored);
        assert_eq!(registry.size(), 1);

        assert!(registry.allocate(&DeviceSelection::any()).is_none());
    }

    #[tokio::test]
    async fn test_tcp_serial_gets_tcp_transport() {
        let registry = test_registry();
        let device = track(&registry, "10.0.0.2:5555").await;

        assert!(matches!(
            device.connection(),
            crate::connection::DeviceConnection::Tcp { .. }
        ));
    }
}
