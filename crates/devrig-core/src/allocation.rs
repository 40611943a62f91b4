//! Per-device allocation state machine
//!
//! Every managed device owns one [`AllocationStateMachine`]. The machine is a
//! pure transition table: it takes a [`DeviceEvent`] and answers with the new
//! state plus a change flag. Locking is deliberately not handled here — the
//! device wrapper serializes transitions with its own mutex so an allocation
//! request and a concurrent disconnect on the same device resolve in a
//! deterministic order.

/// Exclusive-allocation state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    /// Initial state, right after creation
    Unknown,
    /// Eligible for allocation to a test job
    Available,
    /// Exclusively owned by one test job
    Allocated,
    /// Reachable but not usable (offline, failed availability check)
    Unavailable,
    /// Availability probe in flight
    CheckingAvailability,
    /// Tracked but excluded from allocation (configured ignore list)
    Ignored,
}

impl std::fmt::Display for AllocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationState::Unknown => write!(f, "unknown"),
            AllocationState::Available => write!(f, "available"),
            AllocationState::Allocated => write!(f, "allocated"),
            AllocationState::Unavailable => write!(f, "unavailable"),
            AllocationState::CheckingAvailability => write!(f, "checking-availability"),
            AllocationState::Ignored => write!(f, "ignored"),
        }
    }
}

/// Input alphabet of the allocation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device appeared online on the normal transport
    ConnectedOnline,
    /// Device appeared but is offline/unauthorized
    ConnectedOffline,
    /// Device left every transport
    Disconnected,
    /// Scheduler wants exclusive use of the device
    AllocateRequest,
    /// Allocation regardless of current state (recovery/test path)
    ForceAllocateRequest,
    /// Owning job released the device in working condition
    FreeAvailable,
    /// Owning job released the device in an undetermined condition
    FreeUnknown,
    /// Owning job released the device and reported it broken
    FreeUnavailable,
    /// Return to the pool regardless of current state
    ForceAvailable,
    AvailabilityCheckPassed,
    AvailabilityCheckFailed,
}

/// Condition a device is released in
///
/// Maps onto the three free events; the registry's `free` takes this so
/// schedulers never touch raw events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreeMode {
    #[default]
    Available,
    Unknown,
    Unavailable,
}

impl FreeMode {
    pub fn as_event(&self) -> DeviceEvent {
        match self {
            FreeMode::Available => DeviceEvent::FreeAvailable,
            FreeMode::Unknown => DeviceEvent::FreeUnknown,
            FreeMode::Unavailable => DeviceEvent::FreeUnavailable,
        }
    }
}

/// Result of feeding one event into one device's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEventResponse {
    /// Allocation state after the event
    pub state: AllocationState,
    /// Whether the event took effect
    ///
    /// For [`DeviceEvent::Disconnected`] this flag means "eligible for
    /// registry removal": it is `true` for every unowned device, even when
    /// the state was already `Unknown`.
    pub state_changed: bool,
}

/// Event-driven allocation state machine, one per managed device
#[derive(Debug)]
pub struct AllocationStateMachine {
    state: AllocationState,
}

impl Default for AllocationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStateMachine {
    /// Create a machine in the initial [`AllocationState::Unknown`] state
    pub fn new() -> Self {
        Self {
            state: AllocationState::Unknown,
        }
    }

    /// Create a machine starting in an explicit state (ignore-listed devices)
    pub fn starting_in(state: AllocationState) -> Self {
        Self { state }
    }

    /// Current state without transitioning
    pub fn state(&self) -> AllocationState {
        self.state
    }

    /// Feed one event through the transition table.
    ///
    /// The single mutating entry point. Callers must serialize invocations
    /// per device; see the module docs.
    pub fn handle_event(&mut self, event: DeviceEvent) -> DeviceEventResponse {
        use AllocationState::*;
        use DeviceEvent::*;

        let old = self.state;
        let new = match (old, event) {
            // Force paths win from any state
            (_, ForceAvailable) => Available,
            (_, ForceAllocateRequest) => Allocated,

            // An allocated device survives a link drop: the owning job still
            // holds it and must free it explicitly.
            (Allocated, Disconnected) => Allocated,
            // Everything unowned becomes reclaimable on disconnect
            (_, Disconnected) => Unknown,

            // Ignored devices absorb everything else
            (Ignored, _) => Ignored,

            (Available, AllocateRequest) => Allocated,
            (_, AllocateRequest) => old,

            (Allocated, FreeAvailable) => Available,
            (Allocated, FreeUnknown) => Unknown,
            (Allocated, FreeUnavailable) => Unavailable,
            (_, FreeAvailable | FreeUnknown | FreeUnavailable) => old,

            (Unknown, ConnectedOnline) => CheckingAvailability,
            (_, ConnectedOnline) => old,

            (Unknown | Available | CheckingAvailability, ConnectedOffline) => Unavailable,
            (_, ConnectedOffline) => old,

            (CheckingAvailability, AvailabilityCheckPassed) => Available,
            (CheckingAvailability, AvailabilityCheckFailed) => Unavailable,
            (_, AvailabilityCheckPassed | AvailabilityCheckFailed) => old,
        };

        self.state = new;

        // Disconnect of an unowned device always reports a change, even
        // Unknown -> Unknown: the registry keys removal on this flag.
        let state_changed = if event == Disconnected {
            old != Allocated
        } else {
            old != new
        };

        DeviceEventResponse {
            state: new,
            state_changed,
        }
    }
}
