//! Lock state machine.
//!
//! [`LockMachine`] is pure: it consumes [`LockEvent`]s produced by the
//! connection driver and returns the [`LockEffect`] the driver must carry
//! out next. Server pushes are total transitions, valid from any state, so
//! replaying the same push twice leaves the machine where it was.

/// Message shown while another session holds the machine (acquire refused).
pub const MESSAGE_ACQUIRE_REFUSED: &str = "machine busy";
/// Message for a `MachineBusy` push.
pub const MESSAGE_BUSY: &str = "machine currently in use by another user";
/// Message for a `MachineLocked` push.
pub const MESSAGE_LOCKED: &str = "you are using the machine";
/// Message when the lock channel cannot be reached.
pub const MESSAGE_CONNECTION_ERROR: &str = "connection error";

/// Where this client stands with respect to the machine lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// No channel. Initial state, and the state after teardown or a failed
    /// connect.
    #[default]
    Disconnected,
    /// Opening (or re-opening) the channel.
    Connecting,
    /// Connected; nobody is known to hold the lock.
    Free,
    /// This session holds the lock.
    LockedBySelf,
    /// Another session holds the lock.
    BusyOtherHolder,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Free => write!(f, "free"),
            Self::LockedBySelf => write!(f, "locked by this session"),
            Self::BusyOtherHolder => write!(f, "busy (another session)"),
        }
    }
}

/// What the front-end renders: whether purchase flows are blocked, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockStatus {
    pub is_busy: bool,
    pub message: Option<&'static str>,
}

/// Full observable state of the lock client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockSnapshot {
    pub state: LockState,
    pub status: LockStatus,
    /// The last connection cycle failed to reach the hub.
    pub connect_failed: bool,
}

impl LockSnapshot {
    /// Whether the lock outcome of the current cycle is known: the acquire
    /// call (or a push) has answered, or the hub could not be reached.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.connect_failed || matches!(self.state, LockState::LockedBySelf | LockState::BusyOtherHolder)
    }
}

/// Server-pushed notifications. None carries a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineNotification {
    Busy,
    Locked,
    Unlocked,
}

impl MachineNotification {
    /// Map a hub method name to a notification.
    #[must_use]
    pub fn from_target(target: &str) -> Option<Self> {
        match target {
            "MachineBusy" => Some(Self::Busy),
            "MachineLocked" => Some(Self::Locked),
            "MachineUnlocked" => Some(Self::Unlocked),
            _ => None,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    ConnectStarted,
    Connected,
    AcquireResolved(bool),
    Notification(MachineNotification),
    ConnectFailed,
    Disconnected,
}

/// Follow-up work the driver must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEffect {
    /// Send a `TryLock` on the fresh channel.
    TryLock,
    /// Release the current channel and start a new connection cycle.
    Rearm,
}

/// The lock state machine.
#[derive(Debug, Clone, Default)]
pub struct LockMachine {
    snapshot: LockSnapshot,
}

impl LockMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn snapshot(&self) -> LockSnapshot {
        self.snapshot
    }

    #[must_use]
    pub const fn state(&self) -> LockState {
        self.snapshot.state
    }

    #[must_use]
    pub const fn status(&self) -> LockStatus {
        self.snapshot.status
    }

    /// Apply an event and return the effect it requires, if any.
    pub fn apply(&mut self, event: LockEvent) -> Option<LockEffect> {
        let s = &mut self.snapshot;
        match event {
            LockEvent::ConnectStarted => {
                s.state = LockState::Connecting;
                s.connect_failed = false;
                None
            }
            LockEvent::Connected => {
                // Status keeps its last known value until the acquire answers
                s.state = LockState::Free;
                s.connect_failed = false;
                Some(LockEffect::TryLock)
            }
            LockEvent::AcquireResolved(true) => {
                s.state = LockState::LockedBySelf;
                s.status = LockStatus {
                    is_busy: false,
                    message: None,
                };
                None
            }
            LockEvent::AcquireResolved(false) => {
                s.state = LockState::BusyOtherHolder;
                s.status = LockStatus {
                    is_busy: true,
                    message: Some(MESSAGE_ACQUIRE_REFUSED),
                };
                None
            }
            LockEvent::Notification(MachineNotification::Busy) => {
                s.state = LockState::BusyOtherHolder;
                s.status = LockStatus {
                    is_busy: true,
                    message: Some(MESSAGE_BUSY),
                };
                None
            }
            LockEvent::Notification(MachineNotification::Locked) => {
                s.state = LockState::LockedBySelf;
                s.status = LockStatus {
                    is_busy: true,
                    message: Some(MESSAGE_LOCKED),
                };
                None
            }
            LockEvent::Notification(MachineNotification::Unlocked) => {
                s.state = LockState::Free;
                s.status = LockStatus {
                    is_busy: false,
                    message: None,
                };
                Some(LockEffect::Rearm)
            }
            LockEvent::ConnectFailed => {
                // Fail open: the busy flag keeps its last known value
                s.state = LockState::Disconnected;
                s.status.message = Some(MESSAGE_CONNECTION_ERROR);
                s.connect_failed = true;
                None
            }
            LockEvent::Disconnected => {
                s.state = LockState::Disconnected;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> LockMachine {
        let mut machine = LockMachine::new();
        machine.apply(LockEvent::ConnectStarted);
        machine.apply(LockEvent::Connected);
        machine
    }

    #[test]
    fn test_initial_state_is_disconnected_and_free_to_use() {
        let machine = LockMachine::new();
        assert_eq!(machine.state(), LockState::Disconnected);
        assert_eq!(machine.status(), LockStatus::default());
        assert!(!machine.snapshot().is_settled());
    }

    #[test]
    fn test_connect_requests_try_lock() {
        let mut machine = LockMachine::new();
        assert_eq!(machine.apply(LockEvent::ConnectStarted), None);
        assert_eq!(machine.state(), LockState::Connecting);
        assert_eq!(machine.apply(LockEvent::Connected), Some(LockEffect::TryLock));
        assert_eq!(machine.state(), LockState::Free);
        assert!(!machine.snapshot().is_settled());
    }

    #[test]
    fn test_acquire_granted() {
        let mut machine = connected();
        machine.apply(LockEvent::AcquireResolved(true));

        assert_eq!(machine.state(), LockState::LockedBySelf);
        assert_eq!(machine.status(), LockStatus::default());
        assert!(machine.snapshot().is_settled());
    }

    #[test]
    fn test_acquire_refused_shows_busy_without_any_push() {
        let mut machine = connected();
        machine.apply(LockEvent::AcquireResolved(false));

        assert_eq!(machine.state(), LockState::BusyOtherHolder);
        assert!(machine.status().is_busy);
        assert_eq!(machine.status().message, Some(MESSAGE_ACQUIRE_REFUSED));
    }

    #[test]
    fn test_busy_locked_unlocked_sequence() {
        let mut machine = connected();

        machine.apply(LockEvent::Notification(MachineNotification::Busy));
        assert!(machine.status().is_busy);
        assert_eq!(machine.status().message, Some(MESSAGE_BUSY));

        machine.apply(LockEvent::Notification(MachineNotification::Locked));
        assert!(machine.status().is_busy);
        assert_eq!(machine.status().message, Some(MESSAGE_LOCKED));
        assert_eq!(machine.state(), LockState::LockedBySelf);

        let effect = machine.apply(LockEvent::Notification(MachineNotification::Unlocked));
        assert!(!machine.status().is_busy);
        assert_eq!(machine.status().message, None);
        assert_eq!(machine.state(), LockState::Free);
        assert_eq!(effect, Some(LockEffect::Rearm));
    }

    #[test]
    fn test_repeated_pushes_are_idempotent() {
        let mut machine = connected();
        machine.apply(LockEvent::Notification(MachineNotification::Busy));
        let once = machine.snapshot();
        machine.apply(LockEvent::Notification(MachineNotification::Busy));

        assert_eq!(machine.snapshot(), once);
    }

    #[test]
    fn test_pushes_override_acquire_result() {
        let mut machine = connected();
        machine.apply(LockEvent::AcquireResolved(true));
        machine.apply(LockEvent::Notification(MachineNotification::Busy));

        assert_eq!(machine.state(), LockState::BusyOtherHolder);
        assert!(machine.status().is_busy);
    }

    #[test]
    fn test_connect_failure_fails_open() {
        let mut machine = LockMachine::new();
        machine.apply(LockEvent::ConnectStarted);
        machine.apply(LockEvent::ConnectFailed);

        assert_eq!(machine.state(), LockState::Disconnected);
        assert!(!machine.status().is_busy);
        assert_eq!(machine.status().message, Some(MESSAGE_CONNECTION_ERROR));
        assert!(machine.snapshot().is_settled());
    }

    #[test]
    fn test_connect_failure_keeps_last_busy_flag() {
        let mut machine = connected();
        machine.apply(LockEvent::AcquireResolved(false));
        machine.apply(LockEvent::ConnectStarted);
        machine.apply(LockEvent::ConnectFailed);

        assert!(machine.status().is_busy);
        assert_eq!(machine.status().message, Some(MESSAGE_CONNECTION_ERROR));
    }

    #[test]
    fn test_reconnect_keeps_status_until_acquire_answers() {
        let mut machine = connected();
        machine.apply(LockEvent::AcquireResolved(false));
        machine.apply(LockEvent::ConnectStarted);
        assert_eq!(machine.apply(LockEvent::Connected), Some(LockEffect::TryLock));

        assert!(machine.status().is_busy);
        assert!(!machine.snapshot().is_settled());
    }

    #[test]
    fn test_notification_targets() {
        assert_eq!(
            MachineNotification::from_target("MachineBusy"),
            Some(MachineNotification::Busy)
        );
        assert_eq!(
            MachineNotification::from_target("MachineLocked"),
            Some(MachineNotification::Locked)
        );
        assert_eq!(
            MachineNotification::from_target("MachineUnlocked"),
            Some(MachineNotification::Unlocked)
        );
        assert_eq!(MachineNotification::from_target("machinebusy"), None);
    }
}
