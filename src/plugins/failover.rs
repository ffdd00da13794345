//! Standby failover between redundant helms.
//!
//! Helms announce themselves every cycle on `IVPHELM_STATE`. A helm
//! configured as standby stays in `STANDBY` while it hears an active
//! primary, takes over once the primary has been silent longer than the
//! threshold, and yields back when the primary is heard again. A primary
//! that hears another active primary disables itself.
//!
//! The decision is a pure function of the current status, the event and the
//! standby role, so it is tested without a running helm.

use crate::plugins::helm::HelmStatus;

#[derive(Debug, Clone)]
pub struct StandbyMonitor {
    threshold: f64,
    last_heartbeat: f64,
}

impl StandbyMonitor {
    /// `start` counts as the first heartbeat, so a fresh standby waits a
    /// full threshold before taking over.
    pub fn new(threshold: f64, start: f64) -> Self {
        StandbyMonitor {
            threshold,
            last_heartbeat: start,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn note_heartbeat(&mut self, time: f64) {
        if time > self.last_heartbeat {
            self.last_heartbeat = time;
        }
    }

    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.last_heartbeat).max(0.0)
    }

    pub fn should_take_over(&self, now: f64) -> bool {
        self.elapsed(now) > self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailoverEvent {
    /// Another helm's `IVPHELM_STATE`; `standby` is set for a `+` suffix.
    Heartbeat { status: HelmStatus, standby: bool },
    /// Periodic check with the time since the last primary heartbeat.
    Tick { elapsed: f64, threshold: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverAction {
    None,
    TakeOver,
    /// Return to `STANDBY` and re-publish state the change filter dropped.
    YieldToPrimary,
    /// Post all-stop `DisabledByStandbyHelm` and become `DISABLED`.
    DisableSelf,
}

fn is_active(status: HelmStatus) -> bool {
    matches!(status, HelmStatus::Park | HelmStatus::Drive)
}

/// What a helm with `current` status should do about `event`.
pub fn failover_transition(current: HelmStatus, is_standby_helm: bool, event: FailoverEvent) -> FailoverAction {
    if matches!(current, HelmStatus::Disabled | HelmStatus::Malconfig) {
        return FailoverAction::None;
    }
    match event {
        FailoverEvent::Heartbeat { status, standby } => {
            if !is_active(status) {
                return FailoverAction::None;
            }
            if is_standby_helm {
                if !standby && current != HelmStatus::Standby {
                    FailoverAction::YieldToPrimary
                } else {
                    FailoverAction::None
                }
            } else if standby {
                FailoverAction::None
            } else {
                FailoverAction::DisableSelf
            }
        }
        FailoverEvent::Tick { elapsed, threshold } => {
            if is_standby_helm && current == HelmStatus::Standby && elapsed > threshold {
                FailoverAction::TakeOver
            } else {
                FailoverAction::None
            }
        }
    }
}
