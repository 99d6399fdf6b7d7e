//! Event taxonomy emitted by the connection, monitor, and trigger state
//! machines on edge transitions. The supervisor fans these out to the
//! notification dispatcher; nothing in this crate knows how they're
//! delivered.

use std::fmt;

/// Severity attached to an [`Event`] for the notification dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OnBattery,
    PowerRestored,
    BrownoutDetected,
    OverVoltageDetected,
    VoltageNormalized,
    AvrBoostActive,
    AvrTrimActive,
    AvrInactive,
    BypassModeActive,
    BypassModeInactive,
    OverloadActive,
    OverloadResolved,
    ConnectionLost,
    ConnectionRestored,
    FailsafeTriggered,
}

impl Event {
    /// Severity used when this event is dispatched as a notification.
    pub fn severity(&self) -> Severity {
        match self {
            Event::OnBattery => Severity::Warning,
            Event::PowerRestored => Severity::Success,
            Event::BrownoutDetected => Severity::Warning,
            Event::OverVoltageDetected => Severity::Warning,
            Event::VoltageNormalized => Severity::Info,
            Event::AvrBoostActive => Severity::Warning,
            Event::AvrTrimActive => Severity::Warning,
            Event::AvrInactive => Severity::Info,
            Event::BypassModeActive => Severity::Warning,
            Event::BypassModeInactive => Severity::Info,
            Event::OverloadActive => Severity::Failure,
            Event::OverloadResolved => Severity::Success,
            Event::ConnectionLost => Severity::Failure,
            Event::ConnectionRestored => Severity::Success,
            Event::FailsafeTriggered => Severity::Failure,
        }
    }

    /// Events that are logged locally but never handed to the dispatcher,
    /// per the "normalized/inactive states are informational only" rule.
    pub fn dispatch_suppressed(&self) -> bool {
        matches!(self, Event::VoltageNormalized | Event::AvrInactive)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::OnBattery => "ON_BATTERY",
            Event::PowerRestored => "POWER_RESTORED",
            Event::BrownoutDetected => "BROWNOUT_DETECTED",
            Event::OverVoltageDetected => "OVER_VOLTAGE_DETECTED",
            Event::VoltageNormalized => "VOLTAGE_NORMALIZED",
            Event::AvrBoostActive => "AVR_BOOST_ACTIVE",
            Event::AvrTrimActive => "AVR_TRIM_ACTIVE",
            Event::AvrInactive => "AVR_INACTIVE",
            Event::BypassModeActive => "BYPASS_MODE_ACTIVE",
            Event::BypassModeInactive => "BYPASS_MODE_INACTIVE",
            Event::OverloadActive => "OVERLOAD_ACTIVE",
            Event::OverloadResolved => "OVERLOAD_RESOLVED",
            Event::ConnectionLost => "CONNECTION_LOST",
            Event::ConnectionRestored => "CONNECTION_RESTORED",
            Event::FailsafeTriggered => "FAILSAFE_TRIGGERED",
        };
        f.write_str(s)
    }
}
