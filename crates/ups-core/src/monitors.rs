//! Edge-triggered power-quality state machines: line voltage, AVR
//! (boost/trim), bypass, and overload. Each only emits an event when its
//! own state changes, never on every tick.

use crate::event::Event;
use crate::sample::{Sample, StatusToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageState {
    Normal,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvrState {
    Inactive,
    Boost,
    Trim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassState {
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadState {
    Inactive,
    Active,
}

/// Cross-tick memory for the four power-quality monitors, derived once at
/// startup for the voltage thresholds and otherwise updated every tick.
#[derive(Debug, Clone, Copy)]
pub struct MonitorState {
    pub voltage_state: VoltageState,
    pub avr_state: AvrState,
    pub bypass_state: BypassState,
    pub overload_state: OverloadState,
    pub voltage_warning_low_v: f64,
    pub voltage_warning_high_v: f64,
}

impl MonitorState {
    pub fn new(voltage_warning_low_v: f64, voltage_warning_high_v: f64) -> Self {
        Self {
            voltage_state: VoltageState::Normal,
            avr_state: AvrState::Inactive,
            bypass_state: BypassState::Inactive,
            overload_state: OverloadState::Inactive,
            voltage_warning_low_v,
            voltage_warning_high_v,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerMonitorUpdate {
    pub events: Vec<Event>,
}

/// Drives all four power-quality monitors from one sample per tick.
#[derive(Debug, Clone)]
pub struct PowerMonitors {
    state: MonitorState,
}

impl PowerMonitors {
    pub fn new(state: MonitorState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// `latched` suppresses all event emission: once the shutdown sequence
    /// has started, these monitors have nothing useful left to report.
    pub fn update(&mut self, sample: &Sample, latched: bool) -> PowerMonitorUpdate {
        let mut events = Vec::new();
        let on_battery_or_fsd = sample.on_battery() || sample.forced_shutdown();

        // Voltage quality: forced to NORMAL while on battery/FSD, since the
        // input rail reading is meaningless once we're running off battery.
        let new_voltage_state = if on_battery_or_fsd {
            VoltageState::Normal
        } else {
            match sample.input_voltage_v {
                Some(v) if v < self.state.voltage_warning_low_v => VoltageState::Low,
                Some(v) if v > self.state.voltage_warning_high_v => VoltageState::High,
                _ => VoltageState::Normal,
            }
        };
        if new_voltage_state != self.state.voltage_state {
            let event = match new_voltage_state {
                VoltageState::Low => Some(Event::BrownoutDetected),
                VoltageState::High => Some(Event::OverVoltageDetected),
                VoltageState::Normal => Some(Event::VoltageNormalized),
            };
            if let Some(event) = event {
                events.push(event);
            }
            self.state.voltage_state = new_voltage_state;
        }

        // AVR.
        let new_avr_state = if sample.has(StatusToken::Boost) {
            AvrState::Boost
        } else if sample.has(StatusToken::Trim) {
            AvrState::Trim
        } else {
            AvrState::Inactive
        };
        if new_avr_state != self.state.avr_state {
            let event = match new_avr_state {
                AvrState::Boost => Event::AvrBoostActive,
                AvrState::Trim => Event::AvrTrimActive,
                AvrState::Inactive => Event::AvrInactive,
            };
            events.push(event);
            self.state.avr_state = new_avr_state;
        }

        // Bypass.
        let new_bypass_state = if sample.has(StatusToken::Bypass) {
            BypassState::Active
        } else {
            BypassState::Inactive
        };
        if new_bypass_state != self.state.bypass_state {
            events.push(match new_bypass_state {
                BypassState::Active => Event::BypassModeActive,
                BypassState::Inactive => Event::BypassModeInactive,
            });
            self.state.bypass_state = new_bypass_state;
        }

        // Overload.
        let new_overload_state = if sample.has(StatusToken::Overload) {
            OverloadState::Active
        } else {
            OverloadState::Inactive
        };
        if new_overload_state != self.state.overload_state {
            events.push(match new_overload_state {
                OverloadState::Active => Event::OverloadActive,
                OverloadState::Inactive => Event::OverloadResolved,
            });
            self.state.overload_state = new_overload_state;
        }

        if latched {
            events.clear();
        }

        PowerMonitorUpdate { events }
    }
}
