//! Connection-liveness state machine, including the failsafe rule.

use crate::event::Event;
use crate::sample::ProbeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ok,
    Failed,
}

/// Result of feeding one probe outcome through the connection state
/// machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub state: ConnectionState,
    pub stale_data_count: u32,
    pub events: Vec<Event>,
    /// Set when the failsafe rule fires: the supervisor must invoke the
    /// sequencer immediately regardless of any other evaluator.
    pub failsafe: bool,
}

/// Tracks consecutive stale/unreachable probes and raises the failsafe
/// rule when the UPS goes silent while the system was already on battery.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    stale_data_count: u32,
    tolerance: u32,
    was_on_battery: bool,
}

impl ConnectionStateMachine {
    pub fn new(tolerance: u32) -> Self {
        Self {
            state: ConnectionState::Ok,
            stale_data_count: 0,
            tolerance,
            was_on_battery: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stale_data_count(&self) -> u32 {
        self.stale_data_count
    }

    /// Feed one probe outcome. `on_battery_before` is whatever the prior
    /// successful sample's status indicated, supplied by the caller since
    /// this machine does not retain sample history itself.
    pub fn update(&mut self, outcome: &ProbeOutcome, on_battery_before: bool) -> ConnectionUpdate {
        let mut events = Vec::new();
        let previous_state = self.state;

        match outcome {
            ProbeOutcome::Ok(sample) => {
                self.stale_data_count = 0;
                self.state = ConnectionState::Ok;
                self.was_on_battery = sample.on_battery();
            }
            ProbeOutcome::Stale => {
                self.stale_data_count = (self.stale_data_count + 1).min(self.tolerance);
                if self.stale_data_count >= self.tolerance {
                    self.state = ConnectionState::Failed;
                } else {
                    self.was_on_battery = on_battery_before;
                }
            }
            // Outright unreachable (as opposed to a stale-but-present
            // reading) skips the tolerance window entirely: the UPS isn't
            // just slow to answer, it isn't answering at all.
            ProbeOutcome::Unreachable(_) => {
                self.stale_data_count = 0;
                self.state = ConnectionState::Failed;
                self.was_on_battery = on_battery_before;
            }
        }

        let mut failsafe = false;
        if previous_state == ConnectionState::Ok && self.state == ConnectionState::Failed {
            events.push(Event::ConnectionLost);
            if on_battery_before {
                failsafe = true;
                events.push(Event::FailsafeTriggered);
            }
        } else if previous_state == ConnectionState::Failed && self.state == ConnectionState::Ok {
            events.push(Event::ConnectionRestored);
        }

        ConnectionUpdate {
            state: self.state,
            stale_data_count: self.stale_data_count,
            events,
            failsafe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;

    #[test]
    fn stays_ok_below_tolerance() {
        let mut scm = ConnectionStateMachine::new(3);
        let u1 = scm.update(&ProbeOutcome::Stale, false);
        assert_eq!(u1.state, ConnectionState::Ok);
        let u2 = scm.update(&ProbeOutcome::Stale, false);
        assert_eq!(u2.state, ConnectionState::Ok);
        assert_eq!(u2.stale_data_count, 2);
    }

    #[test]
    fn fails_at_tolerance_and_emits_connection_lost() {
        let mut scm = ConnectionStateMachine::new(3);
        scm.update(&ProbeOutcome::Stale, false);
        scm.update(&ProbeOutcome::Stale, false);
        let u3 = scm.update(&ProbeOutcome::Stale, false);
        assert_eq!(u3.state, ConnectionState::Failed);
        assert!(u3.events.contains(&Event::ConnectionLost));
        assert!(!u3.failsafe);
    }

    #[test]
    fn failsafe_fires_when_on_battery_and_connection_fails() {
        let mut scm = ConnectionStateMachine::new(3);
        scm.update(&ProbeOutcome::Stale, true);
        scm.update(&ProbeOutcome::Stale, true);
        let u3 = scm.update(&ProbeOutcome::Stale, true);
        assert_eq!(u3.state, ConnectionState::Failed);
        assert!(u3.failsafe);
        assert!(u3.events.contains(&Event::FailsafeTriggered));
    }

    #[test]
    fn successful_probe_resets_count_and_restores_connection() {
        let mut scm = ConnectionStateMachine::new(2);
        scm.update(&ProbeOutcome::Stale, false);
        scm.update(&ProbeOutcome::Stale, false);
        assert_eq!(scm.state(), ConnectionState::Failed);

        let sample = Sample::default();
        let restored = scm.update(&ProbeOutcome::Ok(sample), false);
        assert_eq!(restored.state, ConnectionState::Ok);
        assert_eq!(restored.stale_data_count, 0);
        assert!(restored.events.contains(&Event::ConnectionRestored));
    }

    #[test]
    fn stale_data_count_never_exceeds_tolerance() {
        let mut scm = ConnectionStateMachine::new(3);
        for _ in 0..10 {
            scm.update(&ProbeOutcome::Stale, false);
        }
        assert_eq!(scm.state(), ConnectionState::Failed);
        assert_eq!(scm.stale_data_count(), 3);
    }

    #[test]
    fn unreachable_fails_immediately_without_waiting_for_tolerance() {
        let mut scm = ConnectionStateMachine::new(3);
        let u1 = scm.update(&ProbeOutcome::Unreachable("connection refused".into()), false);
        assert_eq!(u1.state, ConnectionState::Failed);
        assert_eq!(u1.stale_data_count, 0);
        assert!(u1.events.contains(&Event::ConnectionLost));
    }

    #[test]
    fn unreachable_while_on_battery_fires_failsafe_immediately() {
        let mut scm = ConnectionStateMachine::new(3);
        let u1 = scm.update(&ProbeOutcome::Unreachable("connection refused".into()), true);
        assert_eq!(u1.state, ConnectionState::Failed);
        assert!(u1.failsafe);
        assert!(u1.events.contains(&Event::FailsafeTriggered));
    }
}
