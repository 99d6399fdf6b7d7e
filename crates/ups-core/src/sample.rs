//! The UPS snapshot data model.

use std::collections::BTreeSet;
use std::fmt;

/// A single status token reported by the UPS, e.g. `OL` or `DISCHRG`.
///
/// NUT reports these space-separated in the `ups.status` variable. We keep
/// them as a closed set rather than raw strings so the rest of the crate
/// can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusToken {
    /// On line power.
    OnLine,
    /// On battery.
    OnBattery,
    /// Battery charging.
    Charging,
    /// Battery discharging.
    Discharging,
    /// Forced shutdown requested by the UPS itself.
    ForcedShutdown,
    /// Running through bypass.
    Bypass,
    /// AVR boosting (raising) output voltage.
    Boost,
    /// AVR trimming (lowering) output voltage.
    Trim,
    /// Overloaded.
    Overload,
    /// Any token NUT reports that we don't model explicitly.
    Other,
}

impl StatusToken {
    fn parse_one(token: &str) -> Self {
        match token {
            "OL" => Self::OnLine,
            "OB" => Self::OnBattery,
            "CHRG" => Self::Charging,
            "DISCHRG" => Self::Discharging,
            "FSD" => Self::ForcedShutdown,
            "BYPASS" => Self::Bypass,
            "BOOST" => Self::Boost,
            "TRIM" => Self::Trim,
            "OVER" => Self::Overload,
            _ => Self::Other,
        }
    }

    /// Parse a space-separated `ups.status` value into a token set.
    pub fn parse_status(raw: &str) -> BTreeSet<Self> {
        raw.split_whitespace().map(Self::parse_one).collect()
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OnLine => "OL",
            Self::OnBattery => "OB",
            Self::Charging => "CHRG",
            Self::Discharging => "DISCHRG",
            Self::ForcedShutdown => "FSD",
            Self::Bypass => "BYPASS",
            Self::Boost => "BOOST",
            Self::Trim => "TRIM",
            Self::Overload => "OVER",
            Self::Other => "?",
        };
        f.write_str(s)
    }
}

/// One UPS reading. Every field beyond `status` is optional because a real
/// UPS/driver combination routinely omits several of these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub status: BTreeSet<StatusToken>,
    pub charge_pct: Option<f64>,
    pub runtime_s: Option<u64>,
    pub load_pct: Option<f64>,
    pub input_voltage_v: Option<f64>,
    pub output_voltage_v: Option<f64>,
    pub nominal_voltage_v: Option<f64>,
    pub transfer_low_v: Option<f64>,
    pub transfer_high_v: Option<f64>,
}

impl Sample {
    pub fn has(&self, token: StatusToken) -> bool {
        self.status.contains(&token)
    }

    pub fn on_battery(&self) -> bool {
        self.has(StatusToken::OnBattery)
    }

    pub fn forced_shutdown(&self) -> bool {
        self.has(StatusToken::ForcedShutdown)
    }
}

/// The result of one probe attempt against the UPS.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Ok(Sample),
    /// `upsc` reported "Data stale" (regardless of exit status).
    Stale,
    /// `upsc` could not be reached or exited non-zero with no stale marker.
    Unreachable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tokens() {
        let status = StatusToken::parse_status("OB DISCHRG");
        assert!(status.contains(&StatusToken::OnBattery));
        assert!(status.contains(&StatusToken::Discharging));
        assert_eq!(status.len(), 2);
    }

    #[test]
    fn unknown_token_becomes_other() {
        let status = StatusToken::parse_status("OL RB");
        assert!(status.contains(&StatusToken::OnLine));
        assert!(status.contains(&StatusToken::Other));
    }

    #[test]
    fn empty_status_is_empty_set() {
        assert!(StatusToken::parse_status("").is_empty());
    }

    #[test]
    fn sample_on_battery_and_forced_shutdown_helpers() {
        let mut sample = Sample {
            status: StatusToken::parse_status("OB FSD"),
            ..Default::default()
        };
        assert!(sample.on_battery());
        assert!(sample.forced_shutdown());
        sample.status = StatusToken::parse_status("OL");
        assert!(!sample.on_battery());
        assert!(!sample.forced_shutdown());
    }
}
