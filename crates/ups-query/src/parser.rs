//! Parses `upsc`'s colon-delimited `key: value` output into a raw map and,
//! from there, into a typed [`Sample`]. Unknown keys are ignored; missing
//! or non-numeric fields remain explicitly absent rather than coerced.

use std::collections::BTreeMap;

use ups_core::{Sample, StatusToken};

/// Parse one line of `upsc <ups>` output of the form `key: value` (NUT's
/// actual delimiter is `: ` rather than a bare `:`, but we tolerate either
/// by trimming whitespace around the split).
pub fn parse_upsc_output(raw: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    map
}

/// Build a [`Sample`] from the raw key/value map. Any field whose key is
/// absent or whose value fails to parse as the expected type is left
/// `None` rather than causing the whole sample to fail.
pub fn sample_from_vars(vars: &BTreeMap<String, String>) -> Sample {
    let parse_f64 = |key: &str| vars.get(key).and_then(|v| v.parse::<f64>().ok());
    let parse_u64 = |key: &str| {
        vars.get(key)
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| v.max(0.0) as u64)
    };

    let status = vars
        .get("ups.status")
        .map(|s| StatusToken::parse_status(s))
        .unwrap_or_default();

    Sample {
        status,
        charge_pct: parse_f64("battery.charge"),
        runtime_s: parse_u64("battery.runtime"),
        load_pct: parse_f64("ups.load"),
        input_voltage_v: parse_f64("input.voltage"),
        output_voltage_v: parse_f64("output.voltage"),
        nominal_voltage_v: parse_f64("input.voltage.nominal"),
        transfer_low_v: parse_f64("input.transfer.low"),
        transfer_high_v: parse_f64("input.transfer.high"),
    }
}

/// Any occurrence of this substring in stdout or stderr, regardless of exit
/// status, marks the probe as [`ups_core::ProbeOutcome::Stale`].
pub const DATA_STALE_MARKER: &str = "Data stale";
