//! Best-effort state snapshots written to disk so external tooling (status
//! bars, `cat`, monitoring scripts) can see the supervisor's last known
//! reading without talking to NUT directly. Nothing here is load-bearing
//! for the sequencer's own decisions — every write is atomic (temp file
//! then rename) and every failure is logged and swallowed, never
//! propagated.

use std::io;
use std::path::Path;

use tracing::warn;
use ups_core::{DepletionWindow, Sample};

fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

/// Writes the most recent UPS reading as `KEY=VALUE` lines, one per
/// populated field plus an always-present `STATUS`/`TIMESTAMP` pair.
pub fn persist_ups_state(path: &Path, sample: &Sample, now_epoch_s: i64) {
    let mut lines = Vec::new();
    lines.push(format!("TIMESTAMP={now_epoch_s}"));
    let status = sample
        .status
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(format!("STATUS={status}"));
    if let Some(v) = sample.charge_pct {
        lines.push(format!("CHARGE_PCT={v}"));
    }
    if let Some(v) = sample.runtime_s {
        lines.push(format!("RUNTIME_S={v}"));
    }
    if let Some(v) = sample.load_pct {
        lines.push(format!("LOAD_PCT={v}"));
    }
    if let Some(v) = sample.input_voltage_v {
        lines.push(format!("INPUT_VOLTAGE_V={v}"));
    }
    if let Some(v) = sample.output_voltage_v {
        lines.push(format!("OUTPUT_VOLTAGE_V={v}"));
    }
    if let Some(v) = sample.nominal_voltage_v {
        lines.push(format!("NOMINAL_VOLTAGE_V={v}"));
    }

    let contents = lines.join("\n") + "\n";
    if let Err(err) = atomic_write(path, &contents) {
        warn!(path = %path.display(), error = %err, "failed to persist ups state");
    }
}

/// Writes the depletion tracker's sliding window as `epoch:charge_pct`
/// lines, oldest sample first, for offline rate-of-discharge analysis.
pub fn persist_battery_history(path: &Path, window: &DepletionWindow) {
    let contents = window
        .iter()
        .map(|sample| format!("{}:{}", sample.t_epoch_s, sample.charge_pct))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    if let Err(err) = atomic_write(path, &contents) {
        warn!(path = %path.display(), error = %err, "failed to persist battery history");
    }
}
