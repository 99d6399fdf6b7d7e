//! Immutable decision thresholds consumed by the trigger evaluator and the
//! connection/power-quality state machines. Everything that shapes *when*
//! to shut down lives here; *how* to shut down lives in the sequencer's
//! own configuration types.

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Charge percentage at or below which the low-charge predicate fires.
    pub low_charge_threshold_pct: f64,
    /// Predicted runtime in seconds at or below which the low-runtime
    /// predicate fires.
    pub low_runtime_threshold_s: u64,
    /// Depletion rate (%/min) at or above which the high-depletion-rate
    /// predicate fires, after `depletion_grace_period_s` has elapsed.
    pub critical_depletion_rate_pct_per_min: f64,
    /// Seconds the high-depletion-rate predicate must keep observing the
    /// critical rate before it actually triggers a shutdown.
    pub depletion_grace_period_s: i64,
    /// Whether the "running on battery too long" predicate is active.
    pub extended_time_enabled: bool,
    /// Threshold for the extended-time predicate.
    pub extended_time_threshold_s: i64,
    /// Sliding window width used by the depletion tracker.
    pub depletion_window_s: i64,
    /// Consecutive stale/unreachable probes tolerated before the
    /// connection is considered failed.
    pub stale_tolerance: u32,
    /// Seconds between probe ticks on a healthy loop.
    pub check_interval_s: u64,
    /// Seconds to sleep after a failed probe instead of `check_interval_s`.
    pub probe_failure_backoff_s: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            low_charge_threshold_pct: 20.0,
            low_runtime_threshold_s: 300,
            critical_depletion_rate_pct_per_min: 15.0,
            depletion_grace_period_s: 90,
            extended_time_enabled: true,
            extended_time_threshold_s: 600,
            depletion_window_s: 300,
            stale_tolerance: 3,
            check_interval_s: 5,
            probe_failure_backoff_s: 5,
        }
    }
}
