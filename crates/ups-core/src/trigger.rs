//! The shutdown trigger evaluator: four prioritized predicates run while the
//! UPS reports on-battery. The first predicate that fires short-circuits
//! the rest and yields a [`ShutdownVerdict`].

use crate::policy::Policy;
use crate::sample::Sample;

/// Outcome of one trigger-evaluator pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownVerdict {
    /// No predicate fired; optionally a log line to emit at `info`.
    Continue { info: Option<String> },
    /// A predicate fired; `reason` is meant for the wall/notification text.
    Shutdown { reason: String },
}

impl ShutdownVerdict {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ShutdownVerdict::Shutdown { .. })
    }

    fn cont() -> Self {
        ShutdownVerdict::Continue { info: None }
    }

    fn info(msg: impl Into<String>) -> Self {
        ShutdownVerdict::Continue {
            info: Some(msg.into()),
        }
    }

    fn shutdown(reason: impl Into<String>) -> Self {
        ShutdownVerdict::Shutdown {
            reason: reason.into(),
        }
    }
}

/// Cross-tick memory the evaluator needs beyond the current sample: when the
/// current on-battery episode started and whether the extended-time info
/// log has already fired once this episode.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerContext {
    pub on_battery_start_epoch: i64,
    pub extended_time_logged: bool,
}

/// Stateless predicate evaluator; all per-episode memory lives in
/// [`TriggerContext`], owned by the caller (the supervisor).
#[derive(Debug, Clone)]
pub struct TriggerEvaluator<'a> {
    policy: &'a Policy,
}

impl<'a> TriggerEvaluator<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Evaluate the four predicates, in order, against `sample` at time
    /// `now_epoch_s`, given the current depletion `rate_pct_per_min` and
    /// mutable `ctx`. Only call while the sample is known to be on-battery;
    /// this does not itself check `sample.on_battery()`.
    pub fn evaluate(
        &self,
        sample: &Sample,
        now_epoch_s: i64,
        rate_pct_per_min: f64,
        ctx: &mut TriggerContext,
    ) -> ShutdownVerdict {
        let time_on_battery_s = (now_epoch_s - ctx.on_battery_start_epoch).max(0);

        // 1. Low charge. A missing/non-numeric reading is the caller's
        // concern to warn about (this crate touches no logging); we just
        // skip straight to the next predicate.
        if let Some(charge) = sample.charge_pct {
            if charge < self.policy.low_charge_threshold_pct {
                return ShutdownVerdict::shutdown(format!(
                    "Battery charge {charge:.0}% below threshold {:.0}%",
                    self.policy.low_charge_threshold_pct
                ));
            }
        }

        // 2. Low runtime.
        if let Some(runtime_s) = sample.runtime_s {
            if runtime_s < self.policy.low_runtime_threshold_s {
                return ShutdownVerdict::shutdown(format!(
                    "Predicted runtime {runtime_s}s below threshold {}s",
                    self.policy.low_runtime_threshold_s
                ));
            }
        }

        // 3. High depletion rate, gated by the grace period.
        if rate_pct_per_min > self.policy.critical_depletion_rate_pct_per_min {
            if time_on_battery_s >= self.policy.depletion_grace_period_s {
                return ShutdownVerdict::shutdown(format!(
                    "Depletion rate {rate_pct_per_min:.2}%/min exceeds critical {:.2}%/min \
                     after grace period ({time_on_battery_s}s on battery)",
                    self.policy.critical_depletion_rate_pct_per_min
                ));
            }
            return ShutdownVerdict::info(format!(
                "Depletion rate {rate_pct_per_min:.2}%/min exceeds critical but ignored \
                 during grace period ({time_on_battery_s}s < {}s)",
                self.policy.depletion_grace_period_s
            ));
        }

        // 4. Extended time on battery.
        if self.policy.extended_time_enabled
            && time_on_battery_s > self.policy.extended_time_threshold_s
        {
            return ShutdownVerdict::shutdown(format!(
                "On battery for {time_on_battery_s}s, past extended-time threshold {}s",
                self.policy.extended_time_threshold_s
            ));
        }
        if !ctx.extended_time_logged
            && time_on_battery_s > self.policy.extended_time_threshold_s
        {
            ctx.extended_time_logged = true;
            return ShutdownVerdict::info(format!(
                "On battery for {time_on_battery_s}s past extended-time threshold, \
                 but the extended-time trigger is disabled"
            ));
        }

        ShutdownVerdict::cont()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            low_charge_threshold_pct: 20.0,
            low_runtime_threshold_s: 300,
            critical_depletion_rate_pct_per_min: 15.0,
            depletion_grace_period_s: 90,
            extended_time_enabled: true,
            extended_time_threshold_s: 600,
            ..Policy::default()
        }
    }

    fn sample(charge: Option<f64>, runtime: Option<u64>) -> Sample {
        Sample {
            charge_pct: charge,
            runtime_s: runtime,
            ..Default::default()
        }
    }

    #[test]
    fn low_charge_fires_first_and_mentions_threshold() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let verdict = eval.evaluate(&sample(Some(19.0), Some(10_000)), 2, 0.0, &mut ctx);
        match verdict {
            ShutdownVerdict::Shutdown { reason } => {
                assert!(reason.contains("19"));
                assert!(reason.contains("20"));
            }
            other => panic!("expected shutdown, got {other:?}"),
        }
    }

    #[test]
    fn missing_charge_does_not_trigger() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let verdict = eval.evaluate(&sample(None, Some(10_000)), 0, 0.0, &mut ctx);
        assert!(!verdict.is_shutdown());
    }

    #[test]
    fn low_runtime_fires_when_charge_is_fine() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let verdict = eval.evaluate(&sample(Some(80.0), Some(100)), 0, 0.0, &mut ctx);
        assert!(verdict.is_shutdown());
    }

    #[test]
    fn missing_runtime_is_skipped_silently() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let verdict = eval.evaluate(&sample(Some(80.0), None), 0, 0.0, &mut ctx);
        assert!(!verdict.is_shutdown());
    }

    #[test]
    fn high_rate_within_grace_logs_and_continues() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext {
            on_battery_start_epoch: 0,
            extended_time_logged: false,
        };
        let verdict = eval.evaluate(&sample(Some(80.0), Some(10_000)), 60, 20.0, &mut ctx);
        match verdict {
            ShutdownVerdict::Continue { info } => {
                assert!(info.unwrap().contains("grace period"));
            }
            other => panic!("expected continue with info, got {other:?}"),
        }
    }

    #[test]
    fn high_rate_after_grace_triggers_shutdown() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext {
            on_battery_start_epoch: 0,
            extended_time_logged: false,
        };
        let verdict = eval.evaluate(&sample(Some(80.0), Some(10_000)), 100, 20.0, &mut ctx);
        match verdict {
            ShutdownVerdict::Shutdown { reason } => {
                assert!(reason.contains("Depletion rate"));
                assert!(reason.contains("after grace period"));
            }
            other => panic!("expected shutdown, got {other:?}"),
        }
    }

    #[test]
    fn extended_time_disabled_logs_once_then_stays_silent() {
        let mut p = policy();
        p.extended_time_enabled = false;
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let first = eval.evaluate(&sample(Some(80.0), Some(10_000)), 700, 0.0, &mut ctx);
        assert!(matches!(first, ShutdownVerdict::Continue { info: Some(_) }));
        assert!(ctx.extended_time_logged);
        let second = eval.evaluate(&sample(Some(80.0), Some(10_000)), 800, 0.0, &mut ctx);
        assert_eq!(second, ShutdownVerdict::cont());
    }

    #[test]
    fn extended_time_enabled_triggers_shutdown() {
        let p = policy();
        let eval = TriggerEvaluator::new(&p);
        let mut ctx = TriggerContext::default();
        let verdict = eval.evaluate(&sample(Some(80.0), Some(10_000)), 700, 0.0, &mut ctx);
        assert!(verdict.is_shutdown());
    }
}
