//! `UpsQuery` capability trait and the `upsc`-backed implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ups_core::{ProbeOutcome, Sample};
use ups_process::ProcessRunner;

use crate::parser::{parse_upsc_output, sample_from_vars, DATA_STALE_MARKER};

/// Capability the decision engine consumes to read the UPS. `snapshot()` is
/// called every tick; `var()` only at startup to discover voltage
/// thresholds.
#[async_trait]
pub trait UpsQuery: Send + Sync {
    async fn snapshot(&self) -> ProbeOutcome;

    /// A single `upsc <ups> <key>` value, or `None` if absent/unreachable.
    async fn var(&self, key: &str) -> Option<String>;

    /// The full raw key/value map, for `--check-config` diagnostics. Built
    /// on the same parser as `snapshot()` so there is exactly one parsing
    /// code path.
    async fn list_vars(&self) -> Option<BTreeMap<String, String>>;
}

/// Queries a NUT-managed UPS via `upsc <ups_name>`.
#[derive(Debug, Clone)]
pub struct NutUpsQuery<R> {
    runner: R,
    ups_name: String,
    timeout: Duration,
}

impl<R: ProcessRunner> NutUpsQuery<R> {
    pub fn new(runner: R, ups_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            ups_name: ups_name.into(),
            timeout,
        }
    }

    async fn run_upsc(&self, extra: &[&str]) -> Result<(i32, String, String), ups_process::ProcessError> {
        let mut argv = vec!["upsc", self.ups_name.as_str()];
        argv.extend_from_slice(extra);
        let out = self.runner.run(&argv, self.timeout).await?;
        Ok((out.exit_code, out.stdout, out.stderr))
    }
}

#[async_trait]
impl<R: ProcessRunner> UpsQuery for NutUpsQuery<R> {
    async fn snapshot(&self) -> ProbeOutcome {
        let (exit_code, stdout, stderr) = match self.run_upsc(&[]).await {
            Ok(result) => result,
            Err(err) => return ProbeOutcome::Unreachable(err.to_string()),
        };

        if stdout.contains(DATA_STALE_MARKER) || stderr.contains(DATA_STALE_MARKER) {
            return ProbeOutcome::Stale;
        }
        if exit_code != 0 {
            let reason = if stderr.trim().is_empty() {
                format!("upsc exited with code {exit_code}")
            } else {
                stderr.trim().to_string()
            };
            return ProbeOutcome::Unreachable(reason);
        }

        let vars = parse_upsc_output(&stdout);
        ProbeOutcome::Ok(build_sample(vars))
    }

    async fn var(&self, key: &str) -> Option<String> {
        let (exit_code, stdout, stderr) = self.run_upsc(&[key]).await.ok()?;
        if exit_code != 0 || stdout.contains(DATA_STALE_MARKER) || stderr.contains(DATA_STALE_MARKER) {
            return None;
        }
        let value = stdout.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    async fn list_vars(&self) -> Option<BTreeMap<String, String>> {
        let (exit_code, stdout, _stderr) = self.run_upsc(&[]).await.ok()?;
        if exit_code != 0 {
            return None;
        }
        Some(parse_upsc_output(&stdout))
    }
}

fn build_sample(vars: BTreeMap<String, String>) -> Sample {
    sample_from_vars(&vars)
}
