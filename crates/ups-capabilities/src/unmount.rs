//! Unmount stage capability. A timeout or error never aborts the stage; if
//! the mountpoint turns out to be already unmounted after a failure, the
//! message is demoted from warning to info.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use ups_process::ProcessRunner;

use crate::error::SequencerStageError;

#[async_trait]
pub trait Unmounter: Send + Sync {
    /// Whether `path` is currently a mount point.
    async fn is_mounted(&self, path: &str) -> bool;

    /// Attempt `umount <path>`, bounded by `timeout`.
    async fn unmount(&self, path: &str, timeout: Duration) -> Result<(), SequencerStageError>;
}

pub struct RealUnmounter<R> {
    runner: R,
}

impl<R: ProcessRunner> RealUnmounter<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: ProcessRunner> Unmounter for RealUnmounter<R> {
    async fn is_mounted(&self, path: &str) -> bool {
        match self.runner.run(&["mountpoint", "-q", path], Duration::from_secs(5)).await {
            Ok(out) => out.success(),
            Err(_) => false,
        }
    }

    async fn unmount(&self, path: &str, timeout: Duration) -> Result<(), SequencerStageError> {
        let out = self.runner.run(&["umount", path], timeout).await?;
        if out.success() {
            return Ok(());
        }

        if out.timed_out() {
            return Err(SequencerStageError::TimedOut {
                action: format!("umount {path}"),
                timeout_s: timeout.as_secs(),
            });
        }
        Err(SequencerStageError::Failed {
            action: format!("umount {path}"),
            detail: out.stderr,
        })
    }
}

/// Runs the unmount attempt and applies the "demote to info if no longer
/// mounted" rule on failure. Lives alongside the trait since it is the
/// exact non-abortive discipline §4.6 describes, not sequencer-specific
/// orchestration.
pub async fn unmount_best_effort(unmounter: &dyn Unmounter, path: &str, timeout: Duration) {
    match unmounter.unmount(path, timeout).await {
        Ok(()) => info!(path, "unmounted"),
        Err(err) => {
            if unmounter.is_mounted(path).await {
                warn!(path, error = %err, "unmount failed");
            } else {
                info!(path, error = %err, "unmount reported failure but mountpoint is already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ups_process::{ProcessError, ProcessOutput};

    struct FakeRunner {
        mount_result: bool,
        umount_success: bool,
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, argv: &[&str], _timeout: Duration) -> Result<ProcessOutput, ProcessError> {
            if argv.first() == Some(&"mountpoint") {
                Ok(ProcessOutput {
                    exit_code: if self.mount_result { 0 } else { 1 },
                    stdout: String::new(),
                    stderr: String::new(),
                })
            } else {
                Ok(ProcessOutput {
                    exit_code: if self.umount_success { 0 } else { 1 },
                    stdout: String::new(),
                    stderr: "device is busy".to_string(),
                })
            }
        }
    }

    #[tokio::test]
    async fn unmount_failure_does_not_propagate_via_best_effort() {
        let unmounter = RealUnmounter::new(FakeRunner {
            mount_result: true,
            umount_success: false,
        });
        unmount_best_effort(&unmounter, "/mnt/data", Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn unmount_success_reports_ok() {
        let unmounter = RealUnmounter::new(FakeRunner {
            mount_result: false,
            umount_success: true,
        });
        assert!(unmounter.unmount("/mnt/data", Duration::from_secs(5)).await.is_ok());
    }
}
