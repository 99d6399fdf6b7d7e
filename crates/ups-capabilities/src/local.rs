//! Final stage: hand off to the OS poweroff. This is the one stage that
//! does not return control on success — the process is expected to be
//! terminated by the OS shortly after.

use std::time::Duration;

use async_trait::async_trait;
use ups_process::ProcessRunner;

use crate::error::SequencerStageError;

#[async_trait]
pub trait LocalShutdown: Send + Sync {
    /// Broadcast a wall message to all logged-in users.
    async fn broadcast(&self, message: &str) -> Result<(), SequencerStageError>;

    /// Power the machine off with `message` recorded as the shutdown
    /// reason. On success this call does not return in practice; callers
    /// must not run further logic after it.
    async fn poweroff(&self, message: &str) -> Result<(), SequencerStageError>;
}

pub struct SystemShutdown<R> {
    runner: R,
    command_timeout: Duration,
}

impl<R: ProcessRunner> SystemShutdown<R> {
    pub fn new(runner: R, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
        }
    }
}

#[async_trait]
impl<R: ProcessRunner> LocalShutdown for SystemShutdown<R> {
    async fn broadcast(&self, message: &str) -> Result<(), SequencerStageError> {
        let out = self
            .runner
            .run(&["wall", message], self.command_timeout)
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(SequencerStageError::Failed {
                action: "wall".to_string(),
                detail: out.stderr,
            })
        }
    }

    async fn poweroff(&self, message: &str) -> Result<(), SequencerStageError> {
        let out = self
            .runner
            .run(&["shutdown", "-h", "now", message], self.command_timeout)
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(SequencerStageError::Failed {
                action: "shutdown -h now".to_string(),
                detail: out.stderr,
            })
        }
    }
}
