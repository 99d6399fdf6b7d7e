//! Filesystem sync stage capability (stages 4 and 7): a thin wrapper over
//! `sync(1)` so the sequencer doesn't call `std::process::Command`
//! directly.

use std::time::Duration;

use async_trait::async_trait;
use ups_process::ProcessRunner;

use crate::error::SequencerStageError;

#[async_trait]
pub trait FsSync: Send + Sync {
    async fn sync(&self) -> Result<(), SequencerStageError>;
}

pub struct RealFsSync<R> {
    runner: R,
    timeout: Duration,
}

impl<R: ProcessRunner> RealFsSync<R> {
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

#[async_trait]
impl<R: ProcessRunner> FsSync for RealFsSync<R> {
    async fn sync(&self) -> Result<(), SequencerStageError> {
        let out = self.runner.run(&["sync"], self.timeout).await?;
        if out.success() {
            Ok(())
        } else {
            Err(SequencerStageError::Failed {
                action: "sync".to_string(),
                detail: out.stderr,
            })
        }
    }
}
