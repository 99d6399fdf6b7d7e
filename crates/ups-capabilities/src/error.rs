//! Error type shared by every capability adapter in this crate. The
//! sequencer treats all of these uniformly: log, never abort.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerStageError {
    #[error("{tool} not available")]
    ToolUnavailable { tool: &'static str },

    #[error("{action} timed out after {timeout_s}s")]
    TimedOut { action: String, timeout_s: u64 },

    #[error("{action} failed: {detail}")]
    Failed { action: String, detail: String },

    #[error(transparent)]
    Process(#[from] ups_process::ProcessError),
}
