//! Error type for the process-invocation boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout_s}s")]
    Timeout { program: String, timeout_s: u64 },
}
