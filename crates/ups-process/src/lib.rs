//! The process-invocation boundary: every external binary the supervisor
//! shells out to (`upsc`, `virsh`, a container runtime, `umount`, `ssh`,
//! `wall`, `shutdown`) goes through [`ProcessRunner`]. Nothing upstream
//! calls `tokio::process::Command` directly, so the decision/sequencing
//! crates stay testable with a fake runner.

mod error;
mod runner;

pub use error::ProcessError;
pub use runner::{CommandExists, ProcessOutput, ProcessRunner, RealCommandExists, TokioProcessRunner};
