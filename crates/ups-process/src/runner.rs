//! `ProcessRunner` trait and the real `tokio::process::Command`-backed
//! implementation. Ported from the sync `TmuxCommandRunner` pattern, made
//! async and timeout-bounded since every sequencer stage needs a hard
//! wall-clock ceiling (§5: "no unbounded wait anywhere").

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ProcessError;

/// Exit code a timed-out invocation reports, matching the `timeout(1)`
/// convention the original shelled-out-to wrapper relied on.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when the target binary does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;

/// stdout/stderr captured from one process invocation, plus its exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == EXIT_TIMEOUT
    }
}

/// Executes an external command with a hard wall-clock timeout. Enables
/// mock injection so the sequencer/capability adapters can be tested
/// without spawning real binaries.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, argv: &[&str], timeout: Duration) -> Result<ProcessOutput, ProcessError>;
}

#[async_trait]
impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    async fn run(&self, argv: &[&str], timeout: Duration) -> Result<ProcessOutput, ProcessError> {
        (**self).run(argv, timeout).await
    }
}

/// Tests whether a binary exists on `PATH`, used for the "required vs
/// optional capability" startup checks in §7.
#[async_trait]
pub trait CommandExists: Send + Sync {
    async fn exists(&self, name: &str) -> bool;
}

/// Real `tokio::process::Command`-backed runner.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, argv: &[&str], wait: Duration) -> Result<ProcessOutput, ProcessError> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        // Mirrors the original wrapper's LC_NUMERIC=C hint so any numeric
        // output (upsc values) always uses a dot decimal separator.
        cmd.env("LC_NUMERIC", "C");
        cmd.kill_on_drop(true);

        let spawn = cmd.output();
        match timeout(wait, spawn).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(source)) => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    Ok(ProcessOutput {
                        exit_code: EXIT_NOT_FOUND,
                        stdout: String::new(),
                        stderr: source.to_string(),
                    })
                } else {
                    Err(ProcessError::Spawn {
                        program: program.to_string(),
                        source,
                    })
                }
            }
            Err(_elapsed) => Ok(ProcessOutput {
                exit_code: EXIT_TIMEOUT,
                stdout: String::new(),
                stderr: format!("{program} timed out after {:?}", wait),
            }),
        }
    }
}

/// Real `CommandExists` check via `which`-style `PATH` search, avoiding a
/// shell dependency.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExists;

#[async_trait]
impl CommandExists for RealCommandExists {
    async fn exists(&self, name: &str) -> bool {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let Ok(path_var) = std::env::var("PATH") else {
                return false;
            };
            std::env::split_paths(&path_var).any(|dir| {
                let candidate = dir.join(&name);
                candidate.is_file()
            })
        })
        .await
        .unwrap_or(false)
    }
}
