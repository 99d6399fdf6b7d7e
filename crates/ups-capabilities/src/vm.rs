//! VM stage capability: enumerate running virtual machines, request a
//! graceful shutdown, and force-destroy anything still running after the
//! configured wait.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use ups_process::{CommandExists, ProcessRunner};

use crate::error::SequencerStageError;

#[async_trait]
pub trait VMController: Send + Sync {
    /// Names of currently-running VMs, or `Ok(vec![])` if the tool is
    /// unavailable (the caller treats an empty list and "unavailable" the
    /// same way: nothing to shut down).
    async fn list_running(&self) -> Result<Vec<String>, SequencerStageError>;

    /// Request a graceful ACPI shutdown.
    async fn shutdown(&self, name: &str) -> Result<(), SequencerStageError>;

    /// Force-destroy a VM that ignored the graceful request.
    async fn destroy(&self, name: &str) -> Result<(), SequencerStageError>;

    /// Whether `name` is still reported as running.
    async fn is_running(&self, name: &str) -> bool;
}

/// `virsh`-backed VM controller (libvirt).
pub struct VirshController<R, C> {
    runner: R,
    command_exists: C,
    command_timeout: Duration,
}

impl<R: ProcessRunner, C: CommandExists> VirshController<R, C> {
    pub fn new(runner: R, command_exists: C, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_exists,
            command_timeout,
        }
    }

    async fn virsh(&self, args: &[&str]) -> Result<ups_process::ProcessOutput, SequencerStageError> {
        let mut argv = vec!["virsh"];
        argv.extend_from_slice(args);
        Ok(self.runner.run(&argv, self.command_timeout).await?)
    }
}

#[async_trait]
impl<R: ProcessRunner, C: CommandExists> VMController for VirshController<R, C> {
    async fn list_running(&self) -> Result<Vec<String>, SequencerStageError> {
        if !self.command_exists.exists("virsh").await {
            warn!("virsh not found, skipping VM stage");
            return Ok(Vec::new());
        }
        let out = self.virsh(&["list", "--name", "--state-running"]).await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: "virsh list".to_string(),
                detail: out.stderr,
            });
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn shutdown(&self, name: &str) -> Result<(), SequencerStageError> {
        let out = self.virsh(&["shutdown", name]).await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: format!("virsh shutdown {name}"),
                detail: out.stderr,
            });
        }
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<(), SequencerStageError> {
        let out = self.virsh(&["destroy", name]).await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: format!("virsh destroy {name}"),
                detail: out.stderr,
            });
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        match self.list_running().await {
            Ok(running) => running.iter().any(|n| n == name),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ups_process::ProcessError;

    struct FakeRunner {
        list_output: &'static str,
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, argv: &[&str], _timeout: Duration) -> Result<ups_process::ProcessOutput, ProcessError> {
            if argv.get(1) == Some(&"list") {
                Ok(ups_process::ProcessOutput {
                    exit_code: 0,
                    stdout: self.list_output.to_string(),
                    stderr: String::new(),
                })
            } else {
                Ok(ups_process::ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }

    struct AlwaysExists;
    #[async_trait]
    impl CommandExists for AlwaysExists {
        async fn exists(&self, _name: &str) -> bool {
            true
        }
    }

    struct NeverExists;
    #[async_trait]
    impl CommandExists for NeverExists {
        async fn exists(&self, _name: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn list_running_parses_newline_separated_names() {
        let controller = VirshController::new(
            FakeRunner {
                list_output: "vm1\nvm2\n",
            },
            AlwaysExists,
            Duration::from_secs(5),
        );
        let running = controller.list_running().await.unwrap();
        assert_eq!(running, vec!["vm1".to_string(), "vm2".to_string()]);
    }

    #[tokio::test]
    async fn missing_virsh_yields_empty_list_not_error() {
        let controller = VirshController::new(
            FakeRunner { list_output: "" },
            NeverExists,
            Duration::from_secs(5),
        );
        assert_eq!(controller.list_running().await.unwrap(), Vec::<String>::new());
    }
}
