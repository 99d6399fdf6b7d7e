//! Container stage capability: stop running containers for the detected
//! runtime, with optional per-compose-file granularity and rootless
//! per-user iteration.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use ups_process::{CommandExists, ProcessRunner};

use crate::error::SequencerStageError;

/// Which container runtime the sequencer should drive. "Auto" resolves
/// once at startup and is cached — podman is preferred when both are
/// present, matching the original tool's detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Podman,
    Docker,
}

impl ContainerRuntime {
    pub fn binary(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Docker => "docker",
        }
    }
}

/// Detect the runtime once at startup. Returns `None` if neither is
/// present (the caller disables the container stage entirely).
pub async fn detect_runtime(command_exists: &dyn CommandExists) -> Option<ContainerRuntime> {
    if command_exists.exists("podman").await {
        Some(ContainerRuntime::Podman)
    } else if command_exists.exists("docker").await {
        Some(ContainerRuntime::Docker)
    } else {
        None
    }
}

/// One configured compose project with an optional per-file stop-timeout
/// override.
#[derive(Debug, Clone)]
pub struct ComposeFile {
    pub path: String,
    pub stop_timeout_s: Option<u64>,
}

#[async_trait]
pub trait ContainerController: Send + Sync {
    /// Names/IDs of currently running containers not owned by a compose
    /// project already handled.
    async fn list_running(&self, as_uid: Option<u32>) -> Result<Vec<String>, SequencerStageError>;

    async fn stop(&self, id: &str, timeout_s: u64, as_uid: Option<u32>) -> Result<(), SequencerStageError>;

    /// `docker/podman compose -f <path> down -t <timeout>`.
    async fn compose_down(&self, file: &ComposeFile, default_timeout_s: u64) -> Result<(), SequencerStageError>;
}

/// Real controller over `docker`/`podman`, optionally re-invoked via `sudo
/// -u <user>` for rootless per-user containers (uid >= 1000).
pub struct RuntimeContainerController<R, C> {
    runner: R,
    command_exists: C,
    runtime: ContainerRuntime,
}

impl<R: ProcessRunner, C: CommandExists> RuntimeContainerController<R, C> {
    pub fn new(runner: R, command_exists: C, runtime: ContainerRuntime) -> Self {
        Self {
            runner,
            command_exists,
            runtime,
        }
    }

    /// Builds the full argv as owned strings so callers don't juggle
    /// borrowed lifetimes across the optional `sudo -u` prefix.
    fn argv_for(&self, as_uid: Option<u32>, rest: &[&str]) -> Vec<String> {
        let bin = self.runtime.binary();
        let mut argv = Vec::new();
        if let Some(uid) = as_uid {
            argv.push("sudo".to_string());
            argv.push("-u".to_string());
            argv.push(format!("#{uid}"));
        }
        argv.push(bin.to_string());
        argv.extend(rest.iter().map(|s| s.to_string()));
        argv
    }
}

#[async_trait]
impl<R: ProcessRunner, C: CommandExists> ContainerController for RuntimeContainerController<R, C> {
    async fn list_running(&self, as_uid: Option<u32>) -> Result<Vec<String>, SequencerStageError> {
        if !self.command_exists.exists(self.runtime.binary()).await {
            warn!(runtime = self.runtime.binary(), "container runtime not found, skipping container stage");
            return Ok(Vec::new());
        }
        let argv = self.argv_for(as_uid, &["ps", "-q"]);
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let out = self.runner.run(&argv_refs, Duration::from_secs(10)).await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: format!("{} ps", self.runtime.binary()),
                detail: out.stderr,
            });
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn stop(&self, id: &str, timeout_s: u64, as_uid: Option<u32>) -> Result<(), SequencerStageError> {
        let timeout_str = timeout_s.to_string();
        let argv = self.argv_for(as_uid, &["stop", "-t", &timeout_str, id]);
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let wait = Duration::from_secs(timeout_s + 30);
        let out = self.runner.run(&argv_refs, wait).await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: format!("{} stop {id}", self.runtime.binary()),
                detail: out.stderr,
            });
        }
        Ok(())
    }

    async fn compose_down(&self, file: &ComposeFile, default_timeout_s: u64) -> Result<(), SequencerStageError> {
        let timeout_s = file.stop_timeout_s.unwrap_or(default_timeout_s);
        let timeout_str = timeout_s.to_string();
        let argv = [
            self.runtime.binary(),
            "compose",
            "-f",
            file.path.as_str(),
            "down",
            "-t",
            timeout_str.as_str(),
        ];
        info!(file = %file.path, timeout_s, "stopping compose project");
        let out = self
            .runner
            .run(&argv, Duration::from_secs(timeout_s + 30))
            .await?;
        if !out.success() {
            return Err(SequencerStageError::Failed {
                action: format!("compose down {}", file.path),
                detail: out.stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ups_process::ProcessError;

    struct FakeCommandExists {
        podman: bool,
        docker: bool,
    }

    #[async_trait]
    impl CommandExists for FakeCommandExists {
        async fn exists(&self, name: &str) -> bool {
            match name {
                "podman" => self.podman,
                "docker" => self.docker,
                _ => false,
            }
        }
    }

    #[tokio::test]
    async fn prefers_podman_when_both_present() {
        let checker = FakeCommandExists {
            podman: true,
            docker: true,
        };
        assert_eq!(detect_runtime(&checker).await, Some(ContainerRuntime::Podman));
    }

    #[tokio::test]
    async fn falls_back_to_docker() {
        let checker = FakeCommandExists {
            podman: false,
            docker: true,
        };
        assert_eq!(detect_runtime(&checker).await, Some(ContainerRuntime::Docker));
    }

    #[tokio::test]
    async fn neither_present_disables_the_stage() {
        let checker = FakeCommandExists {
            podman: false,
            docker: false,
        };
        assert_eq!(detect_runtime(&checker).await, None);
    }

    struct FakeRunner;
    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, argv: &[&str], _timeout: Duration) -> Result<ups_process::ProcessOutput, ProcessError> {
            if argv.contains(&"ps") {
                Ok(ups_process::ProcessOutput {
                    exit_code: 0,
                    stdout: "abc123\ndef456\n".to_string(),
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

    #[tokio::test]
    async fn list_running_parses_ids() {
        let controller = RuntimeContainerController::new(
            FakeRunner,
            FakeCommandExists {
                podman: true,
                docker: false,
            },
            ContainerRuntime::Podman,
        );
        let ids = controller.list_running(None).await.unwrap();
        assert_eq!(ids, vec!["abc123".to_string(), "def456".to_string()]);
    }

    #[tokio::test]
    async fn compose_down_uses_per_file_timeout_override() {
        let controller = RuntimeContainerController::new(
            FakeRunner,
            FakeCommandExists {
                podman: true,
                docker: false,
            },
            ContainerRuntime::Podman,
        );
        let file = ComposeFile {
            path: "/srv/app/docker-compose.yml".to_string(),
            stop_timeout_s: Some(5),
        };
        controller.compose_down(&file, 30).await.unwrap();
    }
}
