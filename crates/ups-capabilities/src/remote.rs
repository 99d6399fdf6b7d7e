//! Remote-peer shutdown stage: invokes each enabled peer's shutdown
//! command over `ssh`, in declared order. Failure is logged and skipped —
//! one peer's unreachability never blocks the rest.

use std::time::Duration;

use async_trait::async_trait;
use ups_process::ProcessRunner;

use crate::error::SequencerStageError;

/// One remote peer to shut down over SSH. `ssh_options` are passed through
/// verbatim, one `-o` flag per entry — the original tool's
/// `opt.lstrip("-o ")`-style mangling is not reproduced here (§9 Open
/// Questions: resolved as "pass each option through verbatim").
#[derive(Debug, Clone)]
pub struct RemotePeer {
    pub name: String,
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub ssh_options: Vec<String>,
    pub connect_timeout_s: u64,
    pub command_timeout_s: u64,
    pub shutdown_command: String,
}

#[async_trait]
pub trait RemoteShutdown: Send + Sync {
    async fn shutdown_peer(&self, peer: &RemotePeer) -> Result<(), SequencerStageError>;
}

pub struct SshRemoteShutdown<R> {
    runner: R,
}

impl<R: ProcessRunner> SshRemoteShutdown<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: ProcessRunner> RemoteShutdown for SshRemoteShutdown<R> {
    async fn shutdown_peer(&self, peer: &RemotePeer) -> Result<(), SequencerStageError> {
        let connect_timeout = peer.connect_timeout_s.to_string();
        let port = peer.port.to_string();
        let mut argv: Vec<String> = vec![
            "ssh".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={connect_timeout}"),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            port,
        ];
        if let Some(identity) = &peer.identity_file {
            argv.push("-i".to_string());
            argv.push(identity.clone());
        }
        for opt in &peer.ssh_options {
            argv.push("-o".to_string());
            argv.push(opt.clone());
        }
        argv.push(format!("{}@{}", peer.user, peer.host));
        argv.push(peer.shutdown_command.clone());

        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let wait = Duration::from_secs(peer.connect_timeout_s + peer.command_timeout_s);
        let out = self.runner.run(&argv_refs, wait).await?;

        if out.success() {
            return Ok(());
        }
        if out.timed_out() {
            return Err(SequencerStageError::TimedOut {
                action: format!("ssh shutdown on {}", peer.name),
                timeout_s: wait.as_secs(),
            });
        }
        Err(SequencerStageError::Failed {
            action: format!("ssh shutdown on {}", peer.name),
            detail: out.stderr,
        })
    }
}
