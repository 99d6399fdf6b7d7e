//! The Shutdown Sequencer: a one-shot, idempotent, ordered pipeline. Each
//! stage has a hard timeout; a stage's failure never aborts the stages
//! that follow it; the final local-poweroff stage is the only one that
//! does not return control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use ups_capabilities::{ContainerController, FsSync, LocalShutdown, RemoteShutdown, Unmounter, VMController};
use ups_core::event::Severity;
use ups_core::ShutdownLatch;
use ups_notify::Dispatcher;

use crate::config::SequencerConfig;
use crate::latch_file::LatchPersistence;

/// Everything the sequencer delegates to. Grouped into one struct so
/// `Sequencer::new` doesn't take seven positional `Arc`s.
pub struct SequencerCapabilities {
    pub vms: Arc<dyn VMController>,
    pub containers: Arc<dyn ContainerController>,
    pub fs_sync: Arc<dyn FsSync>,
    pub unmounter: Arc<dyn Unmounter>,
    pub remote: Arc<dyn RemoteShutdown>,
    pub local: Arc<dyn LocalShutdown>,
    pub latch_file: Arc<dyn LatchPersistence>,
}

pub struct Sequencer {
    caps: SequencerCapabilities,
    dispatcher: Arc<Dispatcher>,
    latch: ShutdownLatch,
    config: SequencerConfig,
    ran: AtomicBool,
}

impl Sequencer {
    pub fn new(
        caps: SequencerCapabilities,
        dispatcher: Arc<Dispatcher>,
        latch: ShutdownLatch,
        config: SequencerConfig,
    ) -> Self {
        Self {
            caps,
            dispatcher,
            latch,
            config,
            ran: AtomicBool::new(false),
        }
    }

    /// Run the shutdown sequence. Safe to call more than once (e.g. the
    /// supervisor re-checking FSD every tick) — only the first call
    /// actually executes.
    pub async fn run(&self, reason: &str) {
        if self.ran.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason, dry_run = self.config.dry_run, "shutdown sequence starting");

        self.stage_latch_and_broadcast(reason).await;
        self.stage_vms().await;
        self.stage_containers().await;
        if self.config.fs_sync_enabled {
            self.stage_sync("initial").await;
        }
        self.stage_unmount().await;
        self.stage_remote_peers().await;
        if self.config.fs_sync_enabled {
            self.stage_sync("final").await;
        }
        self.stage_local_poweroff(reason).await;
    }

    async fn stage_latch_and_broadcast(&self, reason: &str) {
        self.latch.set();
        self.caps.latch_file.create();

        let prefix = if self.config.dry_run { "[DRY-RUN] " } else { "" };
        let message = format!("{prefix}System is shutting down: {reason}");
        if self.config.dry_run {
            info!(message = %message, "would broadcast wall message");
        } else if let Err(err) = self.caps.local.broadcast(&message).await {
            warn!(error = %err, "wall broadcast failed");
        }
        self.dispatcher.send(message, Severity::Warning, false).await;
    }

    async fn stage_vms(&self) {
        if !self.config.vm_enabled {
            info!("VM stage disabled, skipping");
            return;
        }

        let running = match self.caps.vms.list_running().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "failed to list running VMs, skipping VM stage");
                return;
            }
        };
        if running.is_empty() {
            return;
        }

        for name in &running {
            if self.config.dry_run {
                info!(vm = %name, "would request graceful VM shutdown");
                continue;
            }
            if let Err(err) = self.caps.vms.shutdown(name).await {
                warn!(vm = %name, error = %err, "graceful VM shutdown request failed");
            }
        }
        if self.config.dry_run {
            return;
        }

        let deadline = sleep(self.config.vm_max_wait);
        tokio::pin!(deadline);
        let mut remaining = running.clone();
        loop {
            let mut still_running = Vec::new();
            for name in &remaining {
                if self.caps.vms.is_running(name).await {
                    still_running.push(name.clone());
                }
            }
            remaining = still_running;
            if remaining.is_empty() {
                break;
            }

            tokio::select! {
                _ = &mut deadline => break,
                _ = sleep(self.config.vm_poll_interval) => {}
            }
        }

        for name in &remaining {
            warn!(vm = %name, "VM did not stop gracefully in time, force-destroying");
            if let Err(err) = self.caps.vms.destroy(name).await {
                warn!(vm = %name, error = %err, "force-destroy failed");
            }
        }
    }

    async fn stage_containers(&self) {
        if !self.config.containers_enabled {
            info!("container stage disabled, skipping");
            return;
        }

        for file in &self.config.compose_files {
            if self.config.dry_run {
                info!(file = %file.path, "would run compose down");
                continue;
            }
            if let Err(err) = self
                .caps
                .containers
                .compose_down(file, self.config.container_stop_timeout_s)
                .await
            {
                warn!(file = %file.path, error = %err, "compose down failed");
            }
        }

        if !self.config.shutdown_all_remaining_containers {
            return;
        }

        let uids: Vec<Option<u32>> = std::iter::once(None)
            .chain(self.config.rootless_uids.iter().copied().map(Some))
            .collect();

        for uid in uids {
            let running = match self.caps.containers.list_running(uid).await {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(uid = ?uid, error = %err, "failed to list running containers, skipping");
                    continue;
                }
            };
            for id in running {
                if self.config.dry_run {
                    info!(container = %id, uid = ?uid, "would stop container");
                    continue;
                }
                if let Err(err) = self
                    .caps
                    .containers
                    .stop(&id, self.config.container_stop_timeout_s, uid)
                    .await
                {
                    warn!(container = %id, error = %err, "container stop failed");
                }
            }
        }
    }

    async fn stage_sync(&self, which: &str) {
        if self.config.dry_run {
            info!(which, "would sync filesystems");
            return;
        }
        if let Err(err) = self.caps.fs_sync.sync().await {
            warn!(which, error = %err, "filesystem sync failed");
        }
    }

    async fn stage_unmount(&self) {
        for mount in &self.config.mounts {
            if self.config.dry_run {
                info!(path = %mount.path, "would unmount");
                continue;
            }
            ups_capabilities::unmount_best_effort(
                self.caps.unmounter.as_ref(),
                &mount.path,
                self.config.mount_timeout,
            )
            .await;
        }
    }

    async fn stage_remote_peers(&self) {
        for peer in &self.config.remote_peers {
            if self.config.dry_run {
                info!(peer = %peer.name, "would send remote shutdown command");
                continue;
            }
            let wait = Duration::from_secs(peer.connect_timeout_s + peer.command_timeout_s + 5);
            match timeout(wait, self.caps.remote.shutdown_peer(peer)).await {
                Ok(Ok(())) => info!(peer = %peer.name, "remote shutdown sent"),
                Ok(Err(err)) => warn!(peer = %peer.name, error = %err, "remote shutdown failed"),
                Err(_) => warn!(peer = %peer.name, "remote shutdown timed out"),
            }
        }
    }

    async fn stage_local_poweroff(&self, reason: &str) {
        if !self.config.local_poweroff_enabled {
            info!("local poweroff disabled, clearing latch");
            self.latch.clear();
            self.caps.latch_file.remove();
            return;
        }

        self.dispatcher
            .send(
                format!("Shutdown complete: {reason}"),
                Severity::Success,
                true,
            )
            .await;

        if self.config.dry_run {
            info!(message = %self.config.poweroff_message, "would power off now");
            self.latch.clear();
            self.caps.latch_file.remove();
            return;
        }

        if let Err(err) = self.caps.local.poweroff(&self.config.poweroff_message).await {
            warn!(error = %err, "poweroff command failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use ups_capabilities::{ComposeFile, RemotePeer, SequencerStageError};
    use ups_notify::DispatcherConfig;

    struct RecordingCap {
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl VMController for RecordingCap {
        async fn list_running(&self) -> Result<Vec<String>, SequencerStageError> {
            self.log.lock().unwrap().push("vm:list".to_string());
            Ok(vec!["vm1".to_string()])
        }
        async fn shutdown(&self, name: &str) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("vm:shutdown:{name}"));
            Ok(())
        }
        async fn destroy(&self, name: &str) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("vm:destroy:{name}"));
            Err(SequencerStageError::Failed {
                action: "destroy".to_string(),
                detail: "stuck".to_string(),
            })
        }
        async fn is_running(&self, _name: &str) -> bool {
            // Never stops gracefully, forcing the force-destroy path.
            true
        }
    }

    #[async_trait]
    impl ContainerController for RecordingCap {
        async fn list_running(&self, _as_uid: Option<u32>) -> Result<Vec<String>, SequencerStageError> {
            self.log.lock().unwrap().push("container:list".to_string());
            Ok(vec!["c1".to_string()])
        }
        async fn stop(&self, id: &str, _timeout_s: u64, _as_uid: Option<u32>) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("container:stop:{id}"));
            Err(SequencerStageError::Failed {
                action: "stop".to_string(),
                detail: "EBUSY".to_string(),
            })
        }
        async fn compose_down(&self, file: &ComposeFile, _default_timeout_s: u64) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("compose:{}", file.path));
            Ok(())
        }
    }

    #[async_trait]
    impl FsSync for RecordingCap {
        async fn sync(&self) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push("sync".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl Unmounter for RecordingCap {
        async fn is_mounted(&self, _path: &str) -> bool {
            true
        }
        async fn unmount(&self, path: &str, _timeout: Duration) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("unmount:{path}"));
            Err(SequencerStageError::Failed {
                action: "umount".to_string(),
                detail: "EBUSY".to_string(),
            })
        }
    }

    #[async_trait]
    impl RemoteShutdown for RecordingCap {
        async fn shutdown_peer(&self, peer: &RemotePeer) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push(format!("remote:{}", peer.name));
            Err(SequencerStageError::Failed {
                action: "ssh".to_string(),
                detail: "refused".to_string(),
            })
        }
    }

    #[async_trait]
    impl LocalShutdown for RecordingCap {
        async fn broadcast(&self, _message: &str) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push("broadcast".to_string());
            Ok(())
        }
        async fn poweroff(&self, _message: &str) -> Result<(), SequencerStageError> {
            self.log.lock().unwrap().push("poweroff".to_string());
            Ok(())
        }
    }

    struct NoopLatchFile;
    impl LatchPersistence for NoopLatchFile {
        fn create(&self) {}
        fn remove(&self) {}
        fn exists(&self) -> bool {
            false
        }
    }

    fn build(dry_run: bool, log: Arc<StdMutex<Vec<String>>>) -> Sequencer {
        let cap: Arc<RecordingCap> = Arc::new(RecordingCap { log });
        let caps = SequencerCapabilities {
            vms: cap.clone(),
            containers: cap.clone(),
            fs_sync: cap.clone(),
            unmounter: cap.clone(),
            remote: cap.clone(),
            local: cap.clone(),
            latch_file: Arc::new(NoopLatchFile),
        };
        let latch = ShutdownLatch::new();
        let dispatcher = Arc::new(Dispatcher::new(Vec::new(), latch.clone(), DispatcherConfig::default()));
        let config = SequencerConfig {
            dry_run,
            vm_max_wait: Duration::from_millis(20),
            vm_poll_interval: Duration::from_millis(5),
            compose_files: vec![ComposeFile {
                path: "/srv/app/docker-compose.yml".to_string(),
                stop_timeout_s: None,
            }],
            mounts: vec![crate::config::MountConfig {
                path: "/mnt/data".to_string(),
                options: String::new(),
            }],
            remote_peers: vec![RemotePeer {
                name: "nas".to_string(),
                host: "10.0.0.5".to_string(),
                user: "root".to_string(),
                port: 22,
                identity_file: None,
                ssh_options: Vec::new(),
                connect_timeout_s: 1,
                command_timeout_s: 1,
                shutdown_command: "poweroff".to_string(),
            }],
            ..SequencerConfig::default()
        };
        Sequencer::new(caps, dispatcher, latch, config)
    }

    #[tokio::test]
    async fn every_stage_runs_despite_failures_and_reaches_poweroff() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sequencer = build(false, log.clone());
        sequencer.run("test").await;

        let entries = log.lock().unwrap().clone();
        assert!(entries.iter().any(|e| e == "broadcast"));
        assert!(entries.iter().any(|e| e.starts_with("vm:destroy")));
        assert!(entries.iter().any(|e| e.starts_with("container:stop")));
        assert!(entries.iter().any(|e| e == "sync"));
        assert!(entries.iter().any(|e| e.starts_with("unmount")));
        assert!(entries.iter().any(|e| e.starts_with("remote:")));
        assert!(entries.iter().any(|e| e == "poweroff"));
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sequencer = build(false, log.clone());
        sequencer.run("first").await;
        let count_after_first = log.lock().unwrap().len();
        sequencer.run("second").await;
        assert_eq!(log.lock().unwrap().len(), count_after_first);
    }

    #[tokio::test]
    async fn dry_run_never_calls_destructive_capabilities() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sequencer = build(true, log.clone());
        sequencer.run("dry").await;

        let entries = log.lock().unwrap().clone();
        assert!(!entries.iter().any(|e| e.starts_with("vm:shutdown")));
        assert!(!entries.iter().any(|e| e.starts_with("vm:destroy")));
        assert!(!entries.iter().any(|e| e.starts_with("container:stop")));
        assert!(!entries.iter().any(|e| e == "poweroff"));
    }

    #[tokio::test]
    async fn latch_is_set_before_any_destructive_call() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let cap: Arc<RecordingCap> = Arc::new(RecordingCap { log: log.clone() });
        let caps = SequencerCapabilities {
            vms: cap.clone(),
            containers: cap.clone(),
            fs_sync: cap.clone(),
            unmounter: cap.clone(),
            remote: cap.clone(),
            local: cap.clone(),
            latch_file: Arc::new(NoopLatchFile),
        };
        let latch = ShutdownLatch::new();
        assert!(!latch.is_set());
        let dispatcher = Arc::new(Dispatcher::new(Vec::new(), latch.clone(), DispatcherConfig::default()));
        let sequencer = Sequencer::new(caps, dispatcher, latch.clone(), SequencerConfig {
            vm_max_wait: Duration::from_millis(5),
            vm_poll_interval: Duration::from_millis(1),
            ..SequencerConfig::default()
        });
        sequencer.run("test").await;
        assert!(latch.is_set());
    }
}
