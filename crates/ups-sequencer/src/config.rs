//! The sequencer's own configuration: *how* to shut each stage down, as
//! opposed to `ups_core::Policy` which decides *whether* to.

use std::time::Duration;

use ups_capabilities::{ComposeFile, RemotePeer};

/// One configured mountpoint. Supports both a bare path and
/// `{path, options}` YAML forms upstream (`ups-runtime` handles that
/// deserialization); by the time it reaches the sequencer it is always
/// this shape.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub path: String,
    pub options: String,
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub dry_run: bool,

    pub vm_enabled: bool,
    pub vm_max_wait: Duration,
    pub vm_poll_interval: Duration,

    pub containers_enabled: bool,
    pub container_stop_timeout_s: u64,
    pub compose_files: Vec<ComposeFile>,
    /// Stop any running container not already covered by a compose file.
    pub shutdown_all_remaining_containers: bool,
    /// Non-system users (uid >= 1000) whose rootless containers should
    /// also be iterated, via privilege-elevated invocation.
    pub rootless_uids: Vec<u32>,

    pub fs_sync_enabled: bool,

    pub mounts: Vec<MountConfig>,
    pub mount_timeout: Duration,

    pub remote_peers: Vec<RemotePeer>,

    pub local_poweroff_enabled: bool,
    pub poweroff_message: String,
    pub wall_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            vm_enabled: true,
            vm_max_wait: Duration::from_secs(120),
            vm_poll_interval: Duration::from_secs(5),
            containers_enabled: true,
            container_stop_timeout_s: 30,
            compose_files: Vec::new(),
            shutdown_all_remaining_containers: true,
            rootless_uids: Vec::new(),
            fs_sync_enabled: true,
            mounts: Vec::new(),
            mount_timeout: Duration::from_secs(30),
            remote_peers: Vec::new(),
            local_poweroff_enabled: true,
            poweroff_message: "UPS battery critical, shutting down".to_string(),
            wall_timeout: Duration::from_secs(5),
        }
    }
}
