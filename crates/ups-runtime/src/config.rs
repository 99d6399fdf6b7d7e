//! YAML-facing configuration and its conversion into the immutable
//! `Policy` + `SequencerConfig` the rest of the binary consumes. One
//! `#[serde(default)]` struct per YAML section, mirroring the original
//! tool's section-per-concern config dataclasses.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use ups_capabilities::{ComposeFile, RemotePeer};
use ups_core::Policy;
use ups_notify::DispatcherConfig;
use ups_sequencer::{MountConfig, SequencerConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub ups: UpsSection,
    pub triggers: TriggersSection,
    pub behavior: BehaviorSection,
    pub notifications: NotificationsSection,
    pub virtual_machines: VmSection,
    pub containers: Option<ContainersSection>,
    /// Legacy section name, still honored when `containers:` is absent.
    pub docker: Option<ContainersSection>,
    pub filesystems: FilesystemsSection,
    pub remote_servers: Vec<RemoteServerConfig>,
    pub local_shutdown: LocalShutdownSection,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            ups: UpsSection::default(),
            triggers: TriggersSection::default(),
            behavior: BehaviorSection::default(),
            notifications: NotificationsSection::default(),
            virtual_machines: VmSection::default(),
            containers: None,
            docker: None,
            filesystems: FilesystemsSection::default(),
            remote_servers: Vec::new(),
            local_shutdown: LocalShutdownSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpsSection {
    pub name: Option<String>,
    pub check_interval_s: u64,
    pub probe_failure_backoff_s: u64,
    pub stale_tolerance: u32,
}

impl Default for UpsSection {
    fn default() -> Self {
        let policy = Policy::default();
        Self {
            name: None,
            check_interval_s: policy.check_interval_s,
            probe_failure_backoff_s: policy.probe_failure_backoff_s,
            stale_tolerance: policy.stale_tolerance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    pub low_charge_threshold_pct: f64,
    pub low_runtime_threshold_s: u64,
    pub critical_depletion_rate_pct_per_min: f64,
    pub depletion_grace_period_s: i64,
    pub extended_time_enabled: bool,
    pub extended_time_threshold_s: i64,
    pub depletion_window_s: i64,
}

impl Default for TriggersSection {
    fn default() -> Self {
        let policy = Policy::default();
        Self {
            low_charge_threshold_pct: policy.low_charge_threshold_pct,
            low_runtime_threshold_s: policy.low_runtime_threshold_s,
            critical_depletion_rate_pct_per_min: policy.critical_depletion_rate_pct_per_min,
            depletion_grace_period_s: policy.depletion_grace_period_s,
            extended_time_enabled: policy.extended_time_enabled,
            extended_time_threshold_s: policy.extended_time_threshold_s,
            depletion_window_s: policy.depletion_window_s,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BehaviorSection {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DiscordLegacy {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsSection {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub avatar_url: Option<String>,
    /// Top-level legacy key: `notifications.webhook_url: https://discord.com/...`.
    pub webhook_url: Option<String>,
    /// Nested legacy key: `notifications.discord.webhook_url: ...`.
    pub discord: Option<DiscordLegacy>,
    pub queue_capacity: usize,
    pub normal_sink_timeout_s: u64,
    pub latched_sink_timeout_s: u64,
    pub post_latch_settle_ms: u64,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            enabled: true,
            urls: Vec::new(),
            avatar_url: None,
            webhook_url: None,
            discord: None,
            queue_capacity: defaults.queue_capacity,
            normal_sink_timeout_s: defaults.normal_sink_timeout.as_secs(),
            latched_sink_timeout_s: defaults.latched_sink_timeout.as_secs(),
            post_latch_settle_ms: defaults.post_latch_settle.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VmSection {
    pub enabled: bool,
    pub max_wait_s: u64,
    pub poll_interval_s: u64,
}

impl Default for VmSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            enabled: defaults.vm_enabled,
            max_wait_s: defaults.vm_max_wait.as_secs(),
            poll_interval_s: defaults.vm_poll_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComposeFileConfig {
    pub path: String,
    pub stop_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainersSection {
    pub enabled: bool,
    pub stop_timeout_s: u64,
    pub compose_files: Vec<ComposeFileConfig>,
    pub shutdown_all_remaining: bool,
    pub rootless_uids: Vec<u32>,
}

impl Default for ContainersSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            enabled: defaults.containers_enabled,
            stop_timeout_s: defaults.container_stop_timeout_s,
            compose_files: Vec::new(),
            shutdown_all_remaining: defaults.shutdown_all_remaining_containers,
            rootless_uids: Vec::new(),
        }
    }
}

/// One configured mount: either a bare path string or an object with
/// per-mount `umount` options.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MountEntry {
    Bare(String),
    Detailed { path: String, #[serde(default)] options: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemsSection {
    pub sync_enabled: bool,
    pub mounts: Vec<MountEntry>,
    pub mount_timeout_s: u64,
}

impl Default for FilesystemsSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            sync_enabled: defaults.fs_sync_enabled,
            mounts: Vec::new(),
            mount_timeout_s: defaults.mount_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServerConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub host: String,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub ssh_options: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_s: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_s: u64,
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,
}

fn default_true() -> bool {
    true
}
fn default_ssh_user() -> String {
    "root".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_command_timeout() -> u64 {
    10
}
fn default_shutdown_command() -> String {
    "poweroff".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalShutdownSection {
    pub enabled: bool,
    pub poweroff_message: String,
    pub wall_timeout_s: u64,
}

impl Default for LocalShutdownSection {
    fn default() -> Self {
        let defaults = SequencerConfig::default();
        Self {
            enabled: defaults.local_poweroff_enabled,
            poweroff_message: defaults.poweroff_message,
            wall_timeout_s: defaults.wall_timeout.as_secs(),
        }
    }
}

/// Fully resolved configuration the supervisor and CLI consume.
#[derive(Debug, Clone)]
pub struct Config {
    pub ups_name: Option<String>,
    pub policy: Policy,
    pub sequencer: SequencerConfig,
    pub notifications_enabled: bool,
    pub notification_urls: Vec<String>,
    pub avatar_url: Option<String>,
    pub dispatcher: DispatcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_raw(RawConfig::default())
    }
}

impl Config {
    pub fn from_raw(raw: RawConfig) -> Self {
        let policy = Policy {
            low_charge_threshold_pct: raw.triggers.low_charge_threshold_pct,
            low_runtime_threshold_s: raw.triggers.low_runtime_threshold_s,
            critical_depletion_rate_pct_per_min: raw.triggers.critical_depletion_rate_pct_per_min,
            depletion_grace_period_s: raw.triggers.depletion_grace_period_s,
            extended_time_enabled: raw.triggers.extended_time_enabled,
            extended_time_threshold_s: raw.triggers.extended_time_threshold_s,
            depletion_window_s: raw.triggers.depletion_window_s,
            stale_tolerance: raw.ups.stale_tolerance,
            check_interval_s: raw.ups.check_interval_s,
            probe_failure_backoff_s: raw.ups.probe_failure_backoff_s,
        };

        let containers = resolve_containers(&raw);

        let mounts = raw
            .filesystems
            .mounts
            .into_iter()
            .map(|m| match m {
                MountEntry::Bare(path) => MountConfig {
                    path,
                    options: String::new(),
                },
                MountEntry::Detailed { path, options } => MountConfig { path, options },
            })
            .collect();

        let compose_files = containers
            .compose_files
            .into_iter()
            .map(|c| ComposeFile {
                path: c.path,
                stop_timeout_s: c.stop_timeout,
            })
            .collect();

        let remote_peers = raw
            .remote_servers
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| RemotePeer {
                name: s.name,
                host: s.host,
                user: s.user,
                port: s.port,
                identity_file: s.identity_file,
                ssh_options: s.ssh_options,
                connect_timeout_s: s.connect_timeout_s,
                command_timeout_s: s.command_timeout_s,
                shutdown_command: s.shutdown_command,
            })
            .collect();

        let sequencer = SequencerConfig {
            dry_run: raw.behavior.dry_run,
            vm_enabled: raw.virtual_machines.enabled,
            vm_max_wait: Duration::from_secs(raw.virtual_machines.max_wait_s),
            vm_poll_interval: Duration::from_secs(raw.virtual_machines.poll_interval_s),
            containers_enabled: containers.enabled,
            container_stop_timeout_s: containers.stop_timeout_s,
            compose_files,
            shutdown_all_remaining_containers: containers.shutdown_all_remaining,
            rootless_uids: containers.rootless_uids,
            fs_sync_enabled: raw.filesystems.sync_enabled,
            mounts,
            mount_timeout: Duration::from_secs(raw.filesystems.mount_timeout_s),
            remote_peers,
            local_poweroff_enabled: raw.local_shutdown.enabled,
            poweroff_message: raw.local_shutdown.poweroff_message,
            wall_timeout: Duration::from_secs(raw.local_shutdown.wall_timeout_s),
        };

        let (notification_urls, notifications_enabled) = resolve_notification_urls(&raw.notifications);

        Self {
            ups_name: raw.ups.name,
            policy,
            sequencer,
            notifications_enabled,
            notification_urls,
            avatar_url: raw.notifications.avatar_url,
            dispatcher: DispatcherConfig {
                queue_capacity: raw.notifications.queue_capacity,
                normal_sink_timeout: Duration::from_secs(raw.notifications.normal_sink_timeout_s),
                latched_sink_timeout: Duration::from_secs(raw.notifications.latched_sink_timeout_s),
                post_latch_settle: Duration::from_millis(raw.notifications.post_latch_settle_ms),
            },
        }
    }
}

fn resolve_containers(raw: &RawConfig) -> ContainersSection {
    match (&raw.containers, &raw.docker) {
        (Some(containers), Some(_)) => {
            warn!("both `containers` and legacy `docker` config sections are set; `containers` wins");
            containers.clone()
        }
        (Some(containers), None) => containers.clone(),
        (None, Some(docker)) => docker.clone(),
        (None, None) => ContainersSection::default(),
    }
}

/// Folds the legacy Discord webhook config (a raw `https://discord.com/api/webhooks/{id}/{token}`
/// URL, either top-level or under `notifications.discord`) into a
/// `discord://{id}/{token}` entry in `notifications.urls`.
fn resolve_notification_urls(notifications: &NotificationsSection) -> (Vec<String>, bool) {
    let mut urls = notifications.urls.clone();
    let mut enabled = notifications.enabled;

    let legacy_webhook = notifications
        .webhook_url
        .clone()
        .or_else(|| notifications.discord.as_ref().and_then(|d| d.webhook_url.clone()));

    if let Some(webhook_url) = legacy_webhook {
        match migrate_legacy_discord_webhook(&webhook_url) {
            Some(discord_url) => {
                urls.push(discord_url);
                enabled = true;
            }
            None => warn!(url = %webhook_url, "legacy webhook_url is not a recognized Discord webhook, ignoring"),
        }
    }

    (urls, enabled)
}

/// Parses `https://discord.com/api/webhooks/{id}/{token}[/slack|/github]` into
/// the `discord://{id}/{token}` scheme the config and sink layers share.
fn migrate_legacy_discord_webhook(webhook_url: &str) -> Option<String> {
    let rest = webhook_url.split("/api/webhooks/").nth(1)?;
    let mut parts = rest.split('/');
    let id = parts.next()?;
    let token = parts.next()?;
    if id.is_empty() || token.is_empty() {
        return None;
    }
    Some(format!("discord://{id}/{token}"))
}

/// Appends `avatar_url` as a query parameter to generic HTTP(S) notification
/// URLs (e.g. Slack-compatible incoming webhooks). Discord URLs carry the
/// avatar separately via [`ups_notify::DiscordWebhookNotifier`] and are left
/// untouched.
pub fn append_avatar_to_url(url: &str, avatar_url: Option<&str>) -> String {
    let Some(avatar) = avatar_url else {
        return url.to_string();
    };
    if url.starts_with("discord://") || url.contains("avatar_url=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}avatar_url={}", percent_encode_minimal(avatar))
}

fn percent_encode_minimal(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('#', "%23")
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and parses `path`. Never fails the process: a missing, empty,
    /// or malformed file falls back to [`Config::default`] with a warning.
    pub fn load(path: &Path) -> Config {
        let raw = match std::fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => {
                warn!(path = %path.display(), "config file is empty, using defaults");
                RawConfig::default()
            }
            Ok(text) => match serde_yaml::from_str::<RawConfig>(&text) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "invalid config YAML, using defaults");
                    RawConfig::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read config file, using defaults");
                RawConfig::default()
            }
        };
        Config::from_raw(raw)
    }
}
