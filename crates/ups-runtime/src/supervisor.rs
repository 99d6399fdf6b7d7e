//! The tick loop: wires every `ups-*` capability crate together, probes
//! the UPS on a fixed interval, feeds each probe through the connection,
//! depletion, monitor, and trigger state machines, and hands off to the
//! [`Sequencer`] the moment any of them calls for a shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use ups_capabilities::{
    detect_runtime, ContainerController, RealFsSync, RealUnmounter, RuntimeContainerController,
    SequencerStageError, SshRemoteShutdown, SystemShutdown, VirshController,
};
use ups_core::connection::ConnectionStateMachine;
use ups_core::event::Severity;
use ups_core::monitors::{MonitorState, PowerMonitors};
use ups_core::trigger::{TriggerContext, TriggerEvaluator};
use ups_core::{DepletionTracker, Event, ProbeOutcome, ShutdownLatch, ShutdownVerdict};
use ups_notify::{Dispatcher, DiscordWebhookNotifier, HttpNotifier, NotificationSink};
use ups_process::{CommandExists, ProcessRunner, RealCommandExists, TokioProcessRunner};
use ups_query::{NutUpsQuery, UpsQuery};
use ups_sequencer::{FileLatchPersistence, Sequencer, SequencerCapabilities};

use crate::config::{append_avatar_to_url, Config};
use crate::persistence::{persist_battery_history, persist_ups_state};

const LATCH_FILE: &str = "/run/ups-monitor/shutdown.latch";
const STATE_FILE: &str = "/run/ups-monitor/state";
const HISTORY_FILE: &str = "/run/ups-monitor/battery-history";
const DEFAULT_VOLTAGE_LOW_V: f64 = 100.0;
const DEFAULT_VOLTAGE_HIGH_V: f64 = 140.0;
const UPSC_DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let sinks = build_sinks(&cfg);
    let notifications_enabled = cfg.notifications_enabled && !sinks.is_empty();
    if cfg.notifications_enabled && sinks.is_empty() {
        warn!("notifications enabled but no usable notification URLs configured");
    }

    let latch_file = FileLatchPersistence::new(LATCH_FILE);
    let latch = ShutdownLatch::from_persisted(latch_file.exists());
    if latch.is_set() {
        warn!("shutdown latch file found on startup, a shutdown sequence was already in progress");
    }

    let dispatcher = Arc::new(Dispatcher::new(sinks, latch.clone(), cfg.dispatcher.clone()));
    dispatcher.start().await;

    let command_exists = RealCommandExists;
    if !command_exists.exists("upsc").await {
        error!("upsc not found on PATH; NUT client tools must be installed");
        dispatcher
            .send(
                "ups-monitor cannot start: upsc not found on PATH",
                Severity::Failure,
                true,
            )
            .await;
        dispatcher.stop().await;
        anyhow::bail!("upsc not found on PATH");
    }

    let ups_name = match resolve_ups_name(&cfg).await {
        Some(name) => name,
        None => {
            error!("no UPS name configured and none could be discovered via `upsc -l`");
            dispatcher
                .send(
                    "ups-monitor cannot start: no UPS name configured or discoverable",
                    Severity::Failure,
                    true,
                )
                .await;
            dispatcher.stop().await;
            anyhow::bail!("no UPS name configured or discoverable");
        }
    };
    info!(ups = %ups_name, "monitoring UPS");

    let query: Arc<dyn UpsQuery> = Arc::new(NutUpsQuery::new(
        TokioProcessRunner,
        ups_name.clone(),
        Duration::from_secs(10),
    ));

    let (voltage_low, voltage_high) = discover_voltage_thresholds(query.as_ref()).await;
    let monitors = PowerMonitors::new(MonitorState::new(voltage_low, voltage_high));

    let sequencer = build_sequencer(&cfg, Arc::clone(&dispatcher), latch.clone()).await;

    let mut loop_state = TickLoop {
        query,
        policy: cfg.policy.clone(),
        connection: ConnectionStateMachine::new(cfg.policy.stale_tolerance),
        depletion: DepletionTracker::new(cfg.policy.depletion_window_s),
        monitors,
        trigger_ctx: TriggerContext::default(),
        sequencer: Arc::new(sequencer),
        dispatcher: Arc::clone(&dispatcher),
        latch: latch.clone(),
        prior_on_battery: false,
        state_path: PathBuf::from(STATE_FILE),
        history_path: PathBuf::from(HISTORY_FILE),
    };

    loop {
        let check_interval = Duration::from_secs(cfg.policy.check_interval_s);
        let backoff = Duration::from_secs(cfg.policy.probe_failure_backoff_s);

        tokio::select! {
            () = wait_for_termination_signal() => {
                info!("received termination signal, shutting down");
                if !latch.is_set() {
                    dispatcher.send("ups-monitor stopped", Severity::Info, true).await;
                }
                dispatcher.stop().await;
                return Ok(());
            }
            outcome = loop_state.tick() => {
                match outcome {
                    TickOutcome::Continue { connection_ok } => {
                        let sleep_for = if connection_ok { check_interval } else { backoff };
                        tokio::time::sleep(sleep_for).await;
                    }
                    TickOutcome::ShuttingDown => {
                        dispatcher.stop().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn wait_for_termination_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, SIGTERM will not be caught");
                ctrl_c.await.ok();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

enum TickOutcome {
    Continue { connection_ok: bool },
    ShuttingDown,
}

struct TickLoop {
    query: Arc<dyn UpsQuery>,
    policy: ups_core::Policy,
    connection: ConnectionStateMachine,
    depletion: DepletionTracker,
    monitors: PowerMonitors,
    trigger_ctx: TriggerContext,
    sequencer: Arc<Sequencer>,
    dispatcher: Arc<Dispatcher>,
    latch: ShutdownLatch,
    prior_on_battery: bool,
    state_path: PathBuf,
    history_path: PathBuf,
}

impl TickLoop {
    async fn tick(&mut self) -> TickOutcome {
        let now = now_epoch_s();
        let outcome = self.query.snapshot().await;

        let update = self.connection.update(&outcome, self.prior_on_battery);
        self.dispatch_events(&update.events).await;
        if update.failsafe {
            warn!("connection failsafe triggered: UPS went unreachable while on battery");
            self.sequencer.run("connection lost while on battery (failsafe)").await;
            return TickOutcome::ShuttingDown;
        }

        let sample = match outcome {
            ProbeOutcome::Ok(sample) => sample,
            ProbeOutcome::Stale | ProbeOutcome::Unreachable(_) => {
                return TickOutcome::Continue {
                    connection_ok: update.state == ups_core::connection::ConnectionState::Ok,
                };
            }
        };

        persist_ups_state(&self.state_path, &sample, now);

        let on_battery = sample.on_battery();
        if on_battery && !self.prior_on_battery {
            self.trigger_ctx = TriggerContext {
                on_battery_start_epoch: now,
                extended_time_logged: false,
            };
            self.depletion.clear();
            info!("system switched to battery power");
            self.dispatch_event(Event::OnBattery, Event::OnBattery.to_string())
                .await;
        } else if !on_battery && self.prior_on_battery {
            let outage_duration_s = (now - self.trigger_ctx.on_battery_start_epoch).max(0);
            info!(outage_duration_s, "power restored, clearing on-battery tracking");
            self.dispatch_event(
                Event::PowerRestored,
                format!("{} (outage duration {outage_duration_s}s)", Event::PowerRestored),
            )
            .await;
            self.depletion.clear();
        }
        self.prior_on_battery = on_battery;

        let rate = if let Some(charge) = sample.charge_pct {
            let rate = self.depletion.observe(now, charge);
            persist_battery_history(&self.history_path, self.depletion.window());
            rate
        } else {
            0.0
        };

        let monitor_update = self.monitors.update(&sample, self.latch.is_set());
        self.dispatch_events(&monitor_update.events).await;

        if sample.forced_shutdown() {
            warn!("UPS reports forced shutdown (FSD), running shutdown sequence immediately");
            self.sequencer.run("UPS forced shutdown (FSD)").await;
            return TickOutcome::ShuttingDown;
        }

        if on_battery {
            if sample.charge_pct.is_none() {
                warn!("battery charge reading missing or non-numeric, low-charge trigger cannot evaluate this tick");
            }
            let evaluator = TriggerEvaluator::new(&self.policy);
            match evaluator.evaluate(&sample, now, rate, &mut self.trigger_ctx) {
                ShutdownVerdict::Continue { info: Some(message) } => info!("{message}"),
                ShutdownVerdict::Continue { info: None } => {}
                ShutdownVerdict::Shutdown { reason } => {
                    warn!(reason = %reason, "shutdown trigger fired");
                    self.sequencer.run(&reason).await;
                    return TickOutcome::ShuttingDown;
                }
            }
        }

        TickOutcome::Continue {
            connection_ok: update.state == ups_core::connection::ConnectionState::Ok,
        }
    }

    async fn dispatch_events(&self, events: &[Event]) {
        for event in events {
            self.dispatch_event(event.clone(), event.to_string()).await;
        }
    }

    /// Log and, unless suppressed, dispatch a single event with an
    /// explicit message (letting callers enrich it beyond the event's
    /// bare name, e.g. with an outage duration).
    async fn dispatch_event(&self, event: Event, message: impl Into<String>) {
        if event.dispatch_suppressed() {
            info!(event = %event, "power event (not dispatched)");
            return;
        }
        info!(event = %event, "power event");
        self.dispatcher.send(message.into(), event.severity(), false).await;
    }
}

fn now_epoch_s() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn resolve_ups_name(cfg: &Config) -> Option<String> {
    if let Some(name) = &cfg.ups_name {
        if !name.trim().is_empty() {
            return Some(name.clone());
        }
    }
    discover_ups_name().await
}

/// Runs `upsc -l` and takes the first non-empty line, matching how a
/// single-UPS NUT setup is typically configured.
async fn discover_ups_name() -> Option<String> {
    let runner = TokioProcessRunner;
    let out = runner.run(&["upsc", "-l"], UPSC_DISCOVER_TIMEOUT).await.ok()?;
    if !out.success() {
        return None;
    }
    out.stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Reads `input.transfer.low`/`input.transfer.high` once at startup. These
/// are assumed static for the life of the process; re-deriving them every
/// tick would mean an adversarial/misbehaving UPS could move the
/// brownout/over-voltage thresholds out from under the monitor mid-run.
async fn discover_voltage_thresholds(query: &dyn UpsQuery) -> (f64, f64) {
    let low = query
        .var("input.transfer.low")
        .await
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_VOLTAGE_LOW_V);
    let high = query
        .var("input.transfer.high")
        .await
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_VOLTAGE_HIGH_V);
    (low, high)
}

fn build_sinks(cfg: &Config) -> Vec<Arc<dyn NotificationSink>> {
    if !cfg.notifications_enabled {
        return Vec::new();
    }
    cfg.notification_urls
        .iter()
        .map(|url| -> Arc<dyn NotificationSink> {
            if let Some(discord) = DiscordWebhookNotifier::from_discord_url(url, cfg.avatar_url.clone()) {
                Arc::new(discord)
            } else {
                Arc::new(HttpNotifier::new(append_avatar_to_url(url, cfg.avatar_url.as_deref())))
            }
        })
        .collect()
}

/// A container controller used when no container runtime was detected.
/// `containers_enabled` is force-disabled alongside it, so none of its
/// methods are ever invoked in practice; it exists only so
/// `SequencerCapabilities` always has something to hold.
struct NullContainerController;

#[async_trait::async_trait]
impl ContainerController for NullContainerController {
    async fn list_running(&self, _as_uid: Option<u32>) -> Result<Vec<String>, SequencerStageError> {
        Err(SequencerStageError::ToolUnavailable { tool: "podman/docker" })
    }

    async fn stop(&self, _id: &str, _timeout_s: u64, _as_uid: Option<u32>) -> Result<(), SequencerStageError> {
        Err(SequencerStageError::ToolUnavailable { tool: "podman/docker" })
    }

    async fn compose_down(
        &self,
        _file: &ups_capabilities::ComposeFile,
        _default_timeout_s: u64,
    ) -> Result<(), SequencerStageError> {
        Err(SequencerStageError::ToolUnavailable { tool: "podman/docker" })
    }
}

async fn build_sequencer(cfg: &Config, dispatcher: Arc<Dispatcher>, latch: ShutdownLatch) -> Sequencer {
    let command_exists = RealCommandExists;
    let mut sequencer_config = cfg.sequencer.clone();

    let containers: Arc<dyn ContainerController> = match detect_runtime(&command_exists).await {
        Some(runtime) => Arc::new(RuntimeContainerController::new(
            TokioProcessRunner,
            RealCommandExists,
            runtime,
        )),
        None => {
            if sequencer_config.containers_enabled {
                warn!("no container runtime (podman/docker) detected, disabling container shutdown stage");
            }
            sequencer_config.containers_enabled = false;
            Arc::new(NullContainerController)
        }
    };

    let caps = SequencerCapabilities {
        vms: Arc::new(VirshController::new(
            TokioProcessRunner,
            RealCommandExists,
            Duration::from_secs(10),
        )),
        containers,
        fs_sync: Arc::new(RealFsSync::new(TokioProcessRunner, sequencer_config.mount_timeout)),
        unmounter: Arc::new(RealUnmounter::new(TokioProcessRunner)),
        remote: Arc::new(SshRemoteShutdown::new(TokioProcessRunner)),
        local: Arc::new(SystemShutdown::new(TokioProcessRunner, sequencer_config.wall_timeout)),
        latch_file: Arc::new(FileLatchPersistence::new(LATCH_FILE)),
    };

    Sequencer::new(caps, dispatcher, latch, sequencer_config)
}
