//! ups-monitor: UPS-aware shutdown supervisor for systems behind a
//! NUT-managed UPS. Single-process binary: polls `upsc`, evaluates
//! shutdown triggers, and runs the shutdown sequencer in-process.

use clap::Parser;

mod cli;
mod config;
mod persistence;
mod supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("UPS_MONITOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let mut cfg = config::ConfigLoader::load(&args.config);
    if args.dry_run {
        cfg.sequencer.dry_run = true;
    }

    match args.command {
        Some(cli::Command::CheckConfig) => {
            print_config_summary(&cfg);
            Ok(())
        }
        None => {
            tracing::info!("ups-monitor starting");
            supervisor::run(cfg).await
        }
    }
}

fn print_config_summary(cfg: &config::Config) {
    println!("ups name:              {}", cfg.ups_name.as_deref().unwrap_or("(auto-discover)"));
    println!("check interval:        {}s", cfg.policy.check_interval_s);
    println!("low charge threshold:  {}%", cfg.policy.low_charge_threshold_pct);
    println!("low runtime threshold: {}s", cfg.policy.low_runtime_threshold_s);
    println!("dry run:               {}", cfg.sequencer.dry_run);
    println!("vm shutdown stage:     {}", cfg.sequencer.vm_enabled);
    println!("container stage:       {}", cfg.sequencer.containers_enabled);
    println!("remote peers:          {}", cfg.sequencer.remote_peers.len());
    println!("notifications enabled: {}", cfg.notifications_enabled);
    println!("notification urls:     {}", cfg.notification_urls.len());
}
