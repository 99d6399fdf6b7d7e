//! Command line surface for `ups-monitor`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ups-monitor",
    about = "UPS-aware shutdown supervisor for systems behind a NUT-managed UPS",
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, short = 'c', global = true, default_value = "/etc/ups-monitor/config.yaml")]
    pub config: PathBuf,

    /// Force dry-run mode regardless of what the config file says: the
    /// sequencer logs every stage it would run but calls no capability.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Run in the foreground instead of daemonizing. ups-monitor never
    /// daemonizes on its own; this flag exists for symmetry with init
    /// systems that expect it and is otherwise a no-op.
    #[arg(long, global = true)]
    pub foreground: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate the config file, print a summary, and exit.
    CheckConfig,
}
