use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "worktimer")]
#[command(about = "Track work and break phases against a daily quota")]
pub struct Cli {
    /// Directory holding config/ and state/
    #[arg(long, global = true, env = "WORKTIMER_HOME")]
    pub workspace: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log command activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start working, or switch between work and break
    Toggle,
    /// Show today's totals and the time to leave
    Status,
    /// List every phase recorded today
    Phases,
    /// Redraw the status line until interrupted
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Discard today's phases and start a fresh day
    Reset,
    /// Print config path and create default file if missing
    ConfigPath,
}
