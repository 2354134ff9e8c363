use crate::waka::StatsRange;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "wakareport",
    about = "WakaTime coding sessions & daily productivity report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Full daily run: analysis, sessions, day log and AI summary
    Run,
    Analyze,
    Sessions {
        #[arg(long)]
        date: Option<String>,
        /// Minutes; shorter sessions and entries are hidden
        #[arg(long)]
        min_duration: Option<f64>,
        /// Seconds between heartbeats that still count as one session
        #[arg(long)]
        merge_threshold: Option<f64>,
    },
    Heartbeats {
        #[arg(long)]
        date: Option<String>,
    },
    Languages {
        #[arg(long, value_enum, default_value_t = StatsRange::Last7Days)]
        range: StatsRange,
    },
    Summarize {
        #[arg(long)]
        date: Option<String>,
    },
    Status,
    Doctor,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}
