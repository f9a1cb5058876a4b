use clap::Parser;
use serde::Serialize;

#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "ranker", about = "Leaderboard ranking service console")]
pub struct Cli {
    /// Path to a YAML settings file (defaults to ./ranker.yaml when present)
    #[arg(long)]
    #[serde(skip_serializing)]
    pub config: Option<String>,
    /// Override the trace level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_level: Option<String>,
    /// Override the cron schedule of the maintenance jobs
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_schedule: Option<String>,
}
