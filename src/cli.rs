use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::Format;

#[derive(Parser)]
#[command(name = "slack-history")]
#[command(about = "Export a Slack channel's history, threads included, as one ordered document")]
pub struct Cli {
    /// Settings file, defaults to ./settings.toml when present
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a channel's messages and thread replies
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ExportArgs {
    /// Channel ID (e.g. C0123456789)
    #[arg(short, long)]
    pub channel: String,

    /// Oldest day to include (YYYY-MM-DD)
    #[arg(long)]
    pub oldest: Option<String>,

    /// Latest day to include, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub latest: Option<String>,

    /// Maximum number of top-level messages
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Maximum number of replies per thread
    #[arg(long)]
    pub max_thread_messages: Option<usize>,

    /// Records requested per page (1-1000)
    #[arg(long)]
    pub page_size: Option<u16>,

    /// Output format: json or markdown
    #[arg(short, long, default_value = "json")]
    pub format: Format,

    /// Output file path, stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
