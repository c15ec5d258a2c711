//! CLI command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Repository analysis orchestrator.
#[derive(Parser)]
#[command(name = "orchestrator", about = "Repository analysis pipeline orchestrator", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the orchestrator's admission loop in the foreground.
    Serve,

    /// Submit a repository directory for analysis, creating a new task.
    Submit {
        /// Display name for the repository.
        #[arg(long)]
        name: String,

        /// Path to the repository on disk.
        path: PathBuf,
    },

    /// Show a task's status and progress.
    Status {
        /// Task id.
        task_id: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show queue depth and worker health.
    Health {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for status/health commands.
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format: {s}. use: text or json")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
