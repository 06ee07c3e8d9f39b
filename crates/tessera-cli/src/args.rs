//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - chat with your notes and watch background tasks")]
#[command(
    long_about = r#"Tessera - chat with your notes and watch background tasks

USAGE:
  tessera chat "question"        # Stream an answer
  tessera tasks --status running # List tasks
  tessera agents                 # Per-agent summary
  tessera logs <task_id>         # Step timeline of a task
  tessera cancel <task_id>       # Ask the backend to cancel a task
  tessera stop-all               # Cancel every active task
  tessera watch                  # Live task view"#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question and stream the answer
    Chat {
        /// Message to send
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// List tasks
    Tasks {
        /// `all` or one of pending, queued, running, completed, failed, cancelled
        #[arg(long, short, default_value = "all")]
        status: String,

        /// Show child tasks under their dispatcher
        #[arg(long)]
        tree: bool,
    },

    /// Show what each agent is doing
    Agents,

    /// Show the step timeline of a task
    Logs {
        task_id: String,
    },

    /// Request cancellation of a task
    Cancel {
        task_id: String,
    },

    /// Request cancellation of every pending, queued or running task
    StopAll,

    /// Poll tasks and redraw on every change
    Watch {
        /// Override the poll interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}
