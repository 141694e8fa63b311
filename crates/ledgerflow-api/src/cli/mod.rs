//! CLI command definitions for the `lflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod invoice;
pub mod review;
pub mod thread;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, Color};

use ledgerflow_types::checkpoint::ThreadStatus;
use ledgerflow_types::review::Decision;

/// Durable invoice workflows with human review.
#[derive(Parser)]
#[command(name = "lflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server (recovers interrupted threads first).
    Serve {
        /// Port to listen on (default from config.toml).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config.toml).
        #[arg(long)]
        host: Option<String>,
    },

    /// Submit an invoice JSON file and run it until it pauses or finishes.
    Submit {
        /// Path to the invoice payload.
        file: PathBuf,
    },

    /// List pending review tickets.
    Reviews,

    /// Decide a pending review ticket and resume its thread.
    Decide {
        /// Ticket id (e.g. T-1).
        ticket_id: String,

        decision: DecisionArg,

        /// Reviewer notes recorded with the decision.
        #[arg(long)]
        notes: Option<String>,
    },

    /// List workflow threads.
    #[command(alias = "ls")]
    Threads {
        #[arg(long)]
        status: Option<StatusArg>,
    },

    /// Show the step-by-step audit trail of a thread.
    Trace {
        thread_id: String,
    },

    /// Resume interrupted threads and re-register missing review tickets.
    Recover,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DecisionArg {
    Accept,
    Reject,
}

impl From<DecisionArg> for Decision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Accept => Decision::Accept,
            DecisionArg::Reject => Decision::Reject,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Running,
    Paused,
    Completed,
    Failed,
}

impl From<StatusArg> for ThreadStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Running => ThreadStatus::Running,
            StatusArg::Paused => ThreadStatus::Paused,
            StatusArg::Completed => ThreadStatus::Completed,
            StatusArg::Failed => ThreadStatus::Failed,
        }
    }
}

/// Colored status cell shared by the table views.
pub(crate) fn status_cell(status: ThreadStatus) -> Cell {
    let color = match status {
        ThreadStatus::Running => Color::Blue,
        ThreadStatus::Paused => Color::Yellow,
        ThreadStatus::Completed => Color::Green,
        ThreadStatus::Failed => Color::Red,
    };
    Cell::new(status).fg(color)
}

/// Styled one-word status for line output.
pub(crate) fn styled_status(status: ThreadStatus) -> console::StyledObject<&'static str> {
    let s = console::style(status.as_str());
    match status {
        ThreadStatus::Running => s.blue(),
        ThreadStatus::Paused => s.yellow(),
        ThreadStatus::Completed => s.green(),
        ThreadStatus::Failed => s.red(),
    }
}
