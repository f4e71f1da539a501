//! Command-line interface for exception-notifier using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::{Command as ProcessCommand, ExitStatus};
use thiserror::Error;

/// Message used by `render` and `test` when none is given.
pub const DEFAULT_SAMPLE_MESSAGE: &str = "exception-notifier test notification";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Email notifications for unhandled errors.
#[derive(Parser, Debug)]
#[command(name = "exception-notifier")]
#[command(version)]
#[command(about = "Email notifications for unhandled errors")]
pub struct Cli {
    /// Application root holding config/exception-email.yml and email_templates/.
    #[arg(
        short = 'r',
        long = "root",
        default_value = ".",
        env = "EXCEPTION_NOTIFIER_ROOT",
        global = true
    )]
    pub root: PathBuf,

    /// Environment section of the configuration file (e.g. production).
    #[arg(short = 'e', long = "environment", env = "EXCEPTION_NOTIFIER_ENV", global = true)]
    pub environment: Option<String>,

    /// Log format: text or json.
    #[arg(
        long = "log-format",
        value_enum,
        default_value_t = LogFormat::Text,
        env = "LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate configuration and template, then exit.
    Validate,
    /// Render a sample notification to stdout without sending it.
    Render {
        #[arg(short = 'm', long = "message", default_value = DEFAULT_SAMPLE_MESSAGE)]
        message: String,
    },
    /// Send a sample notification.
    Test {
        #[arg(short = 'm', long = "message", default_value = DEFAULT_SAMPLE_MESSAGE)]
        message: String,
    },
    /// Run a command and send a notification if it fails.
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Failure of a command started by `run`.
#[derive(Error, Debug)]
pub enum ProcessFailure {
    #[error("command `{command}` could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command `{command}` failed: {status}")]
    Exit { command: String, status: ExitStatus },
}

impl ProcessFailure {
    /// Exit code to hand back to our own caller.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessFailure::Spawn { .. } => 127,
            ProcessFailure::Exit { status, .. } => status.code().unwrap_or(1),
        }
    }
}

/// Run `command` (program followed by its arguments) with inherited stdio.
pub fn run_command(command: &[String]) -> Result<(), ProcessFailure> {
    let command_line = command.join(" ");
    let Some((program, args)) = command.split_first() else {
        return Err(ProcessFailure::Spawn {
            command: command_line,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    tracing::info!(command = %command_line, "Running guarded command");

    let status = ProcessCommand::new(program)
        .args(args)
        .status()
        .map_err(|source| ProcessFailure::Spawn {
            command: command_line.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ProcessFailure::Exit {
            command: command_line,
            status,
        })
    }
}
