//! CLI arguments and subcommands for sqlmem-diag.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "sqlmem-diag",
    about = "Diagnoses hidden physical-memory consumption on SQL Server hosts",
    long_about = "Diagnoses hidden physical-memory consumption on SQL Server hosts.\n\n\
                  Queries a point-in-time memory summary from the sqlmem-inspector kernel \
                  driver, tracks live virtual-memory allocation events, and applies fixed \
                  heuristics to name the likely culprit: locked/large-page memory, a \
                  virtualization host process, or unattributed kernel consumption.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path of the inspector control device
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Print the report as a JSON document instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable live event tracking (summary-only analysis)
    #[arg(long)]
    pub no_trace: bool,

    /// Run against simulated sources; no driver required
    #[arg(long)]
    pub simulate: bool,

    /// Log level (overrides the config file; defaults to info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a report every interval until interrupted
    Watch {
        /// Seconds between captures (overrides the config file)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Verify the driver control channel opens and a summary parses
    Check,
}
