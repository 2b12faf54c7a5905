//! CLI arguments and subcommands for vigil-agent.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "vigil-agent",
    about = "Host-resident monitoring agent for pluggable check programs",
    long_about = "Host-resident monitoring agent for pluggable check programs.\n\n\
                  Discovers check plugins on disk, runs them on a fixed interval, parses \
                  their nagios/errplane output into typed metrics, computes per-second \
                  rates between samples, and ships dimensioned points to a metrics backend.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Hostname dimension attached to every point
    #[arg(long)]
    pub hostname: Option<String>,

    /// Seconds between scheduler ticks (also the per-plugin deadline)
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Seconds between plugin inventory uploads
    #[arg(long)]
    pub inventory_interval: Option<u64>,

    /// Bundled plugins root directory
    #[arg(long)]
    pub plugins_dir: Option<PathBuf>,

    /// Custom plugins directory (overrides bundled plugins by name)
    #[arg(long)]
    pub custom_plugins_dir: Option<PathBuf>,

    /// Config service base URL
    #[arg(long)]
    pub config_service_url: Option<String>,

    /// Metrics ingest URL
    #[arg(long)]
    pub ingest_url: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate environment and configuration
    Check,

    /// Run one discovered plugin once and print its parsed output
    Test {
        /// Plugin name to run
        plugin: String,

        /// Extra arguments passed to the plugin's status executable
        #[arg(last = true)]
        args: Vec<String>,

        /// Per-run deadline in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// List the plugins discoverable on this host
    List,
}
