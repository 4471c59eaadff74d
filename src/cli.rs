//! Command line interface definition
//!
//! Handles:
//! - Global data directory and verbosity flags
//! - Scan, status, history and retention commands
//! - Configuration inspection and updates
//! - Daemon lifecycle and LaunchAgent management

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use crate::config::default_data_dir;
use crate::models::ScanMode;

/// secmonitor - periodic workstation audit for suspicious configuration changes
#[derive(Debug, Parser)]
#[command(name = "secmonitor")]
#[command(version = concat!(env!("SECMONITOR_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(about = "Periodic workstation audit for suspicious software configuration changes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Arguments available for all commands
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory holding configuration, history, scripts and the event log
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalArgs {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a security scan now
    Scan {
        /// Scan depth (defaults to the configured mode)
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<ScanMode>,

        /// Use the recommended mode based on recent alerts
        #[arg(long, conflicts_with = "mode")]
        recommended: bool,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,

        /// Post desktop notifications for the result
        #[arg(long)]
        notify: bool,
    },

    /// Show current security status and dashboard statistics
    Status {
        /// Number of recent alerts to include
        #[arg(long, default_value_t = 5)]
        alerts: usize,

        #[arg(short, long)]
        json: bool,
    },

    /// List past scans, newest first
    History {
        /// Maximum number of scans to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(short, long)]
        json: bool,
    },

    /// Drop scans older than the retention horizon
    Purge {
        /// Retention in days (defaults to history.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Check that the scan routine is installed and executable
    Validate,

    /// Inspect or change configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage the background monitoring service
    #[command(subcommand)]
    Daemon(DaemonCommands),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Apply one or more key=value updates atomically
    Set {
        /// Updates such as scan.mode=full or scan.auto_scan_interval_secs=3600
        #[arg(required = true, value_name = "KEY=VALUE")]
        updates: Vec<String>,
    },

    /// Print the configuration file location
    Path,

    /// Mark an application path or glob pattern as critical
    AddApp { path: String },

    /// Remove a critical application entry
    RemoveApp { path: String },
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommands {
    /// Run the service in the foreground
    Run,

    /// Start the service in the background
    Start,

    /// Stop a running service
    Stop,

    /// Show whether the service is running or installed
    Status,

    /// Install and load a per-user LaunchAgent
    Install,

    /// Unload and remove the LaunchAgent
    Uninstall,

    /// Show recent service events
    Logs {
        /// Number of event log entries
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        /// Query the Unified Logging System instead of the event log
        #[arg(long)]
        system: bool,

        /// Time window for --system (e.g. 1h, 30m)
        #[arg(long, default_value = "1h", requires = "system")]
        since: String,
    },
}

fn parse_mode(value: &str) -> Result<ScanMode, String> {
    value.parse::<ScanMode>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_mode_parsing() {
        let cli = Cli::try_parse_from(["secmonitor", "scan", "--mode", "full", "--json"]).unwrap();
        match cli.command {
            Commands::Scan { mode, json, .. } => {
                assert_eq!(mode, Some(ScanMode::Full));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["secmonitor", "scan", "--mode", "turbo"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["secmonitor", "status", "--data-dir", "/tmp/sm", "-v"]).unwrap();
        assert_eq!(cli.global.data_dir(), PathBuf::from("/tmp/sm"));
        assert_eq!(cli.global.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_config_set_requires_updates() {
        assert!(Cli::try_parse_from(["secmonitor", "config", "set"]).is_err());
        let cli = Cli::try_parse_from(["secmonitor", "config", "set", "scan.mode=full", "history.max_scans=10"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommands::Set { updates }) => assert_eq!(updates.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_since_requires_system() {
        assert!(Cli::try_parse_from(["secmonitor", "daemon", "logs", "--since", "2h"]).is_err());
        assert!(Cli::try_parse_from(["secmonitor", "daemon", "logs", "--system", "--since", "2h"]).is_ok());
    }
}
