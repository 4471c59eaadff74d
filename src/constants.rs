//! Global constants for secmonitor
//!
//! Centralized location for application-wide identifiers, bounds and defaults

use std::time::Duration;

/// Application subsystem identifier for macOS Unified Logging System
/// Used for the LaunchAgent label, ULS logging, and daemon identification
pub const APP_SUBSYSTEM: &str = "com.secmonitor.agent";

/// LaunchAgent plist file name
pub const LAUNCHD_PLIST_NAME: &str = "com.secmonitor.agent.plist";

/// LaunchAgent label (same as subsystem)
pub const LAUNCHD_SERVICE_NAME: &str = APP_SUBSYSTEM;

/// CLI subcommand names used to recognise a running daemon
pub const DAEMON_SUBCOMMAND: &str = "daemon";
pub const DAEMON_RUN_SUBCOMMAND: &str = "run";

/// Set on the detached child so it runs the service loop instead of forking again
pub const DAEMON_CHILD_ENV: &str = "SECMONITOR_DAEMON_CHILD";

/// Directory name under the platform data directory
pub const DATA_DIR_NAME: &str = "secmonitor";

/// Key-value store keys
pub const CONFIGURATION_KEY: &str = "configuration";
pub const SCAN_HISTORY_KEY: &str = "scan_history";

/// Default scan routine file name, resolved under `<data dir>/scripts/`
pub const DEFAULT_SCRIPT_NAME: &str = "security_scan.sh";

/// Default interpreter used to run the scan routine
pub const DEFAULT_INTERPRETER: &str = "/bin/bash";

/// Environment passed to the scan routine
pub const ENV_MONITOR_MODE: &str = "MONITOR_MODE";
pub const ENV_NOTIFICATION_FREQUENCY: &str = "NOTIFICATION_FREQUENCY";
pub const ENV_GROUPED_NOTIFICATIONS: &str = "ENABLE_GROUPED_NOTIFICATIONS";
pub const ENV_OUTPUT_FORMAT: &str = "OUTPUT_FORMAT";

/// History retention defaults
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 100;
pub const DEFAULT_MAX_RECENT_ALERTS: usize = 50;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Auto-scan interval bounds in seconds.
/// Note: ConfigError::InvalidInterval message must match these.
pub const AUTO_SCAN_INTERVAL_MIN: u64 = 60;
pub const AUTO_SCAN_INTERVAL_MAX: u64 = 604_800;
pub const DEFAULT_AUTO_SCAN_INTERVAL: u64 = 1800;

/// Time the "Scan completed" label stays visible before the tracker resets
pub const COMPLETION_GRACE: Duration = Duration::from_millis(500);

/// How often the service loop runs retention hygiene
pub const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Structured event log file name under the data directory
pub const EVENT_LOG_NAME: &str = "events.log";

/// Event type identifiers for the structured event log
pub const EVENT_DAEMON_STARTUP: &str = "daemon_startup";
pub const EVENT_DAEMON_SHUTDOWN: &str = "daemon_shutdown";
pub const EVENT_SCAN_STARTED: &str = "scan_started";
pub const EVENT_SCAN_COMPLETED: &str = "scan_completed";
pub const EVENT_SCAN_FAILED: &str = "scan_failed";
pub const EVENT_ERROR: &str = "error";
