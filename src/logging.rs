//! Logging setup and the structured event log
//!
//! Interactive commands log to stderr through env_logger. The daemon logs to
//! the macOS Unified Logging System under the `com.secmonitor.agent`
//! subsystem, and additionally appends one JSON object per line to
//! `events.log` in the data directory, rotating it by size.

use anyhow::{Context, Result};
use log::{LevelFilter, error, info, warn};
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use crate::config::LoggingSettings;
use crate::constants::{
    APP_SUBSYSTEM, EVENT_DAEMON_SHUTDOWN, EVENT_DAEMON_STARTUP, EVENT_ERROR, EVENT_LOG_NAME,
    EVENT_SCAN_COMPLETED, EVENT_SCAN_FAILED, EVENT_SCAN_STARTED,
};
use crate::error::ScanError;
use crate::models::{ScanMode, ScanResult};

/// Log to stderr for interactive use
pub fn init_terminal_logging(level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))
}

/// Log to the Unified Logging System
#[cfg(target_os = "macos")]
pub fn init_daemon_logging(level: LevelFilter) -> Result<()> {
    let logger = oslog::OsLogger::new(APP_SUBSYSTEM);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub fn init_daemon_logging(level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))
}

/// Append-only JSON-lines event log with size-based rotation
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    max_bytes: u64,
    rotation_count: u32,
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, rotation_count: u32) -> Self {
        Self {
            path: path.into(),
            max_bytes: max_bytes.max(1),
            rotation_count: rotation_count.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// `events.log` under `data_dir`, limits from the logging settings
    pub fn in_data_dir(data_dir: &Path, settings: &LoggingSettings) -> Self {
        Self::new(
            data_dir.join(EVENT_LOG_NAME),
            settings.log_max_size_mb.saturating_mul(1024 * 1024),
            settings.log_rotation_count,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_startup(&self, pid: u32, data_dir: &Path) {
        self.record(
            log::Level::Info,
            "Daemon started",
            json!({
                "event": EVENT_DAEMON_STARTUP,
                "pid": pid,
                "data_dir": data_dir.display().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        self.record(
            log::Level::Info,
            "Daemon shutting down",
            json!({
                "event": EVENT_DAEMON_SHUTDOWN,
                "reason": reason,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn log_scan_started(&self, mode: ScanMode) {
        self.record(
            log::Level::Info,
            "Scan started",
            json!({
                "event": EVENT_SCAN_STARTED,
                "mode": mode,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn log_scan_completed(&self, result: &ScanResult) {
        self.record(
            log::Level::Info,
            "Scan completed",
            json!({
                "event": EVENT_SCAN_COMPLETED,
                "scan_id": result.id,
                "mode": result.mode,
                "status": result.status(),
                "duration_secs": result.duration.as_secs_f64(),
                "alert_count": result.alerts.len(),
                "total_items": result.statistics.total_items(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn log_scan_failed(&self, mode: ScanMode, scan_error: &ScanError) {
        self.record(
            log::Level::Error,
            "Scan failed",
            json!({
                "event": EVENT_SCAN_FAILED,
                "mode": mode,
                "error": scan_error.to_string(),
                "suggestion": scan_error.recovery_suggestion(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    pub fn log_error(&self, message: &str, context: Option<&str>) {
        self.record(
            log::Level::Error,
            message,
            json!({
                "event": EVENT_ERROR,
                "message": message,
                "context": context,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    /// Last `lines` entries of the current file, oldest first
    pub fn tail(&self, lines: usize) -> Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };
        let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = all.len().saturating_sub(lines);
        Ok(all[skip..].iter().map(|l| l.to_string()).collect())
    }

    /// Mirror to the log facade and append to the file. Write failures are logged.
    fn record(&self, level: log::Level, message: &str, data: Value) {
        let line = data.to_string();
        match level {
            log::Level::Error => error!("{} | {}", message, line),
            log::Level::Warn => warn!("{} | {}", message, line),
            _ => info!("{} | {}", message, line),
        }
        if let Err(e) = self.append(&line) {
            warn!("Failed to write event log {}: {:#}", self.path.display(), e);
        }
    }

    fn append(&self, line: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if fs::metadata(&self.path).map(|m| m.len() >= self.max_bytes).unwrap_or(false) {
            self.rotate()?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// events.log -> events.log.1 -> ... -> events.log.N (dropped)
    fn rotate(&self) -> Result<()> {
        let oldest = self.rotated_path(self.rotation_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.rotation_count).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.rotated_path(1))?;
        Ok(())
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }
}

/// Retrieve daemon entries from the Unified Logging System using `log show`
pub fn get_system_logs(since: &str) -> Result<Vec<String>> {
    let output = Command::new("log")
        .args([
            "show",
            "--predicate",
            &format!("subsystem == \"{}\"", APP_SUBSYSTEM),
            "--last",
            since,
            "--style",
            "compact",
        ])
        .output()
        .context("Failed to execute log show command")?;

    if !output.status.success() {
        anyhow::bail!(
            "log show command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let output_str = String::from_utf8(output.stdout).context("Invalid UTF-8 in log output")?;
    Ok(output_str
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect())
}
