//! Output formatting module
//!
//! Handles:
//! - Human-readable scan reports grouped by category
//! - Status and history views
//! - JSON output of the same data
//! - Progress display while a scan is running (see `progress`)

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;
use crate::models::{AlertPriority, DashboardStats, ScanMode, ScanResult, SecurityAlert};
use crate::monitor::MonitorSnapshot;

pub mod progress;

/// Everything `secmonitor status` reports
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub snapshot: MonitorSnapshot,
    pub dashboard: DashboardStats,
    pub health_score: f64,
    pub recommended_mode: ScanMode,
    pub next_scan: String,
    pub daemon_running: bool,
    pub recent_alerts: Vec<SecurityAlert>,
}

/// Pretty-printed JSON for any report
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Milliseconds below one second, otherwise seconds with two decimals
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `[PRIORITY] title: message`, plus path and action lines when present
pub fn format_alert(alert: &SecurityAlert) -> String {
    let mut out = format!("  [{}] {}: {}", alert.priority, alert.title, alert.message);
    if let Some(path) = &alert.affected_path {
        let _ = write!(out, "\n      Path: {}", path);
    }
    if let Some(action) = &alert.recommended_action {
        let _ = write!(out, "\n      Action: {}", action);
    }
    out
}

/// Full report for one scan
pub fn format_scan_result(result: &ScanResult) -> String {
    let status = result.status();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} scan, {})",
        status.symbol(),
        status.display_name(),
        result.mode.display_name(),
        format_duration(result.duration)
    );
    let _ = writeln!(out, "Scanned at {}\n", format_timestamp(result.timestamp));

    if result.alerts.is_empty() {
        out.push_str("No security issues detected.\n");
    } else {
        let _ = writeln!(
            out,
            "Found {} alert(s): {} critical, {} high, {} medium, {} low\n",
            result.alerts.len(),
            result.count_with_priority(AlertPriority::Critical),
            result.count_with_priority(AlertPriority::High),
            result.count_with_priority(AlertPriority::Medium),
            result.count_with_priority(AlertPriority::Low),
        );
        for (category, alerts) in result.alerts_by_category() {
            let _ = writeln!(out, "{}:", category.display_name());
            for alert in alerts {
                let _ = writeln!(out, "{}", format_alert(alert));
            }
            out.push('\n');
        }
    }

    let stats = &result.statistics;
    let snapshot = &result.system_snapshot;
    out.push_str("Scan Summary:\n");
    let _ = writeln!(out, "  Applications: {} ({} critical)", stats.total_applications, stats.critical_applications);
    let _ = writeln!(out, "  Launch agents: {}", stats.launch_agents);
    let _ = writeln!(out, "  Launch daemons: {}", stats.launch_daemons);
    let _ = writeln!(out, "  System extensions: {}", stats.system_extensions);
    let _ = writeln!(out, "  Configuration profiles: {}", stats.configuration_profiles);
    let _ = writeln!(out, "  Packages: {}", stats.packages);
    let _ = writeln!(out, "  Login items: {}", stats.login_items);
    let _ = writeln!(out, "  Total items: {}", stats.total_items());
    out.push_str("\nSystem:\n");
    let _ = writeln!(out, "  macOS: {}", if snapshot.os_version.is_empty() { "unknown" } else { snapshot.os_version.as_str() });
    let _ = writeln!(out, "  System Integrity Protection: {}", on_off(snapshot.system_integrity_protection));
    let _ = writeln!(out, "  Gatekeeper: {}", on_off(snapshot.gatekeeper));
    let _ = writeln!(out, "  Firewall: {}", on_off(snapshot.firewall));
    let _ = write!(out, "  Automatic updates: {}", on_off(snapshot.automatic_updates));
    out
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

pub fn format_status(report: &StatusReport) -> String {
    let snapshot = &report.snapshot;
    let dashboard = &report.dashboard;
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", snapshot.status.symbol(), snapshot.status.display_name());
    if snapshot.is_scanning {
        let _ = writeln!(
            out,
            "  Scanning: {} ({:.0}%)",
            snapshot.current_phase,
            snapshot.progress * 100.0
        );
    }
    match snapshot.last_scan_date {
        Some(date) => {
            let _ = writeln!(out, "  Last scan: {}", format_timestamp(date));
        }
        None => out.push_str("  Last scan: never\n"),
    }
    let _ = writeln!(out, "  {}", report.next_scan);
    let _ = writeln!(out, "  Daemon: {}", if report.daemon_running { "running" } else { "not running" });
    let _ = writeln!(out, "  Health: {:.0}%", report.health_score * 100.0);
    let _ = writeln!(out, "  Recommended scan: {}", report.recommended_mode.display_name());

    out.push_str("\nDashboard:\n");
    let _ = writeln!(out, "  Total scans: {}", dashboard.total_scans);
    let _ = writeln!(out, "  Average scan time: {}", dashboard.average_scan_time_formatted());
    let _ = writeln!(
        out,
        "  Alerts this week: {} ({} critical)",
        dashboard.alerts_this_week, dashboard.critical_alerts_this_week
    );
    let _ = writeln!(out, "  System uptime: {}", dashboard.formatted_uptime());
    let _ = write!(out, "  Monitoring for: {} day(s)", dashboard.monitoring_days);

    if !report.recent_alerts.is_empty() {
        out.push_str("\n\nRecent alerts:\n");
        let lines: Vec<String> = report
            .recent_alerts
            .iter()
            .map(|alert| format!("  {} {}", format_timestamp(alert.timestamp), alert.short_description()))
            .collect();
        out.push_str(&lines.join("\n"));
    }
    out
}

/// One line per scan, newest first
pub fn format_history(results: &[ScanResult]) -> String {
    if results.is_empty() {
        return "No scans recorded.".to_string();
    }
    results
        .iter()
        .map(|result| {
            format!(
                "{}  {:<6}  {} {:<18}  {:>3} alert(s)  {}",
                format_timestamp(result.timestamp),
                result.mode.as_str(),
                result.status().symbol(),
                result.status().display_name(),
                result.alerts.len(),
                format_duration(result.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Confirmation for `config set`. A running daemon keeps the settings it
/// started with, so it has to be restarted to pick up any change.
pub fn format_config_updated(updates: &[String], daemon_running: bool) -> String {
    let mut out = String::from("✅ Configuration updated");
    for update in updates {
        let _ = write!(out, "\n  {}", update);
    }
    if daemon_running {
        out.push_str("\n  Restart the daemon to apply the changes: secmonitor daemon stop && secmonitor daemon start");
    }
    out
}
