//! Data models module
//!
//! Defines core data structures:
//! - ScanMode: scan depth with phase labels and pacing
//! - SecurityAlert: one classified finding from scan output
//! - ScanStatistics / SystemSnapshot: per-scan aggregates
//! - ScanResult: immutable outcome of one completed scan
//! - DashboardStats: values derived from the retained history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Depth of a security scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Quick,
    Normal,
    Full,
}

impl ScanMode {
    pub const ALL: [ScanMode; 3] = [ScanMode::Quick, ScanMode::Normal, ScanMode::Full];

    /// Value passed to the scan routine in `MONITOR_MODE`
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Quick => "quick",
            ScanMode::Normal => "normal",
            ScanMode::Full => "full",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ScanMode::Quick => "Quick Scan",
            ScanMode::Normal => "Normal Scan",
            ScanMode::Full => "Deep Scan",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScanMode::Quick => "Critical apps only (~30s)",
            ScanMode::Normal => "Complete analysis (~2-3min)",
            ScanMode::Full => "Deep forensic scan (~5-10min)",
        }
    }

    /// Expected wall-clock duration, used only to pace progress display
    pub fn expected_duration(&self) -> Duration {
        match self {
            ScanMode::Quick => Duration::from_secs(30),
            ScanMode::Normal => Duration::from_secs(150),
            ScanMode::Full => Duration::from_secs(450),
        }
    }

    /// Ordered phase labels shown while a scan of this mode runs
    pub fn phases(&self) -> &'static [&'static str] {
        match self {
            ScanMode::Quick => &[
                "Loading critical apps...",
                "Scanning applications...",
                "Analyzing results...",
            ],
            ScanMode::Normal => &[
                "Initializing scan...",
                "Scanning applications...",
                "Checking launch agents...",
                "Analyzing system...",
                "Processing results...",
            ],
            ScanMode::Full => &[
                "Preparing deep scan...",
                "Scanning applications...",
                "Checking launch agents...",
                "Checking launch daemons...",
                "Analyzing system extensions...",
                "Checking configuration profiles...",
                "Scanning packages...",
                "Processing comprehensive results...",
            ],
        }
    }

    /// Interval between phase advances: expected duration spread over the phases
    pub fn phase_cadence(&self) -> Duration {
        self.expected_duration() / self.phases().len() as u32
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(ScanMode::Quick),
            "normal" => Ok(ScanMode::Normal),
            "full" | "deep" => Ok(ScanMode::Full),
            other => Err(format!(
                "Invalid scan mode '{}'. Expected one of: quick, normal, full",
                other
            )),
        }
    }
}

/// Overall security posture of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityStatus {
    Secure,
    Warning,
    Critical,
    Scanning,
    Unknown,
}

impl SecurityStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            SecurityStatus::Secure => "System Secure",
            SecurityStatus::Warning => "Warnings Detected",
            SecurityStatus::Critical => "Critical Issues",
            SecurityStatus::Scanning => "Scanning...",
            SecurityStatus::Unknown => "Status Unknown",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            SecurityStatus::Secure => "✅",
            SecurityStatus::Warning => "⚠️",
            SecurityStatus::Critical => "❌",
            SecurityStatus::Scanning => "🔍",
            SecurityStatus::Unknown => "❔",
        }
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityStatus::Secure => "secure",
            SecurityStatus::Warning => "warning",
            SecurityStatus::Critical => "critical",
            SecurityStatus::Scanning => "scanning",
            SecurityStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Priority of a security alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertPriority {
    /// Sort weight, higher is more severe
    pub fn weight(&self) -> u8 {
        match self {
            AlertPriority::Critical => 4,
            AlertPriority::High => 3,
            AlertPriority::Medium => 2,
            AlertPriority::Low => 1,
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertPriority::Critical => "CRITICAL",
            AlertPriority::High => "HIGH",
            AlertPriority::Medium => "MEDIUM",
            AlertPriority::Low => "LOW",
        };
        f.write_str(name)
    }
}

/// Kind of system item an alert refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Application,
    LaunchAgent,
    LaunchDaemon,
    SystemExtension,
    ConfigurationProfile,
    SystemConfiguration,
    Package,
    LoginItem,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 8] = [
        AlertCategory::Application,
        AlertCategory::LaunchAgent,
        AlertCategory::LaunchDaemon,
        AlertCategory::SystemExtension,
        AlertCategory::ConfigurationProfile,
        AlertCategory::SystemConfiguration,
        AlertCategory::Package,
        AlertCategory::LoginItem,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            AlertCategory::Application => "Applications",
            AlertCategory::LaunchAgent => "Launch Agents",
            AlertCategory::LaunchDaemon => "Launch Daemons",
            AlertCategory::SystemExtension => "System Extensions",
            AlertCategory::ConfigurationProfile => "Configuration Profiles",
            AlertCategory::SystemConfiguration => "System Configuration",
            AlertCategory::Package => "Packages",
            AlertCategory::LoginItem => "Login Items",
        }
    }
}

/// A single classified finding. Immutable once created by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub priority: AlertPriority,
    pub category: AlertCategory,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub affected_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recommended_action: Option<String>,
}

impl SecurityAlert {
    /// True when the alert is less than an hour old
    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) < chrono::Duration::hours(1)
    }

    /// Message truncated for list views
    pub fn short_description(&self) -> String {
        if self.message.chars().count() > 60 {
            let head: String = self.message.chars().take(57).collect();
            format!("{}...", head)
        } else {
            self.message.clone()
        }
    }
}

/// Keyword occurrence counts for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub total_applications: usize,
    /// Subset of `total_applications`; excluded from `total_items`
    pub critical_applications: usize,
    pub launch_agents: usize,
    pub launch_daemons: usize,
    pub system_extensions: usize,
    pub configuration_profiles: usize,
    pub packages: usize,
    pub login_items: usize,
}

impl ScanStatistics {
    pub fn total_items(&self) -> usize {
        self.total_applications
            + self.launch_agents
            + self.launch_daemons
            + self.system_extensions
            + self.configuration_profiles
            + self.packages
            + self.login_items
    }
}

/// Coarse OS security settings at scan time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub os_version: String,
    pub system_integrity_protection: bool,
    pub gatekeeper: bool,
    pub firewall: bool,
    pub automatic_updates: bool,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one completed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub mode: ScanMode,
    #[serde(rename = "duration_secs", with = "duration_secs")]
    pub duration: Duration,
    pub alerts: Vec<SecurityAlert>,
    pub statistics: ScanStatistics,
    pub system_snapshot: SystemSnapshot,
}

impl ScanResult {
    /// Status derived from alert priorities: any critical wins, then any high
    pub fn status(&self) -> SecurityStatus {
        if self.alerts.iter().any(|a| a.priority == AlertPriority::Critical) {
            SecurityStatus::Critical
        } else if self.alerts.iter().any(|a| a.priority == AlertPriority::High) {
            SecurityStatus::Warning
        } else {
            SecurityStatus::Secure
        }
    }

    pub fn alerts_by_category(&self) -> BTreeMap<AlertCategory, Vec<&SecurityAlert>> {
        let mut grouped: BTreeMap<AlertCategory, Vec<&SecurityAlert>> = BTreeMap::new();
        for alert in &self.alerts {
            grouped.entry(alert.category).or_default().push(alert);
        }
        grouped
    }

    pub fn count_with_priority(&self, priority: AlertPriority) -> usize {
        self.alerts.iter().filter(|a| a.priority == priority).count()
    }
}

/// Dashboard values, recomputed from history on every read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_scans: usize,
    pub last_scan_date: Option<DateTime<Utc>>,
    #[serde(rename = "average_scan_time_secs", with = "duration_secs")]
    pub average_scan_time: Duration,
    pub alerts_this_week: usize,
    pub critical_alerts_this_week: usize,
    #[serde(rename = "system_uptime_secs", with = "duration_secs")]
    pub system_uptime: Duration,
    pub monitoring_days: i64,
}

impl DashboardStats {
    pub fn formatted_uptime(&self) -> String {
        let hours = self.system_uptime.as_secs() / 3600;
        let days = hours / 24;
        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else {
            format!("{}h", hours)
        }
    }

    pub fn average_scan_time_formatted(&self) -> String {
        let secs = self.average_scan_time.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }

    /// Health in [0, 1]: 0.2 off per critical alert this week, 0.05 per other alert
    pub fn health_score(&self) -> f64 {
        let critical = self.critical_alerts_this_week as f64;
        let other = self.alerts_this_week.saturating_sub(self.critical_alerts_this_week) as f64;
        (1.0 - 0.2 * critical - 0.05 * other).clamp(0.0, 1.0)
    }
}

/// Serialize `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}
