//! Scan output parsing
//!
//! Turns the routine's free-form text into typed alerts, keyword statistics
//! and a system snapshot. Lines are classified by an ordered rule table;
//! the first rule whose markers all appear in the line wins. Lines that
//! match no rule are ignored.

use chrono::Utc;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use crate::error::ScanError;
use crate::models::{AlertCategory, AlertPriority, ScanMode, ScanResult, ScanStatistics, SecurityAlert};
use crate::status::StatusProvider;

/// Converts raw routine output into a `ScanResult`
pub trait OutputParser: Send + Sync {
    fn parse(&self, raw: &[u8], mode: ScanMode, duration: Duration) -> Result<ScanResult, ScanError>;
}

/// One classification rule: every marker must occur (case-sensitive)
struct AlertRule {
    markers: &'static [&'static str],
    priority: AlertPriority,
    category: AlertCategory,
    title: &'static str,
    recommended_action: &'static str,
}

const ALERT_RULES: &[AlertRule] = &[
    AlertRule {
        markers: &["CRITICAL", "app"],
        priority: AlertPriority::Critical,
        category: AlertCategory::Application,
        title: "Critical Application Change",
        recommended_action: "Review application changes immediately",
    },
    AlertRule {
        markers: &["LaunchAgent"],
        priority: AlertPriority::High,
        category: AlertCategory::LaunchAgent,
        title: "Launch Agent Change",
        recommended_action: "Verify launch agent legitimacy",
    },
    AlertRule {
        markers: &["LaunchDaemon"],
        priority: AlertPriority::High,
        category: AlertCategory::LaunchDaemon,
        title: "Launch Daemon Change",
        recommended_action: "Verify launch daemon legitimacy",
    },
    AlertRule {
        markers: &["SystemExtension"],
        priority: AlertPriority::High,
        category: AlertCategory::SystemExtension,
        title: "System Extension Change",
        recommended_action: "Confirm the system extension was approved",
    },
    AlertRule {
        markers: &["ConfigurationProfile"],
        priority: AlertPriority::Medium,
        category: AlertCategory::ConfigurationProfile,
        title: "Configuration Profile Change",
        recommended_action: "Review installed configuration profiles",
    },
    AlertRule {
        markers: &["LoginItem"],
        priority: AlertPriority::Medium,
        category: AlertCategory::LoginItem,
        title: "Login Item Change",
        recommended_action: "Review login items",
    },
    AlertRule {
        markers: &["Gatekeeper", "disabled"],
        priority: AlertPriority::Medium,
        category: AlertCategory::SystemConfiguration,
        title: "Gatekeeper Disabled",
        recommended_action: "Re-enable Gatekeeper: sudo spctl --master-enable",
    },
    AlertRule {
        markers: &["SIP", "disabled"],
        priority: AlertPriority::Medium,
        category: AlertCategory::SystemConfiguration,
        title: "System Integrity Protection Disabled",
        recommended_action: "Re-enable SIP from Recovery mode",
    },
    AlertRule {
        markers: &["Firewall", "disabled"],
        priority: AlertPriority::Medium,
        category: AlertCategory::SystemConfiguration,
        title: "Firewall Disabled",
        recommended_action: "Enable the application firewall",
    },
    AlertRule {
        markers: &["package", "installed"],
        priority: AlertPriority::Low,
        category: AlertCategory::Package,
        title: "Package Installed",
        recommended_action: "Verify the package source",
    },
];

const PATH_PATTERN: &str = r"/[^\s]+\.(?:app|plist|pkg)";

/// Check if a critical-app entry contains glob pattern characters
pub fn is_glob_pattern(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?') || entry.contains('[')
}

/// Match a path against a critical-app entry.
///
/// Glob entries use glob matching; plain entries match the exact path or
/// anything beneath it (`/Applications/Safari.app` matches
/// `/Applications/Safari.app/Contents/MacOS/Safari`).
pub fn matches_critical_app(path: &str, entry: &str) -> bool {
    if is_glob_pattern(entry) {
        match Pattern::new(entry) {
            Ok(pattern) => pattern.matches(path),
            Err(_) => path == entry,
        }
    } else {
        let entry = entry.trim_end_matches('/');
        path == entry
            || path
                .strip_prefix(entry)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Keyword-driven parser with critical-app escalation
pub struct HeuristicParser {
    status: Arc<dyn StatusProvider>,
    critical_apps: Vec<String>,
    path_regex: Regex,
    stat_patterns: StatPatterns,
}

struct StatPatterns {
    applications: Regex,
    critical_applications: Regex,
    launch_agents: Regex,
    launch_daemons: Regex,
    system_extensions: Regex,
    configuration_profiles: Regex,
    packages: Regex,
    login_items: Regex,
}

impl StatPatterns {
    fn new() -> Result<Self, regex::Error> {
        let ci = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
        Ok(Self {
            applications: ci("app")?,
            critical_applications: ci("critical.*app")?,
            launch_agents: ci("LaunchAgent")?,
            launch_daemons: ci("LaunchDaemon")?,
            system_extensions: ci("SystemExtension")?,
            configuration_profiles: ci("ConfigurationProfile")?,
            packages: ci("package")?,
            login_items: ci("LoginItem")?,
        })
    }

    fn count(&self, text: &str) -> ScanStatistics {
        ScanStatistics {
            total_applications: self.applications.find_iter(text).count(),
            critical_applications: self.critical_applications.find_iter(text).count(),
            launch_agents: self.launch_agents.find_iter(text).count(),
            launch_daemons: self.launch_daemons.find_iter(text).count(),
            system_extensions: self.system_extensions.find_iter(text).count(),
            configuration_profiles: self.configuration_profiles.find_iter(text).count(),
            packages: self.packages.find_iter(text).count(),
            login_items: self.login_items.find_iter(text).count(),
        }
    }
}

impl HeuristicParser {
    pub fn new(status: Arc<dyn StatusProvider>, critical_apps: Vec<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            status,
            critical_apps,
            path_regex: Regex::new(PATH_PATTERN)?,
            stat_patterns: StatPatterns::new()?,
        })
    }

    /// First `.app`, `.plist` or `.pkg` path in the line
    pub fn extract_path(&self, line: &str) -> Option<String> {
        self.path_regex.find(line).map(|m| m.as_str().to_string())
    }

    /// Classify one line, or `None` when no rule applies
    pub fn parse_line(&self, line: &str) -> Option<SecurityAlert> {
        let line = line.trim();
        let rule = ALERT_RULES
            .iter()
            .find(|rule| rule.markers.iter().all(|marker| line.contains(marker)))?;

        let affected_path = self.extract_path(line);
        let priority = match &affected_path {
            Some(path) if self.is_critical_path(path) => AlertPriority::Critical,
            _ => rule.priority,
        };

        Some(SecurityAlert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            priority,
            category: rule.category,
            title: rule.title.to_string(),
            message: line.to_string(),
            details: None,
            affected_path,
            recommended_action: Some(rule.recommended_action.to_string()),
        })
    }

    pub fn statistics(&self, text: &str) -> ScanStatistics {
        self.stat_patterns.count(text)
    }

    fn is_critical_path(&self, path: &str) -> bool {
        self.critical_apps.iter().any(|entry| matches_critical_app(path, entry))
    }
}

impl OutputParser for HeuristicParser {
    fn parse(&self, raw: &[u8], mode: ScanMode, duration: Duration) -> Result<ScanResult, ScanError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| ScanError::InvalidOutput(format!("output is not valid UTF-8: {}", e)))?;

        let alerts = text.lines().filter_map(|line| self.parse_line(line)).collect();

        Ok(ScanResult {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            mode,
            duration,
            alerts,
            statistics: self.statistics(text),
            system_snapshot: self.status.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecurityStatus;
    use crate::status::StaticStatusProvider;

    fn parser(critical_apps: &[&str]) -> HeuristicParser {
        let status = Arc::new(StaticStatusProvider {
            os_version: "14.5".to_string(),
            sip: true,
            gatekeeper: true,
            firewall: false,
            automatic_updates: true,
        });
        HeuristicParser::new(status, critical_apps.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn parse(p: &HeuristicParser, text: &str) -> ScanResult {
        p.parse(text.as_bytes(), ScanMode::Normal, Duration::from_secs(3)).unwrap()
    }

    #[test]
    fn test_non_matching_output_yields_no_alerts() {
        let result = parse(&parser(&[]), "Scan finished\nnothing to report\n");
        assert!(result.alerts.is_empty());
        assert_eq!(result.status(), SecurityStatus::Secure);
    }

    #[test]
    fn test_empty_output() {
        let result = parse(&parser(&[]), "");
        assert!(result.alerts.is_empty());
        assert_eq!(result.statistics, ScanStatistics::default());
        assert_eq!(result.system_snapshot.os_version, "14.5");
    }

    #[test]
    fn test_critical_app_line() {
        let result = parse(&parser(&[]), "CRITICAL: new app /Applications/Evil.app");
        assert_eq!(result.alerts.len(), 1);
        let alert = &result.alerts[0];
        assert_eq!(alert.priority, AlertPriority::Critical);
        assert_eq!(alert.category, AlertCategory::Application);
        assert_eq!(alert.title, "Critical Application Change");
        assert_eq!(alert.message, "CRITICAL: new app /Applications/Evil.app");
        assert_eq!(alert.affected_path.as_deref(), Some("/Applications/Evil.app"));
        assert_eq!(alert.recommended_action.as_deref(), Some("Review application changes immediately"));
    }

    #[test]
    fn test_first_rule_wins() {
        let p = parser(&[]);
        let alert = p.parse_line("CRITICAL app touched LaunchAgent").unwrap();
        assert_eq!(alert.category, AlertCategory::Application);

        let alert = p.parse_line("LaunchAgent and LaunchDaemon both changed").unwrap();
        assert_eq!(alert.category, AlertCategory::LaunchAgent);
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        let p = parser(&[]);
        assert!(p.parse_line("critical app update").is_none());
        assert!(p.parse_line("launchagent added").is_none());
        // "CRITICAL" without "app" falls through
        assert!(p.parse_line("CRITICAL kernel panic").is_none());
    }

    #[test]
    fn test_extended_rules() {
        let p = parser(&[]);
        let cases = [
            ("New LaunchDaemon /Library/LaunchDaemons/x.plist", AlertCategory::LaunchDaemon, AlertPriority::High),
            ("SystemExtension loaded", AlertCategory::SystemExtension, AlertPriority::High),
            ("ConfigurationProfile added", AlertCategory::ConfigurationProfile, AlertPriority::Medium),
            ("LoginItem registered", AlertCategory::LoginItem, AlertPriority::Medium),
            ("Gatekeeper is disabled", AlertCategory::SystemConfiguration, AlertPriority::Medium),
            ("SIP disabled", AlertCategory::SystemConfiguration, AlertPriority::Medium),
            ("Firewall disabled", AlertCategory::SystemConfiguration, AlertPriority::Medium),
            ("package com.example.tool installed", AlertCategory::Package, AlertPriority::Low),
        ];
        for (line, category, priority) in cases {
            let alert = p.parse_line(line).unwrap();
            assert_eq!(alert.category, category, "{}", line);
            assert_eq!(alert.priority, priority, "{}", line);
        }
        assert!(p.parse_line("Gatekeeper enabled").is_none());
    }

    #[test]
    fn test_path_extraction() {
        let p = parser(&[]);
        assert_eq!(
            p.extract_path("LaunchAgent /Users/me/Library/LaunchAgents/com.x.plist added").as_deref(),
            Some("/Users/me/Library/LaunchAgents/com.x.plist")
        );
        assert_eq!(p.extract_path("pkg at /tmp/a.pkg and /tmp/b.app").as_deref(), Some("/tmp/a.pkg"));
        assert_eq!(p.extract_path("LaunchAgent added with no path"), None);
        assert_eq!(p.extract_path("file /tmp/readme.txt"), None);
    }

    #[test]
    fn test_high_only_output_is_warning() {
        let result = parse(&parser(&[]), "LaunchAgent com.example added\n");
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.status(), SecurityStatus::Warning);
    }

    #[test]
    fn test_critical_app_escalation() {
        let p = parser(&["/Applications/Safari.app", "/Library/LaunchAgents/com.corp.*"]);

        let alert = p.parse_line("LoginItem /Applications/Safari.app/Contents/Helper.app").unwrap();
        assert_eq!(alert.category, AlertCategory::LoginItem);
        assert_eq!(alert.priority, AlertPriority::Critical);

        let alert = p.parse_line("LaunchAgent /Library/LaunchAgents/com.corp.vpn.plist").unwrap();
        assert_eq!(alert.priority, AlertPriority::Critical);

        let alert = p.parse_line("LaunchAgent /Library/LaunchAgents/com.other.plist").unwrap();
        assert_eq!(alert.priority, AlertPriority::High);
    }

    #[test]
    fn test_matches_critical_app() {
        assert!(matches_critical_app("/Applications/Safari.app", "/Applications/Safari.app"));
        assert!(matches_critical_app("/Applications/Safari.app/Contents", "/Applications/Safari.app/"));
        assert!(!matches_critical_app("/Applications/Safari.app.bak", "/Applications/Safari.app"));
        assert!(matches_critical_app("/Applications/Zoom.app", "/Applications/*.app"));
        assert!(!matches_critical_app("/Users/me/Zoom.app", "/Applications/*.app"));
    }

    #[test]
    fn test_statistics_are_case_insensitive_counts() {
        let p = parser(&[]);
        let stats = p.statistics("Critical APP found\nLaunchAgent x\nlaunchagent y\nPackage z\nLoginItem\n");
        assert_eq!(stats.total_applications, 1);
        assert_eq!(stats.critical_applications, 1);
        assert_eq!(stats.launch_agents, 2);
        assert_eq!(stats.packages, 1);
        assert_eq!(stats.login_items, 1);
        assert_eq!(stats.launch_daemons, 0);
    }

    #[test]
    fn test_invalid_utf8_is_invalid_output() {
        let p = parser(&[]);
        let err = p.parse(&[0xff, 0xfe, b'\n'], ScanMode::Quick, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ScanError::InvalidOutput(_)));
    }

    #[test]
    fn test_crlf_lines_are_trimmed() {
        let result = parse(&parser(&[]), "LaunchAgent /a/b.plist\r\n");
        assert_eq!(result.alerts[0].message, "LaunchAgent /a/b.plist");
    }
}
