//! Bounded scan history with derived dashboard statistics
//!
//! Results are kept newest-first. Recent alerts are a projection of the
//! retained results, newest-first and capped separately. The whole history
//! is persisted as one JSON array under the `scan_history` key after every
//! change; loading is best-effort.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use crate::config::HistorySettings;
use crate::constants::SCAN_HISTORY_KEY;
use crate::models::{AlertPriority, DashboardStats, ScanResult, SecurityAlert};
use crate::store::KeyValueStore;

/// Source of host uptime for the dashboard
pub type UptimeSource = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Uptime of the running host
pub fn host_uptime() -> Duration {
    Duration::from_secs(sysinfo::System::uptime())
}

/// Retention caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_scans: usize,
    pub max_recent_alerts: usize,
}

impl From<&HistorySettings> for HistoryLimits {
    fn from(settings: &HistorySettings) -> Self {
        Self {
            max_scans: settings.max_scans,
            max_recent_alerts: settings.max_recent_alerts,
        }
    }
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self::from(&HistorySettings::default())
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    scans: Vec<ScanResult>,
    recent_alerts: Vec<SecurityAlert>,
}

pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    limits: HistoryLimits,
    uptime: UptimeSource,
    state: RwLock<HistoryState>,
}

impl HistoryStore {
    /// Load persisted history; missing or corrupt data starts empty
    pub fn load(store: Arc<dyn KeyValueStore>, limits: HistoryLimits, uptime: UptimeSource) -> Self {
        let mut scans: Vec<ScanResult> = match store.get(SCAN_HISTORY_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring unreadable scan history: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to load scan history: {:#}", e);
                Vec::new()
            }
        };
        scans.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        scans.truncate(limits.max_scans);

        let mut recent_alerts: Vec<SecurityAlert> =
            scans.iter().flat_map(|scan| scan.alerts.iter().cloned()).collect();
        sort_and_cap(&mut recent_alerts, limits.max_recent_alerts);

        debug!("Loaded {} scan results from history", scans.len());
        Self {
            store,
            limits,
            uptime,
            state: RwLock::new(HistoryState { scans, recent_alerts }),
        }
    }

    /// Insert a completed scan at the head and persist
    pub fn record(&self, result: ScanResult) {
        let mut state = self.write();
        let mut alerts = result.alerts.clone();
        alerts.append(&mut state.recent_alerts);
        sort_and_cap(&mut alerts, self.limits.max_recent_alerts);
        state.recent_alerts = alerts;

        state.scans.insert(0, result);
        state.scans.truncate(self.limits.max_scans);
        self.persist(&state.scans);
    }

    /// Drop results and alerts older than `horizon`; returns removed scan count
    pub fn purge_older_than(&self, horizon: Duration) -> usize {
        self.purge_older_than_at(horizon, Utc::now())
    }

    pub fn purge_older_than_at(&self, horizon: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(horizon)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
        else {
            return 0;
        };

        let mut state = self.write();
        let before = state.scans.len();
        let alerts_before = state.recent_alerts.len();
        state.scans.retain(|scan| scan.timestamp >= cutoff);
        state.recent_alerts.retain(|alert| alert.timestamp >= cutoff);

        let removed = before - state.scans.len();
        if removed > 0 || alerts_before != state.recent_alerts.len() {
            self.persist(&state.scans);
        }
        removed
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        self.dashboard_stats_at(Utc::now())
    }

    pub fn dashboard_stats_at(&self, now: DateTime<Utc>) -> DashboardStats {
        let state = self.read();
        let total_scans = state.scans.len();

        let average_scan_time = if total_scans == 0 {
            Duration::ZERO
        } else {
            let total: f64 = state.scans.iter().map(|s| s.duration.as_secs_f64()).sum();
            Duration::try_from_secs_f64(total / total_scans as f64).unwrap_or(Duration::MAX)
        };

        let week_ago = now - chrono::Duration::days(7);
        let this_week: Vec<&SecurityAlert> = state
            .recent_alerts
            .iter()
            .filter(|alert| alert.timestamp >= week_ago)
            .collect();

        let monitoring_days = state
            .scans
            .iter()
            .map(|s| s.timestamp)
            .min()
            .map(|oldest| now.signed_duration_since(oldest).num_days().max(1))
            .unwrap_or(0);

        DashboardStats {
            total_scans,
            last_scan_date: state.scans.iter().map(|s| s.timestamp).max(),
            average_scan_time,
            alerts_this_week: this_week.len(),
            critical_alerts_this_week: this_week
                .iter()
                .filter(|a| a.priority == AlertPriority::Critical)
                .count(),
            system_uptime: (self.uptime)(),
            monitoring_days,
        }
    }

    /// Retained results, newest first
    pub fn scan_history(&self) -> Vec<ScanResult> {
        self.read().scans.clone()
    }

    /// Recent alerts, newest first
    pub fn recent_alerts(&self) -> Vec<SecurityAlert> {
        self.read().recent_alerts.clone()
    }

    pub fn latest(&self) -> Option<ScanResult> {
        self.read().scans.first().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().scans.is_empty()
    }

    fn persist(&self, scans: &[ScanResult]) {
        let result = serde_json::to_vec(scans)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.store.put(SCAN_HISTORY_KEY, &bytes));
        if let Err(e) = result {
            warn!("Failed to save scan history: {:#}", e);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HistoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HistoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn sort_and_cap(alerts: &mut Vec<SecurityAlert>, cap: usize) {
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    alerts.truncate(cap);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCategory, ScanMode, ScanStatistics, SystemSnapshot};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn fixed_uptime() -> UptimeSource {
        Arc::new(|| Duration::from_secs(90_000))
    }

    fn history(store: Arc<MemoryStore>) -> HistoryStore {
        HistoryStore::load(store, HistoryLimits::default(), fixed_uptime())
    }

    fn alert_at(timestamp: DateTime<Utc>, priority: AlertPriority) -> SecurityAlert {
        SecurityAlert {
            id: Uuid::new_v4(),
            timestamp,
            priority,
            category: AlertCategory::LaunchAgent,
            title: "Launch Agent Change".to_string(),
            message: "LaunchAgent added".to_string(),
            details: None,
            affected_path: None,
            recommended_action: None,
        }
    }

    fn scan_at(timestamp: DateTime<Utc>, secs: u64, alerts: Vec<SecurityAlert>) -> ScanResult {
        ScanResult {
            id: Uuid::new_v4(),
            timestamp,
            mode: ScanMode::Normal,
            duration: Duration::from_secs(secs),
            alerts,
            statistics: ScanStatistics::default(),
            system_snapshot: SystemSnapshot {
                os_version: "14.5".to_string(),
                system_integrity_protection: true,
                gatekeeper: true,
                firewall: true,
                automatic_updates: true,
                timestamp,
            },
        }
    }

    #[test]
    fn test_empty_dashboard() {
        let history = history(Arc::new(MemoryStore::new()));
        let stats = history.dashboard_stats();
        assert_eq!(stats.total_scans, 0);
        assert_eq!(stats.last_scan_date, None);
        assert_eq!(stats.average_scan_time, Duration::ZERO);
        assert_eq!(stats.alerts_this_week, 0);
        assert_eq!(stats.monitoring_days, 0);
        assert_eq!(stats.system_uptime, Duration::from_secs(90_000));
        assert_eq!(stats.health_score(), 1.0);
    }

    #[test]
    fn test_scan_retention_cap() {
        let history = history(Arc::new(MemoryStore::new()));
        let base = Utc::now();
        let mut newest = None;
        for i in 0..105 {
            let scan = scan_at(base + chrono::Duration::seconds(i), 1, vec![]);
            newest = Some(scan.id);
            history.record(scan);
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.latest().map(|s| s.id), newest);
    }

    #[test]
    fn test_recent_alerts_cap_and_order() {
        let history = history(Arc::new(MemoryStore::new()));
        let base = Utc::now() - chrono::Duration::hours(2);
        for i in 0..6 {
            let t = base + chrono::Duration::minutes(i * 10);
            let alerts = (0..10).map(|j| alert_at(t + chrono::Duration::seconds(j), AlertPriority::High)).collect();
            history.record(scan_at(t, 1, alerts));
        }
        let alerts = history.recent_alerts();
        assert_eq!(alerts.len(), 50);
        assert!(alerts.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        // the oldest scan's alerts were evicted
        assert!(alerts.iter().all(|a| a.timestamp >= base + chrono::Duration::minutes(10)));
    }

    #[test]
    fn test_dashboard_values() {
        let history = history(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        history.record(scan_at(now - chrono::Duration::days(10), 100, vec![alert_at(now - chrono::Duration::days(10), AlertPriority::Critical)]));
        history.record(scan_at(now - chrono::Duration::days(1), 200, vec![
            alert_at(now - chrono::Duration::days(1), AlertPriority::Critical),
            alert_at(now - chrono::Duration::days(1), AlertPriority::Low),
        ]));

        let stats = history.dashboard_stats_at(now);
        assert_eq!(stats.total_scans, 2);
        assert_eq!(stats.last_scan_date, Some(now - chrono::Duration::days(1)));
        assert_eq!(stats.average_scan_time, Duration::from_secs(150));
        assert_eq!(stats.alerts_this_week, 2);
        assert_eq!(stats.critical_alerts_this_week, 1);
        assert_eq!(stats.monitoring_days, 10);
        assert!((stats.health_score() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_monitoring_days_at_least_one() {
        let history = history(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        history.record(scan_at(now - chrono::Duration::minutes(5), 1, vec![]));
        assert_eq!(history.dashboard_stats_at(now).monitoring_days, 1);
    }

    #[test]
    fn test_purge_removes_old_entries() {
        let history = history(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        history.record(scan_at(now - chrono::Duration::days(40), 1, vec![alert_at(now - chrono::Duration::days(40), AlertPriority::High)]));
        history.record(scan_at(now - chrono::Duration::days(2), 1, vec![alert_at(now - chrono::Duration::days(2), AlertPriority::High)]));

        let removed = history.purge_older_than_at(Duration::from_secs(30 * 86_400), now);
        assert_eq!(removed, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.recent_alerts().len(), 1);
    }

    #[test]
    fn test_purge_can_empty_history() {
        let history = history(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        history.record(scan_at(now - chrono::Duration::days(5), 1, vec![]));
        assert_eq!(history.purge_older_than_at(Duration::from_secs(86_400), now), 1);
        assert!(history.is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        {
            let history = history(store.clone());
            history.record(scan_at(now, 7, vec![alert_at(now, AlertPriority::Critical)]));
        }
        let reloaded = history(store);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.recent_alerts().len(), 1);
        assert_eq!(reloaded.latest().map(|s| s.duration), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_corrupt_history_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.put(SCAN_HISTORY_KEY, b"{not json").unwrap();
        assert!(history(store).is_empty());
    }

    fn stored_with_duration(store: &MemoryStore, secs: &[&str]) {
        let scans: Vec<String> = secs
            .iter()
            .map(|secs| {
                let json = serde_json::to_string(&scan_at(Utc::now(), 1, vec![])).unwrap();
                json.replace("\"duration_secs\":1.0", &format!("\"duration_secs\":{}", secs))
            })
            .collect();
        store.put(SCAN_HISTORY_KEY, format!("[{}]", scans.join(",")).as_bytes()).unwrap();
    }

    #[test]
    fn test_out_of_range_duration_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        stored_with_duration(&store, &["1e30"]);
        assert!(history(store.clone()).is_empty());

        stored_with_duration(&store, &["-5.0"]);
        assert!(history(store).is_empty());
    }

    #[test]
    fn test_average_of_huge_durations_saturates() {
        let store = Arc::new(MemoryStore::new());
        stored_with_duration(&store, &["1e19", "1e19"]);
        let history = history(store);
        assert_eq!(history.len(), 2);

        let stats = history.dashboard_stats();
        assert_eq!(stats.total_scans, 2);
        assert!(stats.average_scan_time >= Duration::from_secs(9_000_000_000_000_000_000));
    }
}
