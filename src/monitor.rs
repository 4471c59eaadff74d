//! Scan orchestration
//!
//! `SecurityMonitor` owns the current security status, guarantees that at
//! most one scan is in flight, runs periodic scans, and routes results to
//! the history store and the alert dispatcher. Observers either poll
//! `snapshot()` or subscribe to `MonitorEvent`s.

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use crate::config::{ConfigurationManager, MonitorConfiguration};
use crate::constants::COMPLETION_GRACE;
use crate::dispatch::AlertDispatcher;
use crate::error::ScanError;
use crate::executor::{ScanExecutor, ScriptRoutine};
use crate::history::{self, HistoryLimits, HistoryStore};
use crate::models::{AlertPriority, DashboardStats, ScanMode, ScanResult, SecurityAlert, SecurityStatus};
use crate::notifier::Notifier;
use crate::parser::HeuristicParser;
use crate::progress::{self, ScanProgress, SharedProgress};
use crate::status::SystemStatusProvider;
use crate::store::FileStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle notifications for observers
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    ScanStarted { mode: ScanMode },
    ScanCompleted { result: ScanResult },
    ScanFailed { mode: ScanMode, error: ScanError },
}

/// Point-in-time view for presentation
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub status: SecurityStatus,
    pub is_scanning: bool,
    pub last_scan_date: Option<DateTime<Utc>>,
    pub progress: f64,
    pub current_phase: String,
    #[serde(rename = "eta_secs", with = "crate::models::duration_secs")]
    pub estimated_time_remaining: Duration,
}

struct MonitorState {
    status: SecurityStatus,
    is_scanning: bool,
    last_scan_date: Option<DateTime<Utc>>,
    progress: Option<SharedProgress>,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
    executor: ScanExecutor,
    history: Arc<HistoryStore>,
    config: Arc<ConfigurationManager>,
    dispatcher: Arc<AlertDispatcher>,
    events: broadcast::Sender<MonitorEvent>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    completion_grace: Duration,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let periodic = self.periodic.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = periodic.take() {
            handle.abort();
        }
    }
}

/// Clears the in-flight flag however the scan task ends
struct InFlightGuard(Arc<MonitorInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.0.lock_state();
        state.is_scanning = false;
        if state.status == SecurityStatus::Scanning {
            state.status = SecurityStatus::Unknown;
        }
    }
}

/// The orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SecurityMonitor {
    inner: Arc<MonitorInner>,
}

impl SecurityMonitor {
    pub fn new(
        executor: ScanExecutor,
        history: Arc<HistoryStore>,
        config: Arc<ConfigurationManager>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        let latest = history.latest();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState {
                    status: latest.as_ref().map_or(SecurityStatus::Unknown, |r| r.status()),
                    is_scanning: false,
                    last_scan_date: latest.map(|r| r.timestamp),
                    progress: None,
                }),
                executor,
                history,
                config,
                dispatcher,
                events,
                periodic: Mutex::new(None),
                completion_grace: COMPLETION_GRACE,
            }),
        }
    }

    /// Wire the production services rooted at `data_dir`
    pub fn open(
        data_dir: &Path,
        make_notifier: impl FnOnce(&MonitorConfiguration) -> Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(FileStore::new(data_dir));
        let config = Arc::new(ConfigurationManager::load(store.clone()));
        let settings = config.configuration();

        let history = Arc::new(HistoryStore::load(
            store,
            HistoryLimits::from(&settings.history),
            Arc::new(history::host_uptime),
        ));
        let parser = HeuristicParser::new(
            Arc::new(SystemStatusProvider::new()),
            settings.monitoring.critical_apps.clone(),
        )
        .context("Failed to build output parser")?;
        let routine = ScriptRoutine::new(settings.script_path(data_dir), settings.scan.interpreter.clone());
        let executor = ScanExecutor::new(Arc::new(routine), Arc::new(parser));
        let dispatcher = Arc::new(AlertDispatcher::from_config(make_notifier(&settings), &settings));

        Ok(Self::new(executor, history, config, dispatcher))
    }

    /// Override how long "Scan completed" stays visible
    pub fn with_completion_grace(self, grace: Duration) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.completion_grace = grace;
                Self { inner: Arc::new(inner) }
            }
            Err(inner) => Self { inner },
        }
    }

    /// Start a scan unless one is already running.
    ///
    /// Returns `None` when a scan is in flight. Must be called from within a
    /// tokio runtime.
    pub fn start_scan(&self, mode: ScanMode) -> Option<JoinHandle<Result<ScanResult, ScanError>>> {
        let progress = ScanProgress::shared(mode);
        {
            let mut state = self.inner.lock_state();
            if state.is_scanning {
                debug!("Scan already in progress, ignoring {} scan request", mode);
                return None;
            }
            state.is_scanning = true;
            state.status = SecurityStatus::Scanning;
            state.progress = Some(progress.clone());
        }

        info!("Starting {} scan", mode);
        let _ = self.inner.events.send(MonitorEvent::ScanStarted { mode });

        let inner = self.inner.clone();
        Some(tokio::spawn(async move { MonitorInner::run(inner, mode, progress).await }))
    }

    /// Replace any existing periodic trigger. The first scan fires after one interval.
    /// A zero interval is ignored.
    pub fn schedule_periodic(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("Ignoring periodic scan request with a zero interval");
            return;
        }
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let monitor = SecurityMonitor { inner };
                let mode = monitor.inner.config.scan_mode();
                if monitor.start_scan(mode).is_none() {
                    debug!("Periodic scan skipped, a scan is already running");
                }
            }
        });

        info!("Periodic scanning every {}s", interval.as_secs());
        let previous = self.inner.lock_periodic().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn stop_periodic(&self) {
        if let Some(handle) = self.inner.lock_periodic().take() {
            handle.abort();
            info!("Periodic scanning stopped");
        }
    }

    pub fn is_periodic_active(&self) -> bool {
        self.inner.lock_periodic().is_some()
    }

    /// Flip auto-scan (saved) and start or stop the periodic trigger to match
    pub fn toggle_auto_scan(&self) -> bool {
        let enabled = self.inner.config.toggle_auto_scan();
        if enabled {
            self.schedule_periodic(self.inner.config.auto_scan_interval());
        } else {
            self.stop_periodic();
        }
        enabled
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> SecurityStatus {
        self.inner.lock_state().status
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.lock_state().is_scanning
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.inner.lock_state();
        let (progress, current_phase, eta) = match &state.progress {
            Some(shared) => {
                let tracker = progress::lock(shared);
                (
                    tracker.progress(),
                    tracker.current_phase().to_string(),
                    tracker.estimated_time_remaining(),
                )
            }
            None => (0.0, String::new(), Duration::ZERO),
        };
        MonitorSnapshot {
            status: state.status,
            is_scanning: state.is_scanning,
            last_scan_date: state.last_scan_date,
            progress,
            current_phase,
            estimated_time_remaining: eta,
        }
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        self.inner.history.dashboard_stats()
    }

    pub fn health_score(&self) -> f64 {
        self.dashboard_stats().health_score()
    }

    /// Newest alerts first, at most `limit`
    pub fn recent_alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        let mut alerts = self.inner.history.recent_alerts();
        alerts.truncate(limit);
        alerts
    }

    pub fn recommended_scan_mode(&self) -> ScanMode {
        recommended_scan_mode(&self.recent_alerts(5), &self.dashboard_stats(), Utc::now())
    }

    pub fn next_scan_message(&self) -> String {
        let last = self.inner.lock_state().last_scan_date;
        next_scan_message(
            self.inner.config.is_auto_scan_enabled(),
            last,
            self.inner.config.auto_scan_interval(),
            Utc::now(),
        )
    }

    /// Apply the configured retention horizon; returns removed scan count
    pub fn purge_history(&self) -> usize {
        let retention = self.inner.config.configuration().retention();
        self.inner.history.purge_older_than(retention)
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.inner.history
    }

    pub fn config(&self) -> &Arc<ConfigurationManager> {
        &self.inner.config
    }

    pub fn validate_environment(&self) -> bool {
        self.inner.executor.validate_environment()
    }
}

impl MonitorInner {
    async fn run(
        self: Arc<Self>,
        mode: ScanMode,
        progress: SharedProgress,
    ) -> Result<ScanResult, ScanError> {
        let in_flight = InFlightGuard(self.clone());
        let outcome = self.executor.run_scan(mode, Some(progress.clone())).await;

        let event = match &outcome {
            Ok(result) => {
                {
                    let mut state = self.lock_state();
                    state.status = result.status();
                    state.last_scan_date = Some(result.timestamp);
                }

                // history writes and notification delivery touch the filesystem and spawn processes
                let inner = self.clone();
                let recorded = result.clone();
                let delivered = tokio::task::spawn_blocking(move || {
                    let sent = inner.dispatcher.dispatch(&recorded);
                    inner.history.record(recorded);
                    sent
                })
                .await;
                match delivered {
                    Ok(sent) => debug!("{} notification(s) posted", sent),
                    Err(e) => error!("Failed to record scan result: {}", e),
                }

                info!(
                    "{} scan completed in {:.1}s: {} alert(s), status {}",
                    mode,
                    result.duration.as_secs_f64(),
                    result.alerts.len(),
                    result.status()
                );

                let grace = self.completion_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    progress::lock(&progress).reset();
                });

                MonitorEvent::ScanCompleted { result: result.clone() }
            }
            Err(e) => {
                self.lock_state().status = SecurityStatus::Unknown;
                error!("{} scan failed: {}", mode, e);
                MonitorEvent::ScanFailed { mode, error: e.clone() }
            }
        };

        // observers may start the next scan as soon as they hear about this one
        drop(in_flight);
        let _ = self.events.send(event);
        outcome
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_periodic(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.periodic.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Full after a recent critical finding, normal after a busy week, else quick
pub fn recommended_scan_mode(
    top_alerts: &[SecurityAlert],
    stats: &DashboardStats,
    now: DateTime<Utc>,
) -> ScanMode {
    let recent_critical = top_alerts
        .iter()
        .take(5)
        .any(|a| a.priority == AlertPriority::Critical && a.is_recent(now));
    if recent_critical {
        ScanMode::Full
    } else if stats.alerts_this_week > 10 {
        ScanMode::Normal
    } else {
        ScanMode::Quick
    }
}

pub fn next_scan_message(
    auto_scan_enabled: bool,
    last_scan: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> String {
    if !auto_scan_enabled {
        return "Auto-scan disabled".to_string();
    }
    let Some(last_scan) = last_scan else {
        return "No previous scan".to_string();
    };
    let interval = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
    let remaining = (last_scan + interval).signed_duration_since(now);
    if remaining <= chrono::Duration::zero() {
        return "Scan due now".to_string();
    }

    let minutes = remaining.num_minutes();
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("Next scan in {}h {}m", hours, minutes)
    } else {
        format!("Next scan in {}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RoutineOutput, RunningScan, ScanRoutine};
    use crate::history::HistoryLimits;
    use crate::models::AlertCategory;
    use crate::notifier::MemoryNotifier;
    use crate::parser::HeuristicParser;
    use crate::status::StaticStatusProvider;
    use crate::store::{KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use uuid::Uuid;

    /// Routine returning fixed output, optionally held until released
    struct FixedRoutine {
        output: RoutineOutput,
        gate: Option<Arc<Notify>>,
        starts: Arc<AtomicUsize>,
    }

    struct FixedRun {
        output: RoutineOutput,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ScanRoutine for FixedRoutine {
        async fn start(&self, _mode: ScanMode) -> Result<Box<dyn RunningScan>, ScanError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedRun {
                output: self.output.clone(),
                gate: self.gate.clone(),
            }))
        }

        fn validate_environment(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl RunningScan for FixedRun {
        async fn wait(self: Box<Self>) -> Result<RoutineOutput, ScanError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.output)
        }
    }

    struct Fixture {
        monitor: SecurityMonitor,
        notifier: Arc<MemoryNotifier>,
        store: Arc<MemoryStore>,
    }

    fn output(stdout: &str, exit_code: i32, stderr: &str) -> RoutineOutput {
        RoutineOutput {
            exit_code: Some(exit_code),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn fixture_with_store(store: Arc<MemoryStore>, routine: FixedRoutine) -> Fixture {
        let config = Arc::new(ConfigurationManager::load(store.clone()));
        let history = Arc::new(HistoryStore::load(
            store.clone(),
            HistoryLimits::default(),
            Arc::new(|| Duration::from_secs(3600)),
        ));
        let notifier = Arc::new(MemoryNotifier::new(true));
        let dispatcher = Arc::new(AlertDispatcher::from_config(notifier.clone(), &config.configuration()));
        let parser = HeuristicParser::new(Arc::new(StaticStatusProvider::default()), Vec::new()).unwrap();
        let executor = ScanExecutor::new(Arc::new(routine), Arc::new(parser));
        let monitor = SecurityMonitor::new(executor, history, config, dispatcher)
            .with_completion_grace(Duration::from_millis(10));
        Fixture { monitor, notifier, store }
    }

    fn fixture(routine: FixedRoutine) -> Fixture {
        fixture_with_store(Arc::new(MemoryStore::new()), routine)
    }

    const TWO_ALERTS: &str = "CRITICAL: new app /Applications/Evil.app\nLaunchAgent /Library/LaunchAgents/com.x.plist added\n";

    #[tokio::test]
    async fn test_end_to_end_critical_scan() {
        let f = fixture(FixedRoutine { output: output(TWO_ALERTS, 0, ""), gate: None, starts: Default::default() });
        assert_eq!(f.monitor.status(), SecurityStatus::Unknown);

        let result = f.monitor.start_scan(ScanMode::Quick).unwrap().await.unwrap().unwrap();
        assert_eq!(result.alerts.len(), 2);
        assert_eq!(f.monitor.status(), SecurityStatus::Critical);
        assert!(!f.monitor.is_scanning());
        assert_eq!(f.monitor.history().len(), 1);
        assert_eq!(f.monitor.snapshot().last_scan_date, Some(result.timestamp));

        // one critical alert plus one summary
        let delivered = f.notifier.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].subtitle.as_deref(), Some("Critical Application Change"));
        assert_eq!(delivered[1].title, "Security Scan Complete");
    }

    #[tokio::test]
    async fn test_start_scan_is_idempotent_while_running() {
        let gate = Arc::new(Notify::new());
        let starts = Arc::new(AtomicUsize::new(0));
        let f = fixture(FixedRoutine {
            output: output("", 0, ""),
            gate: Some(gate.clone()),
            starts: starts.clone(),
        });

        let handle = f.monitor.start_scan(ScanMode::Normal).unwrap();
        assert!(f.monitor.is_scanning());
        assert_eq!(f.monitor.status(), SecurityStatus::Scanning);

        for _ in 0..5 {
            assert!(f.monitor.start_scan(ScanMode::Full).is_none());
        }
        let racers: Vec<_> = (0..5)
            .map(|_| {
                let monitor = f.monitor.clone();
                tokio::spawn(async move { monitor.start_scan(ScanMode::Quick).is_none() })
            })
            .collect();
        for racer in racers {
            assert!(racer.await.unwrap());
        }

        gate.notify_one();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.mode, ScanMode::Normal);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(f.monitor.history().len(), 1);
        assert_eq!(f.monitor.status(), SecurityStatus::Secure);

        gate.notify_one();
        let again = f.monitor.start_scan(ScanMode::Quick).unwrap();
        again.await.unwrap().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(f.monitor.history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_scan_sets_unknown_and_skips_history() {
        let f = fixture(FixedRoutine { output: output("", 1, "permission denied"), gate: None, starts: Default::default() });
        let mut events = f.monitor.subscribe();

        let err = f.monitor.start_scan(ScanMode::Quick).unwrap().await.unwrap().unwrap_err();
        assert!(matches!(err, ScanError::ExecutionFailed(ref m) if m == "permission denied"));
        assert_eq!(f.monitor.status(), SecurityStatus::Unknown);
        assert!(!f.monitor.is_scanning());
        assert!(f.monitor.history().is_empty());
        assert!(f.notifier.delivered().is_empty());

        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::ScanStarted { mode: ScanMode::Quick }));
        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::ScanFailed { .. }));
    }

    #[tokio::test]
    async fn test_progress_resets_after_grace() {
        let f = fixture(FixedRoutine { output: output("", 0, ""), gate: None, starts: Default::default() });
        f.monitor.start_scan(ScanMode::Quick).unwrap().await.unwrap().unwrap();
        assert_eq!(f.monitor.snapshot().current_phase, crate::progress::COMPLETED_LABEL);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = f.monitor.snapshot();
        assert!(snapshot.current_phase.is_empty());
        assert_eq!(snapshot.progress, 0.0);
    }

    #[tokio::test]
    async fn test_initial_status_from_history() {
        let store = Arc::new(MemoryStore::new());
        {
            let f = fixture_with_store(store.clone(), FixedRoutine { output: output("LaunchAgent added\n", 0, ""), gate: None, starts: Default::default() });
            f.monitor.start_scan(ScanMode::Quick).unwrap().await.unwrap().unwrap();
        }
        let f = fixture_with_store(store, FixedRoutine { output: output("", 0, ""), gate: None, starts: Default::default() });
        assert_eq!(f.monitor.status(), SecurityStatus::Warning);
        assert!(f.monitor.snapshot().last_scan_date.is_some());
        assert!(f.store.get(crate::constants::SCAN_HISTORY_KEY).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_scan_fires_after_interval() {
        let f = fixture(FixedRoutine { output: output("", 0, ""), gate: None, starts: Default::default() });
        let mut events = f.monitor.subscribe();
        f.monitor.schedule_periodic(Duration::from_secs(60));
        assert!(f.monitor.is_periodic_active());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(f.monitor.history().is_empty());

        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::ScanStarted { mode: ScanMode::Normal }));
        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::ScanCompleted { .. }));
        assert_eq!(f.monitor.history().len(), 1);

        f.monitor.stop_periodic();
        assert!(!f.monitor.is_periodic_active());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(f.monitor.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_ignored() {
        let f = fixture(FixedRoutine { output: output("", 0, ""), gate: None, starts: Default::default() });
        f.monitor.schedule_periodic(Duration::ZERO);
        assert!(!f.monitor.is_periodic_active());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(f.monitor.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_auto_scan_controls_periodic_trigger() {
        let f = fixture(FixedRoutine { output: output("", 0, ""), gate: None, starts: Default::default() });
        // default is enabled; first toggle disables
        assert!(!f.monitor.toggle_auto_scan());
        assert!(!f.monitor.is_periodic_active());
        assert!(!f.monitor.config().is_auto_scan_enabled());

        assert!(f.monitor.toggle_auto_scan());
        assert!(f.monitor.is_periodic_active());
    }

    fn alert_at(priority: AlertPriority, timestamp: DateTime<Utc>) -> SecurityAlert {
        SecurityAlert {
            id: Uuid::new_v4(),
            timestamp,
            priority,
            category: AlertCategory::Application,
            title: String::new(),
            message: String::new(),
            details: None,
            affected_path: None,
            recommended_action: None,
        }
    }

    fn stats(week: usize) -> DashboardStats {
        DashboardStats {
            total_scans: 1,
            last_scan_date: None,
            average_scan_time: Duration::ZERO,
            alerts_this_week: week,
            critical_alerts_this_week: 0,
            system_uptime: Duration::ZERO,
            monitoring_days: 1,
        }
    }

    #[test]
    fn test_recommended_scan_mode() {
        let now = Utc::now();
        let fresh = vec![alert_at(AlertPriority::Critical, now - chrono::Duration::minutes(5))];
        assert_eq!(recommended_scan_mode(&fresh, &stats(0), now), ScanMode::Full);

        let stale = vec![alert_at(AlertPriority::Critical, now - chrono::Duration::hours(3))];
        assert_eq!(recommended_scan_mode(&stale, &stats(11), now), ScanMode::Normal);
        assert_eq!(recommended_scan_mode(&stale, &stats(10), now), ScanMode::Quick);
    }

    #[test]
    fn test_next_scan_message() {
        let now = Utc::now();
        let interval = Duration::from_secs(1800);
        assert_eq!(next_scan_message(false, Some(now), interval, now), "Auto-scan disabled");
        assert_eq!(next_scan_message(true, None, interval, now), "No previous scan");
        assert_eq!(
            next_scan_message(true, Some(now - chrono::Duration::hours(1)), interval, now),
            "Scan due now"
        );
        assert_eq!(
            next_scan_message(true, Some(now - chrono::Duration::minutes(10)), interval, now),
            "Next scan in 20m"
        );
        assert_eq!(
            next_scan_message(true, Some(now), Duration::from_secs(2 * 3600 + 300), now),
            "Next scan in 2h 5m"
        );
    }
}
