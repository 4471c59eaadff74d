//! Notification frequency gating
//!
//! Decides which findings of a completed scan become notifications. Only
//! critical alerts in enabled categories are announced individually; the
//! hourly and daily frequencies hold them in a pending digest instead.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use crate::config::{MonitorConfiguration, NotificationFrequency};
use crate::models::{AlertCategory, AlertPriority, ScanResult, SecurityAlert};
use crate::notifier::Notifier;

struct DispatchState {
    frequency: NotificationFrequency,
    enabled_categories: BTreeSet<AlertCategory>,
    pending: Vec<SecurityAlert>,
    last_digest: Option<DateTime<Utc>>,
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    state: Mutex<DispatchState>,
}

impl AlertDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        frequency: NotificationFrequency,
        enabled_categories: BTreeSet<AlertCategory>,
    ) -> Self {
        Self {
            notifier,
            state: Mutex::new(DispatchState {
                frequency,
                enabled_categories,
                pending: Vec::new(),
                last_digest: None,
            }),
        }
    }

    pub fn from_config(notifier: Arc<dyn Notifier>, config: &MonitorConfiguration) -> Self {
        Self::new(
            notifier,
            config.notifications.frequency,
            config.monitoring.enabled_categories.clone(),
        )
    }

    pub fn frequency(&self) -> NotificationFrequency {
        self.lock().frequency
    }

    /// Alerts waiting for the next digest
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Route one completed scan; returns the number of notifications posted
    pub fn dispatch(&self, result: &ScanResult) -> usize {
        self.dispatch_at(result, Utc::now())
    }

    pub fn dispatch_at(&self, result: &ScanResult, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let critical: Vec<&SecurityAlert> = result
            .alerts
            .iter()
            .filter(|a| a.priority == AlertPriority::Critical && state.enabled_categories.contains(&a.category))
            .collect();

        match state.frequency {
            NotificationFrequency::Disabled => 0,
            NotificationFrequency::Immediate => {
                for alert in &critical {
                    self.notifier.send_alert(alert);
                }
                self.notifier.send_scan_summary(result);
                critical.len() + 1
            }
            frequency @ (NotificationFrequency::Hourly | NotificationFrequency::Daily) => {
                let window = frequency
                    .interval()
                    .and_then(|w| chrono::Duration::from_std(w).ok())
                    .unwrap_or_else(|| chrono::Duration::hours(1));
                let newly_pending: Vec<SecurityAlert> = critical.into_iter().cloned().collect();
                state.pending.extend(newly_pending);

                let window_elapsed = state
                    .last_digest
                    .map_or(true, |last| now.signed_duration_since(last) >= window);
                if window_elapsed && !state.pending.is_empty() {
                    let alerts = std::mem::take(&mut state.pending);
                    self.notifier.send_digest(&alerts, frequency);
                    state.last_digest = Some(now);
                    1
                } else {
                    debug!("{} alert(s) held for the next digest", state.pending.len());
                    0
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
