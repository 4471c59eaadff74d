//! User-visible notifications
//!
//! Rendering is pure (`render_*`), delivery is behind the `Notifier` trait.
//! `DesktopNotifier` posts through `osascript` on macOS, `LogNotifier`
//! writes to the log facade, `MemoryNotifier` keeps what it was given.

use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use crate::config::NotificationFrequency;
use crate::models::{AlertPriority, ScanResult, SecurityAlert, SecurityStatus};

const OSASCRIPT: &str = "/usr/bin/osascript";

/// Alert sound class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSound {
    Default,
    Critical,
}

impl NotificationSound {
    /// macOS system sound name
    pub fn sound_name(&self) -> &'static str {
        match self {
            NotificationSound::Default => "Glass",
            NotificationSound::Critical => "Sosumi",
        }
    }
}

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub identifier: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<NotificationSound>,
}

pub fn render_alert(alert: &SecurityAlert) -> Notification {
    let sound = match alert.priority {
        AlertPriority::Critical => Some(NotificationSound::Critical),
        AlertPriority::High => Some(NotificationSound::Default),
        AlertPriority::Medium | AlertPriority::Low => None,
    };
    Notification {
        identifier: alert.id.to_string(),
        title: "Security Alert".to_string(),
        subtitle: Some(alert.title.clone()),
        body: alert.message.clone(),
        sound,
    }
}

pub fn render_scan_summary(result: &ScanResult) -> Notification {
    let count = result.alerts.len();
    let (body, sound) = match result.status() {
        SecurityStatus::Secure => ("No security issues detected".to_string(), None),
        SecurityStatus::Warning => (format!("{} warning(s) detected", count), Some(NotificationSound::Default)),
        SecurityStatus::Critical => (format!("{} critical issue(s) found!", count), Some(NotificationSound::Critical)),
        SecurityStatus::Scanning | SecurityStatus::Unknown => ("Scan completed".to_string(), None),
    };
    Notification {
        identifier: format!("scan_complete_{}", result.id),
        title: "Security Scan Complete".to_string(),
        subtitle: None,
        body,
        sound,
    }
}

/// One notification summarising critical alerts held back by a digest window
pub fn render_digest(alerts: &[SecurityAlert], frequency: NotificationFrequency) -> Notification {
    let title = match frequency {
        NotificationFrequency::Daily => "Daily Security Summary",
        _ => "Hourly Security Summary",
    };
    let mut titles: Vec<&str> = Vec::new();
    for alert in alerts {
        if !titles.contains(&alert.title.as_str()) {
            titles.push(&alert.title);
        }
    }
    let body = if alerts.is_empty() {
        "No critical issues since the last summary".to_string()
    } else {
        format!("{} critical issue(s): {}", alerts.len(), titles.join(", "))
    };
    Notification {
        identifier: format!("digest_{}", chrono::Utc::now().timestamp()),
        title: title.to_string(),
        subtitle: None,
        body,
        sound: (!alerts.is_empty()).then_some(NotificationSound::Critical),
    }
}

/// Notification sink
pub trait Notifier: Send + Sync {
    /// Whether the sink may currently post
    fn permission_granted(&self) -> bool;

    fn sounds_enabled(&self) -> bool {
        true
    }

    fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;

    fn send_alert(&self, alert: &SecurityAlert) {
        self.post(render_alert(alert));
    }

    fn send_scan_summary(&self, result: &ScanResult) {
        self.post(render_scan_summary(result));
    }

    fn send_digest(&self, alerts: &[SecurityAlert], frequency: NotificationFrequency) {
        self.post(render_digest(alerts, frequency));
    }

    /// Deliver if permitted, dropping the sound when sounds are off
    fn post(&self, mut notification: Notification) {
        if !self.permission_granted() {
            return;
        }
        if !self.sounds_enabled() {
            notification.sound = None;
        }
        if let Err(e) = self.deliver(&notification) {
            warn!("Failed to send notification '{}': {:#}", notification.title, e);
        }
    }
}

/// Posts macOS user notifications through `osascript`
pub struct DesktopNotifier {
    sounds: bool,
    permission: bool,
}

impl DesktopNotifier {
    pub fn new(sounds: bool) -> Self {
        Self {
            sounds,
            permission: Path::new(OSASCRIPT).exists(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn permission_granted(&self) -> bool {
        self.permission
    }

    fn sounds_enabled(&self) -> bool {
        self.sounds
    }

    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let status = Command::new(OSASCRIPT)
            .arg("-e")
            .arg(apple_script(notification))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            anyhow::bail!("osascript exited with {}", status);
        }
        Ok(())
    }
}

fn apple_script(notification: &Notification) -> String {
    let mut script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape(&notification.body),
        escape(&notification.title)
    );
    if let Some(subtitle) = &notification.subtitle {
        script.push_str(&format!(" subtitle \"{}\"", escape(subtitle)));
    }
    if let Some(sound) = notification.sound {
        script.push_str(&format!(" sound name \"{}\"", sound.sound_name()));
    }
    script
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Desktop notifications when the host can post them, the log otherwise
pub fn system_notifier(sounds: bool) -> Arc<dyn Notifier> {
    let desktop = DesktopNotifier::new(sounds);
    if desktop.permission_granted() {
        Arc::new(desktop)
    } else {
        Arc::new(LogNotifier)
    }
}

/// Writes notifications to the log; always permitted
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn permission_granted(&self) -> bool {
        true
    }

    fn sounds_enabled(&self) -> bool {
        false
    }

    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        match &notification.subtitle {
            Some(subtitle) => info!("{}: {} - {}", notification.title, subtitle, notification.body),
            None => info!("{}: {}", notification.title, notification.body),
        }
        Ok(())
    }
}

/// Collects delivered notifications in memory
#[derive(Debug)]
pub struct MemoryNotifier {
    sounds: bool,
    permission: AtomicBool,
    delivered: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new(sounds: bool) -> Self {
        Self {
            sounds,
            permission: AtomicBool::new(true),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn permission_granted(&self) -> bool {
        self.permission.load(Ordering::Relaxed)
    }

    fn sounds_enabled(&self) -> bool {
        self.sounds
    }

    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
