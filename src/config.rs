//! Configuration management
//!
//! Handles TOML configuration parsing, validation, and atomic updates.
//! The configuration lives in the key-value store under `configuration`;
//! a missing or unreadable blob yields the defaults, never a startup failure.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use crate::constants::{
    AUTO_SCAN_INTERVAL_MAX, AUTO_SCAN_INTERVAL_MIN, CONFIGURATION_KEY, DATA_DIR_NAME,
    DEFAULT_AUTO_SCAN_INTERVAL, DEFAULT_INTERPRETER, DEFAULT_MAX_HISTORY_ITEMS,
    DEFAULT_MAX_RECENT_ALERTS, DEFAULT_RETENTION_DAYS, DEFAULT_SCRIPT_NAME,
};
use crate::error::ConfigError;
use crate::models::{AlertCategory, ScanMode};
use crate::store::KeyValueStore;

/// Keys accepted by `config set`, as `section.field`
pub const KNOWN_KEYS: &[&str] = &[
    "scan.mode",
    "scan.auto_scan_enabled",
    "scan.auto_scan_interval_secs",
    "scan.script_path",
    "scan.interpreter",
    "notifications.frequency",
    "notifications.enable_sounds",
    "monitoring.enabled_categories",
    "monitoring.critical_apps",
    "interface.run_as_menu_bar_app",
    "logging.log_max_size_mb",
    "logging.log_rotation_count",
    "history.max_scans",
    "history.max_recent_alerts",
    "history.retention_days",
];

/// Platform data directory for secmonitor (store, scripts, event log)
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(DATA_DIR_NAME)
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfiguration {
    pub scan: ScanSettings,
    pub notifications: NotificationSettings,
    pub monitoring: MonitoringSettings,
    pub interface: InterfaceSettings,
    pub logging: LoggingSettings,
    pub history: HistorySettings,
}

/// Scan scheduling and routine location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub mode: ScanMode,
    pub auto_scan_enabled: bool,
    /// Seconds between periodic scans (60-604800)
    pub auto_scan_interval_secs: u64,
    /// Scan routine; defaults to `<data dir>/scripts/security_scan.sh`
    pub script_path: Option<PathBuf>,
    pub interpreter: PathBuf,
}

/// How often user-visible notifications are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    Immediate,
    Hourly,
    Daily,
    Disabled,
}

impl NotificationFrequency {
    pub fn display_name(&self) -> &'static str {
        match self {
            NotificationFrequency::Immediate => "Immediate",
            NotificationFrequency::Hourly => "Hourly Summary",
            NotificationFrequency::Daily => "Daily Summary",
            NotificationFrequency::Disabled => "Disabled",
        }
    }

    /// Digest window; `None` for immediate delivery and for disabled
    pub fn interval(&self) -> Option<Duration> {
        match self {
            NotificationFrequency::Hourly => Some(Duration::from_secs(3600)),
            NotificationFrequency::Daily => Some(Duration::from_secs(86_400)),
            NotificationFrequency::Immediate | NotificationFrequency::Disabled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub frequency: NotificationFrequency,
    pub enable_sounds: bool,
}

/// What findings matter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Categories that may raise notifications
    pub enabled_categories: BTreeSet<AlertCategory>,
    /// Paths whose findings are always critical (exact, prefix or glob)
    pub critical_apps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    pub run_as_menu_bar_app: bool,
}

/// Event log rotation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_max_size_mb: u64,
    pub log_rotation_count: u32,
}

/// Retention bounds for the scan history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max_scans: usize,
    pub max_recent_alerts: usize,
    pub retention_days: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Normal,
            auto_scan_enabled: true,
            auto_scan_interval_secs: DEFAULT_AUTO_SCAN_INTERVAL,
            script_path: None,
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            frequency: NotificationFrequency::Immediate,
            enable_sounds: true,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled_categories: AlertCategory::ALL.into_iter().collect(),
            critical_apps: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_max_size_mb: 50,
            log_rotation_count: 5,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_scans: DEFAULT_MAX_HISTORY_ITEMS,
            max_recent_alerts: DEFAULT_MAX_RECENT_ALERTS,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl MonitorConfiguration {
    pub fn auto_scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan.auto_scan_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.history.retention_days) * 86_400)
    }

    /// Configured script path, or the default location under `data_dir`
    pub fn script_path(&self, data_dir: &Path) -> PathBuf {
        self.scan
            .script_path
            .clone()
            .unwrap_or_else(|| data_dir.join("scripts").join(DEFAULT_SCRIPT_NAME))
    }

    /// Check bounds and patterns
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.scan.auto_scan_interval_secs;
        if !(AUTO_SCAN_INTERVAL_MIN..=AUTO_SCAN_INTERVAL_MAX).contains(&interval) {
            return Err(ConfigError::InvalidInterval(interval));
        }
        if self.scan.interpreter.as_os_str().is_empty() {
            return Err(invalid("scan.interpreter", "must not be empty"));
        }
        if self.logging.log_max_size_mb == 0 {
            return Err(invalid("logging.log_max_size_mb", "must be at least 1"));
        }
        if self.logging.log_rotation_count == 0 {
            return Err(invalid("logging.log_rotation_count", "must be at least 1"));
        }
        if self.history.max_scans == 0 {
            return Err(invalid("history.max_scans", "must be at least 1"));
        }
        if self.history.max_recent_alerts == 0 {
            return Err(invalid("history.max_recent_alerts", "must be at least 1"));
        }
        if self.history.retention_days == 0 {
            return Err(invalid("history.retention_days", "must be at least 1"));
        }
        for pattern in &self.monitoring.critical_apps {
            if crate::parser::is_glob_pattern(pattern) {
                glob::Pattern::new(pattern).map_err(|e| {
                    invalid("monitoring.critical_apps", &format!("invalid glob pattern '{}': {}", pattern, e))
                })?;
            }
        }
        Ok(())
    }

    /// Apply `section.field=value` updates. All-or-nothing: any bad key or
    /// value rejects the whole batch.
    pub fn with_updates(&self, updates: &[String]) -> Result<Self, ConfigError> {
        let mut document = toml::Value::try_from(self)?;

        for update in updates {
            let (key, raw) = update
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedUpdate(update.clone()))?;
            let key = key.trim();
            if !KNOWN_KEYS.contains(&key) {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
            // KNOWN_KEYS entries always contain a dot
            let (section, field) = key.split_once('.').ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

            let root = document
                .as_table_mut()
                .ok_or_else(|| invalid(key, "configuration is not a table"))?;
            let section_table = root
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                .as_table_mut()
                .ok_or_else(|| invalid(key, "section is not a table"))?;
            section_table.insert(field.to_string(), parse_update_value(raw.trim()));
        }

        let updated: MonitorConfiguration = document
            .try_into()
            .map_err(|e: toml::de::Error| invalid("configuration", e.message()))?;
        updated.validate()?;
        Ok(updated)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfiguration = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Interpret a raw update value as a TOML literal, or as a bare string
fn parse_update_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("v = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

/// Owns the live configuration and saves it after every mutation
pub struct ConfigurationManager {
    store: Arc<dyn KeyValueStore>,
    configuration: RwLock<MonitorConfiguration>,
}

impl ConfigurationManager {
    /// Load from the store; missing or corrupt data yields the defaults
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let configuration = match store.get(CONFIGURATION_KEY) {
            Ok(Some(bytes)) => match String::from_utf8(bytes)
                .map_err(|e| e.to_string())
                .and_then(|text| MonitorConfiguration::from_toml(&text).map_err(|e| e.to_string()))
            {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring unreadable configuration, using defaults: {}", e);
                    MonitorConfiguration::default()
                }
            },
            Ok(None) => MonitorConfiguration::default(),
            Err(e) => {
                warn!("Failed to load configuration, using defaults: {:#}", e);
                MonitorConfiguration::default()
            }
        };

        Self {
            store,
            configuration: RwLock::new(configuration),
        }
    }

    /// Current configuration (cloned)
    pub fn configuration(&self) -> MonitorConfiguration {
        self.configuration.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.read(|c| c.scan.mode)
    }

    pub fn is_auto_scan_enabled(&self) -> bool {
        self.read(|c| c.scan.auto_scan_enabled)
    }

    pub fn auto_scan_interval(&self) -> Duration {
        self.read(|c| c.auto_scan_interval())
    }

    pub fn update_scan_mode(&self, mode: ScanMode) {
        self.mutate(|c| c.scan.mode = mode);
    }

    /// Flip auto-scan and return the new value
    pub fn toggle_auto_scan(&self) -> bool {
        self.mutate(|c| {
            c.scan.auto_scan_enabled = !c.scan.auto_scan_enabled;
            c.scan.auto_scan_enabled
        })
    }

    pub fn update_notification_frequency(&self, frequency: NotificationFrequency) {
        self.mutate(|c| c.notifications.frequency = frequency);
    }

    /// Add a path or glob entry; duplicates are ignored, bad globs rejected
    pub fn add_critical_app(&self, app_path: &str) -> Result<(), ConfigError> {
        if crate::parser::is_glob_pattern(app_path) {
            glob::Pattern::new(app_path).map_err(|e| {
                invalid("monitoring.critical_apps", &format!("invalid glob pattern '{}': {}", app_path, e))
            })?;
        }
        self.mutate(|c| {
            if !c.monitoring.critical_apps.iter().any(|p| p == app_path) {
                c.monitoring.critical_apps.push(app_path.to_string());
            }
        });
        Ok(())
    }

    pub fn remove_critical_app(&self, app_path: &str) {
        self.mutate(|c| c.monitoring.critical_apps.retain(|p| p != app_path));
    }

    /// Apply `section.field=value` updates atomically and save
    pub fn apply_updates(&self, updates: &[String]) -> Result<MonitorConfiguration, ConfigError> {
        let mut guard = self.configuration.write().unwrap_or_else(|e| e.into_inner());
        let updated = guard.with_updates(updates)?;
        *guard = updated.clone();
        drop(guard);

        info!("Configuration updated: {}", updates.join(", "));
        self.save();
        Ok(updated)
    }

    /// Persist the current configuration. Failures are logged and swallowed.
    pub fn save(&self) {
        let config = self.configuration();
        let result = config
            .to_toml()
            .map_err(anyhow::Error::from)
            .and_then(|text| self.store.put(CONFIGURATION_KEY, text.as_bytes()));
        if let Err(e) = result {
            warn!("Failed to save configuration: {:#}", e);
        }
    }

    fn read<T>(&self, f: impl FnOnce(&MonitorConfiguration) -> T) -> T {
        f(&self.configuration.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut MonitorConfiguration) -> T) -> T {
        let value = {
            let mut guard = self.configuration.write().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        };
        self.save();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, ConfigurationManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = ConfigurationManager::load(store.clone());
        (store, manager)
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfiguration::default();
        assert_eq!(config.scan.mode, ScanMode::Normal);
        assert!(config.scan.auto_scan_enabled);
        assert_eq!(config.auto_scan_interval(), Duration::from_secs(1800));
        assert_eq!(config.notifications.frequency, NotificationFrequency::Immediate);
        assert_eq!(config.monitoring.enabled_categories.len(), 8);
        assert_eq!(config.history.max_scans, 100);
        assert_eq!(config.history.max_recent_alerts, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_and_partial_file() {
        let config = MonitorConfiguration::default();
        let text = config.to_toml().unwrap();
        assert_eq!(MonitorConfiguration::from_toml(&text).unwrap(), config);

        let partial = MonitorConfiguration::from_toml("[scan]\nmode = \"quick\"\n").unwrap();
        assert_eq!(partial.scan.mode, ScanMode::Quick);
        assert_eq!(partial.scan.auto_scan_interval_secs, 1800);
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = MonitorConfiguration::default();
        config.scan.auto_scan_interval_secs = 59;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidInterval(59))));
        config.scan.auto_scan_interval_secs = 604_801;
        assert!(config.validate().is_err());
        config.scan.auto_scan_interval_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_corrupt_store_yields_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.put(CONFIGURATION_KEY, b"[scan\nmode = ").unwrap();
        let manager = ConfigurationManager::load(store);
        assert_eq!(manager.configuration(), MonitorConfiguration::default());
    }

    #[test]
    fn test_mutations_are_saved() {
        let (store, manager) = manager();
        manager.update_scan_mode(ScanMode::Full);
        assert!(!manager.toggle_auto_scan());
        manager.add_critical_app("/Applications/Safari.app").unwrap();
        manager.add_critical_app("/Applications/Safari.app").unwrap();
        assert!(manager.add_critical_app("/Applications/[Bad.app").is_err());

        let reloaded = ConfigurationManager::load(store);
        let config = reloaded.configuration();
        assert_eq!(config.scan.mode, ScanMode::Full);
        assert!(!config.scan.auto_scan_enabled);
        assert_eq!(config.monitoring.critical_apps, vec!["/Applications/Safari.app".to_string()]);

        reloaded.remove_critical_app("/Applications/Safari.app");
        assert!(reloaded.configuration().monitoring.critical_apps.is_empty());
    }

    #[test]
    fn test_apply_updates() {
        let (_, manager) = manager();
        let updated = manager
            .apply_updates(&[
                "scan.mode=quick".to_string(),
                "scan.auto_scan_interval_secs=600".to_string(),
                "scan.script_path=/opt/scan/run.sh".to_string(),
                "notifications.frequency=daily".to_string(),
                "monitoring.enabled_categories=[\"application\", \"launch_agent\"]".to_string(),
            ])
            .unwrap();
        assert_eq!(updated.scan.mode, ScanMode::Quick);
        assert_eq!(updated.scan.auto_scan_interval_secs, 600);
        assert_eq!(updated.scan.script_path, Some(PathBuf::from("/opt/scan/run.sh")));
        assert_eq!(updated.notifications.frequency, NotificationFrequency::Daily);
        assert_eq!(updated.monitoring.enabled_categories.len(), 2);
        assert_eq!(manager.configuration(), updated);
    }

    #[test]
    fn test_apply_updates_is_atomic() {
        let (_, manager) = manager();
        let result = manager.apply_updates(&[
            "scan.mode=quick".to_string(),
            "scan.invalid_field=value".to_string(),
        ]);
        assert!(matches!(result, Err(ConfigError::UnknownKey(ref k)) if k == "scan.invalid_field"));
        assert_eq!(manager.scan_mode(), ScanMode::Normal);

        assert!(manager.apply_updates(&["scan.auto_scan_interval_secs=5".to_string()]).is_err());
        assert!(manager.apply_updates(&["scan.mode=fast".to_string()]).is_err());
        assert!(manager.apply_updates(&["scan.mode".to_string()]).is_err());
        assert_eq!(manager.auto_scan_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn test_invalid_critical_app_glob_rejected() {
        let mut config = MonitorConfiguration::default();
        config.monitoring.critical_apps = vec!["/Applications/[abc".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_script_path_under_data_dir() {
        let config = MonitorConfiguration::default();
        assert_eq!(
            config.script_path(Path::new("/data")),
            PathBuf::from("/data/scripts/security_scan.sh")
        );
    }

    #[test]
    fn test_frequency_intervals() {
        assert_eq!(NotificationFrequency::Immediate.interval(), None);
        assert_eq!(NotificationFrequency::Hourly.interval(), Some(Duration::from_secs(3600)));
        assert_eq!(NotificationFrequency::Disabled.interval(), None);
    }
}
