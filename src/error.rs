//! Error types for scan execution and configuration

use std::path::PathBuf;

/// Reasons a scan attempt can fail. All are recoverable by the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    #[error("Scan routine not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Scan routine execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid scan output: {0}")]
    InvalidOutput(String),

    #[error("Permission denied executing scan routine: {}", .0.display())]
    PermissionDenied(PathBuf),
}

impl ScanError {
    /// Actionable hint shown to the user alongside the error
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ScanError::NotFound(_) => {
                "Reinstall the scan routine or point scan.script_path at it (secmonitor config set scan.script_path=...)."
            }
            ScanError::ExecutionFailed(_) => "Check system permissions and try again.",
            ScanError::InvalidOutput(_) => "The scan routine may need to be updated.",
            ScanError::PermissionDenied(_) => {
                "Make the scan routine readable and its interpreter executable, then grant Full Disk Access in System Settings > Privacy & Security."
            }
        }
    }
}

/// Configuration validation and update errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Note: bounds must match AUTO_SCAN_INTERVAL_MIN/MAX in constants.rs
    #[error("Invalid auto-scan interval: {0}. Must be between 60 and 604800 seconds")]
    InvalidInterval(u64),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Malformed update '{0}'. Expected key=value")]
    MalformedUpdate(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
