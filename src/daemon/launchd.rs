//! macOS LaunchD integration for the per-user agent
//!
//! Handles plist generation, agent installation, and lifecycle management.
//! The agent runs `secmonitor --data-dir <dir> daemon run` in the foreground
//! and launchd keeps it alive.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use crate::constants::{DAEMON_RUN_SUBCOMMAND, DAEMON_SUBCOMMAND, LAUNCHD_PLIST_NAME, LAUNCHD_SERVICE_NAME};

/// LaunchAgent property list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchAgentPlist {
    /// Service label (reverse DNS format)
    pub label: String,
    pub program_arguments: Vec<String>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub process_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_out_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_error_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub environment_variables: BTreeMap<String, String>,
}

impl LaunchAgentPlist {
    pub fn new(executable: &Path, data_dir: &Path) -> Self {
        let log_path = data_dir.join("daemon.out.log");
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin:/usr/sbin:/sbin".to_string());

        Self {
            label: LAUNCHD_SERVICE_NAME.to_string(),
            program_arguments: vec![
                executable.to_string_lossy().to_string(),
                "--data-dir".to_string(),
                data_dir.to_string_lossy().to_string(),
                DAEMON_SUBCOMMAND.to_string(),
                DAEMON_RUN_SUBCOMMAND.to_string(),
            ],
            run_at_load: true,
            keep_alive: true,
            process_type: "Background".to_string(),
            working_directory: Some(data_dir.to_path_buf()),
            standard_out_path: Some(log_path.clone()),
            standard_error_path: Some(log_path),
            environment_variables: env,
        }
    }

    /// Generate plist XML content
    pub fn to_xml(&self) -> Result<String> {
        let mut buffer = Vec::new();
        plist::to_writer_xml(&mut buffer, self).context("Failed to serialize LaunchAgent plist")?;
        String::from_utf8(buffer).context("LaunchAgent plist is not valid UTF-8")
    }

    /// Write the plist into `~/Library/LaunchAgents` and load it
    pub fn install(&self) -> Result<PathBuf> {
        let plist_path = plist_path()?;
        if let Some(parent) = plist_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if let Some(dir) = &self.working_directory {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        plist::to_file_xml(&plist_path, self)
            .with_context(|| format!("Failed to write plist file: {}", plist_path.display()))?;
        launchctl(&["load", "-w"], &plist_path)?;
        Ok(plist_path)
    }
}

/// `~/Library/LaunchAgents/com.secmonitor.agent.plist`
pub fn plist_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join("Library").join("LaunchAgents").join(LAUNCHD_PLIST_NAME))
}

pub fn is_installed() -> bool {
    plist_path().map(|p| p.exists()).unwrap_or(false)
}

/// Unload the agent and remove its plist. Returns false when nothing was installed.
pub fn uninstall() -> Result<bool> {
    let plist_path = plist_path()?;
    if !plist_path.exists() {
        return Ok(false);
    }
    if let Err(e) = launchctl(&["unload", "-w"], &plist_path) {
        log::warn!("{:#}", e);
    }
    std::fs::remove_file(&plist_path)
        .with_context(|| format!("Failed to remove {}", plist_path.display()))?;
    Ok(true)
}

fn launchctl(args: &[&str], plist_path: &Path) -> Result<()> {
    let output = Command::new("launchctl")
        .args(args)
        .arg(plist_path)
        .output()
        .with_context(|| format!("Failed to execute launchctl {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("launchctl {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plist_runs_daemon_in_foreground() {
        let plist = LaunchAgentPlist::new(Path::new("/usr/local/bin/secmonitor"), Path::new("/tmp/secmonitor"));
        assert_eq!(plist.label, "com.secmonitor.agent");
        assert_eq!(
            plist.program_arguments,
            vec!["/usr/local/bin/secmonitor", "--data-dir", "/tmp/secmonitor", "daemon", "run"]
        );
    }

    #[test]
    fn test_plist_xml_roundtrip() {
        let plist = LaunchAgentPlist::new(Path::new("/usr/local/bin/secmonitor"), Path::new("/tmp/secmonitor"));
        let xml = plist.to_xml().unwrap();
        assert!(xml.contains("<key>Label</key>"));
        assert!(xml.contains("<key>ProgramArguments</key>"));
        assert!(xml.contains("<key>RunAtLoad</key>"));

        let parsed: LaunchAgentPlist = plist::from_bytes(xml.as_bytes()).unwrap();
        assert_eq!(parsed, plist);
    }

    #[test]
    fn test_plist_path_is_per_user() {
        let path = plist_path().unwrap();
        assert!(path.ends_with("Library/LaunchAgents/com.secmonitor.agent.plist"));
    }
}
