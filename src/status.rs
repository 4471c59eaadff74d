//! Host security setting providers
//!
//! Each query shells out to the platform tool that reports the setting and
//! degrades to `false`/empty on any failure, so a missing tool never fails a
//! scan.

use chrono::Utc;
use std::path::Path;
use std::process::{Command, Stdio};
use crate::models::SystemSnapshot;

const CSRUTIL: &str = "/usr/bin/csrutil";
const SPCTL: &str = "/usr/sbin/spctl";
const SOCKETFILTERFW: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";
const DEFAULTS: &str = "/usr/bin/defaults";
const SOFTWARE_UPDATE_PLIST: &str = "/Library/Preferences/com.apple.SoftwareUpdate.plist";
const AUTOMATIC_CHECK_KEY: &str = "AutomaticCheckEnabled";

/// Source of the coarse OS settings recorded with every scan
pub trait StatusProvider: Send + Sync {
    fn os_version(&self) -> String;
    fn sip_enabled(&self) -> bool;
    fn gatekeeper_enabled(&self) -> bool;
    fn firewall_enabled(&self) -> bool;
    fn automatic_updates_enabled(&self) -> bool;

    /// Query every provider once
    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            os_version: self.os_version(),
            system_integrity_protection: self.sip_enabled(),
            gatekeeper: self.gatekeeper_enabled(),
            firewall: self.firewall_enabled(),
            automatic_updates: self.automatic_updates_enabled(),
            timestamp: Utc::now(),
        }
    }
}

/// Queries the running macOS host
#[derive(Debug, Clone, Default)]
pub struct SystemStatusProvider;

impl SystemStatusProvider {
    pub fn new() -> Self {
        Self
    }
}

impl StatusProvider for SystemStatusProvider {
    fn os_version(&self) -> String {
        sysinfo::System::os_version().unwrap_or_default()
    }

    fn sip_enabled(&self) -> bool {
        command_stdout(CSRUTIL, &["status"])
            .map(|out| out.contains("enabled"))
            .unwrap_or(false)
    }

    fn gatekeeper_enabled(&self) -> bool {
        // spctl exits 0 when assessments are enabled
        Command::new(SPCTL)
            .arg("--status")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn firewall_enabled(&self) -> bool {
        command_stdout(SOCKETFILTERFW, &["--getglobalstate"])
            .map(|out| out.contains("enabled"))
            .unwrap_or(false)
    }

    fn automatic_updates_enabled(&self) -> bool {
        if let Some(enabled) = read_plist_flag(Path::new(SOFTWARE_UPDATE_PLIST), AUTOMATIC_CHECK_KEY) {
            return enabled;
        }
        command_stdout(DEFAULTS, &["read", SOFTWARE_UPDATE_PLIST, AUTOMATIC_CHECK_KEY])
            .map(|out| out.trim() == "1")
            .unwrap_or(false)
    }
}

/// Fixed answers, for hosts without the macOS tools and for tests
#[derive(Debug, Clone, Default)]
pub struct StaticStatusProvider {
    pub os_version: String,
    pub sip: bool,
    pub gatekeeper: bool,
    pub firewall: bool,
    pub automatic_updates: bool,
}

impl StatusProvider for StaticStatusProvider {
    fn os_version(&self) -> String {
        self.os_version.clone()
    }

    fn sip_enabled(&self) -> bool {
        self.sip
    }

    fn gatekeeper_enabled(&self) -> bool {
        self.gatekeeper
    }

    fn firewall_enabled(&self) -> bool {
        self.firewall
    }

    fn automatic_updates_enabled(&self) -> bool {
        self.automatic_updates
    }
}

/// Run a status command and return its stdout, or None on any failure
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .ok()?;
    String::from_utf8(output.stdout).ok()
}

/// Read a boolean-ish preference from a plist file (bool or integer)
fn read_plist_flag(path: &Path, key: &str) -> Option<bool> {
    let value = plist::Value::from_file(path).ok()?;
    let entry = value.as_dictionary()?.get(key)?;
    match entry {
        plist::Value::Boolean(b) => Some(*b),
        plist::Value::Integer(i) => i.as_signed().map(|v| v != 0),
        _ => None,
    }
}
