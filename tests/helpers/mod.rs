#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated data directory with an optional scan routine
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `secmonitor --data-dir <tmp> <args...>`
    pub fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo_bin_cmd!("secmonitor");
        cmd.arg("--data-dir").arg(self.data_dir());
        cmd
    }

    /// Write an executable shell routine and point the configuration at it
    pub fn install_script(&self, body: &str) -> PathBuf {
        let path = self.data_dir().join("routine.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        }

        self.cmd()
            .args(["config", "set"])
            .arg(format!("scan.script_path={}", path.display()))
            .arg("scan.interpreter=/bin/sh")
            .assert()
            .success();
        path
    }
}
