//! Scan execution
//!
//! Runs the external scan routine, paces the progress tracker while it
//! runs and classifies the outcome. The process is never killed: the scan
//! takes as long as the routine does, and the phase cadence only drives the
//! display.

use async_trait::async_trait;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use crate::constants::{
    ENV_GROUPED_NOTIFICATIONS, ENV_MONITOR_MODE, ENV_NOTIFICATION_FREQUENCY, ENV_OUTPUT_FORMAT,
};
use crate::error::ScanError;
use crate::models::{ScanMode, ScanResult};
use crate::parser::OutputParser;
use crate::progress::{self, SharedProgress};

/// Termination status and captured streams of one routine run
#[derive(Debug, Clone, Default)]
pub struct RoutineOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Something that can be launched to produce scan output
#[async_trait]
pub trait ScanRoutine: Send + Sync {
    /// Launch the routine. Spawn failures are reported here.
    async fn start(&self, mode: ScanMode) -> Result<Box<dyn RunningScan>, ScanError>;

    /// Pre-flight check that the routine can be launched
    fn validate_environment(&self) -> bool;
}

/// A launched routine
#[async_trait]
pub trait RunningScan: Send {
    async fn wait(self: Box<Self>) -> Result<RoutineOutput, ScanError>;
}

/// Shell script run by an interpreter
#[derive(Debug, Clone)]
pub struct ScriptRoutine {
    script_path: PathBuf,
    interpreter: PathBuf,
}

impl ScriptRoutine {
    pub fn new(script_path: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            interpreter: interpreter.into(),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    fn command(&self, mode: ScanMode) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script_path)
            .env(ENV_MONITOR_MODE, mode.as_str())
            .env(ENV_NOTIFICATION_FREQUENCY, "0")
            .env(ENV_GROUPED_NOTIFICATIONS, "false")
            .env(ENV_OUTPUT_FORMAT, "json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

#[async_trait]
impl ScanRoutine for ScriptRoutine {
    async fn start(&self, mode: ScanMode) -> Result<Box<dyn RunningScan>, ScanError> {
        if !self.script_path.exists() {
            return Err(ScanError::NotFound(self.script_path.clone()));
        }

        debug!(
            "Spawning {} {} (mode: {})",
            self.interpreter.display(),
            self.script_path.display(),
            mode
        );

        let child = self.command(mode).spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScanError::NotFound(self.interpreter.clone()),
            ErrorKind::PermissionDenied => ScanError::PermissionDenied(self.interpreter.clone()),
            _ => ScanError::ExecutionFailed(format!("Failed to spawn scan routine: {}", e)),
        })?;

        Ok(Box::new(ScriptProcess { child }))
    }

    fn validate_environment(&self) -> bool {
        is_executable(&self.script_path)
    }
}

struct ScriptProcess {
    child: Child,
}

#[async_trait]
impl RunningScan for ScriptProcess {
    async fn wait(self: Box<Self>) -> Result<RoutineOutput, ScanError> {
        let output = self
            .child
            .wait_with_output()
            .await
            .map_err(|e| ScanError::ExecutionFailed(format!("Failed to wait for scan routine: {}", e)))?;

        Ok(RoutineOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Aborts the phase cadence task when dropped
struct CadenceGuard(JoinHandle<()>);

impl Drop for CadenceGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_cadence(progress: SharedProgress, cadence: Duration) -> CadenceGuard {
    CadenceGuard(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + cadence, cadence);
        loop {
            ticker.tick().await;
            progress::lock(&progress).advance();
        }
    }))
}

/// Runs a routine and parses what it printed
pub struct ScanExecutor {
    routine: Arc<dyn ScanRoutine>,
    parser: Arc<dyn OutputParser>,
}

impl ScanExecutor {
    pub fn new(routine: Arc<dyn ScanRoutine>, parser: Arc<dyn OutputParser>) -> Self {
        Self { routine, parser }
    }

    pub fn validate_environment(&self) -> bool {
        self.routine.validate_environment()
    }

    /// Run one scan to completion.
    ///
    /// On success the tracker is left at "Scan completed"; resetting it after
    /// the grace period is the caller's job. On failure it is reset here.
    pub async fn run_scan(
        &self,
        mode: ScanMode,
        progress: Option<SharedProgress>,
    ) -> Result<ScanResult, ScanError> {
        let result = self.execute(mode, progress.as_ref()).await;
        if let Some(progress) = &progress {
            let mut tracker = progress::lock(progress);
            match &result {
                Ok(_) => tracker.complete(),
                Err(_) => tracker.reset(),
            }
        }
        result
    }

    async fn execute(
        &self,
        mode: ScanMode,
        progress: Option<&SharedProgress>,
    ) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let running = self.routine.start(mode).await?;

        let cadence = progress.map(|p| {
            progress::lock(p).start();
            spawn_cadence(p.clone(), mode.phase_cadence())
        });
        let output = running.wait().await;
        drop(cadence);
        let output = output?;

        match output.exit_code {
            Some(0) => {}
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = match (stderr.is_empty(), code) {
                    (false, _) => stderr,
                    (true, Some(code)) => format!("Scan routine exited with status {}", code),
                    (true, None) => "Scan routine was terminated by a signal".to_string(),
                };
                warn!("Scan routine failed: {}", message);
                return Err(ScanError::ExecutionFailed(message));
            }
        }

        let duration = started.elapsed();
        let parser = self.parser.clone();
        let stdout = output.stdout;
        tokio::task::spawn_blocking(move || parser.parse(&stdout, mode, duration))
            .await
            .map_err(|e| ScanError::ExecutionFailed(format!("Output parser task failed: {}", e)))?
    }
}
