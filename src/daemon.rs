//! Background service
//!
//! This module runs secmonitor as a long-lived agent:
//! - Periodic scans when auto-scan is enabled, plus daily retention purges
//! - Structured event log of scan outcomes
//! - Detached start with a READY handshake, stop via SIGTERM
//! - LaunchAgent installation (see `launchd`)

pub mod launchd;

use anyhow::{Context, Result, bail};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use crate::constants::{DAEMON_CHILD_ENV, DAEMON_RUN_SUBCOMMAND, DAEMON_SUBCOMMAND, PURGE_INTERVAL};
use crate::logging::EventLog;
use crate::monitor::{MonitorEvent, SecurityMonitor};
use crate::notifier;

const BINARY_NAME: &str = "secmonitor";
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Check if a secmonitor daemon process is already running
pub fn is_daemon_running() -> bool {
    !find_daemon_pids().is_empty()
}

/// Find PIDs of running `secmonitor ... daemon run` processes,
/// excluding the current process and sudo wrappers
pub fn find_daemon_pids() -> Vec<u32> {
    use sysinfo::{ProcessesToUpdate, System};

    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let current_pid = std::process::id();

    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let pid_u32 = pid.as_u32();
            if pid_u32 == current_pid {
                return None;
            }

            let cmd = process.cmd();
            let is_secmonitor = cmd.iter().any(|arg| arg.to_string_lossy().contains(BINARY_NAME));
            let has_daemon = cmd.iter().any(|arg| arg == DAEMON_SUBCOMMAND);
            let has_run = cmd.iter().any(|arg| arg == DAEMON_RUN_SUBCOMMAND);
            let is_sudo = process.name() == "sudo";

            (is_secmonitor && has_daemon && has_run && !is_sudo).then_some(pid_u32)
        })
        .collect()
}

/// Spawn the service as a detached child and wait for it to report ready
pub async fn start_daemon(data_dir: &Path) -> Result<()> {
    if is_daemon_running() {
        bail!("Daemon already running, please stop it first.");
    }

    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = std::process::Command::new(current_exe);
    cmd.env(DAEMON_CHILD_ENV, "1");
    cmd.arg("--data-dir").arg(data_dir);
    cmd.args([DAEMON_SUBCOMMAND, DAEMON_RUN_SUBCOMMAND]);
    cmd.stdin(std::process::Stdio::null());
    // the child signals readiness on stdout
    cmd.stdout(std::process::Stdio::piped());

    let mut child = cmd.spawn().context("Failed to spawn daemon child process")?;
    println!("🚀 secmonitor daemon starting...");

    // "READY" after initialization; EOF if the child dies first
    let stdout = child.stdout.take().context("Failed to capture child stdout")?;
    let mut reader = std::io::BufReader::new(stdout);
    let mut line = String::new();

    let ready_result = tokio::time::timeout(
        READY_TIMEOUT,
        tokio::task::spawn_blocking(move || reader.read_line(&mut line).map(|n| (n, line))),
    )
    .await;

    match ready_result {
        Ok(Ok(Ok((0, _)))) => {
            let status = child.try_wait().ok().flatten();
            let exit_info = status.map_or("unknown".to_string(), |s| format!("{}", s));
            eprintln!("❌ Failed to start secmonitor daemon");
            eprintln!("   The daemon process exited before becoming ready (exit: {})", exit_info);
            eprintln!("   Check logs: secmonitor daemon logs");
            bail!("Daemon process exited before becoming ready")
        }
        Ok(Ok(Ok((_, ref msg)))) if msg.trim() == "READY" => {
            println!("✅ secmonitor daemon started successfully");
            println!("  View logs: secmonitor daemon logs");
            println!("  Check status: secmonitor daemon status");
            println!("  Stop daemon: secmonitor daemon stop");
            Ok(())
        }
        Ok(Ok(Ok((_, msg)))) => {
            eprintln!("❌ Failed to start secmonitor daemon");
            eprintln!("   Unexpected daemon output: {}", msg.trim());
            bail!("Unexpected daemon output")
        }
        Ok(Ok(Err(e))) => bail!("Failed reading from daemon process: {}", e),
        Ok(Err(e)) => bail!("Internal error waiting for daemon: {}", e),
        Err(_) => {
            let _ = child.kill();
            eprintln!("❌ Failed to start secmonitor daemon");
            eprintln!("   Daemon did not become ready within {} seconds", READY_TIMEOUT.as_secs());
            bail!("Daemon startup timed out")
        }
    }
}

/// Send SIGTERM to every running daemon; returns how many were signalled
pub fn stop_daemon() -> Result<usize> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pids = find_daemon_pids();
    for pid in &pids {
        let raw = i32::try_from(*pid).with_context(|| format!("Invalid PID {}", pid))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .with_context(|| format!("Failed to signal daemon process {}", pid))?;
    }
    Ok(pids.len())
}

/// Run the service in the foreground until SIGINT or SIGTERM
pub async fn run_service(data_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    let monitor = SecurityMonitor::open(&data_dir, |config| {
        notifier::system_notifier(config.notifications.enable_sounds)
    })?;
    let settings = monitor.config().configuration();
    let event_log = Arc::new(EventLog::in_data_dir(&data_dir, &settings.logging));
    event_log.log_startup(std::process::id(), &data_dir);

    if !monitor.validate_environment() {
        event_log.log_error(
            "Scan routine is missing or not executable",
            Some(&settings.script_path(&data_dir).display().to_string()),
        );
    }

    let recorder = spawn_event_recorder(&monitor, event_log.clone());
    let purger = spawn_purge_task(&monitor);

    if settings.scan.auto_scan_enabled {
        monitor.schedule_periodic(settings.auto_scan_interval());
    } else {
        log::info!("Auto-scan disabled; waiting for shutdown");
    }

    if std::env::var_os(DAEMON_CHILD_ENV).is_some() {
        // launchd runs us without a pipe, so only the spawning parent needs this
        println!("READY");
    }

    let reason = wait_for_shutdown().await;
    monitor.stop_periodic();
    purger.abort();
    recorder.abort();
    event_log.log_shutdown(reason);
    Ok(())
}

/// Forward monitor events to the event log
fn spawn_event_recorder(monitor: &SecurityMonitor, event_log: Arc<EventLog>) -> tokio::task::JoinHandle<()> {
    let mut events = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::ScanStarted { mode }) => event_log.log_scan_started(mode),
                Ok(MonitorEvent::ScanCompleted { result }) => event_log.log_scan_completed(&result),
                Ok(MonitorEvent::ScanFailed { mode, error }) => event_log.log_scan_failed(mode, &error),
                Err(RecvError::Lagged(missed)) => {
                    event_log.log_error(&format!("Missed {} monitor events", missed), None);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Retention hygiene at startup and then once a day
fn spawn_purge_task(monitor: &SecurityMonitor) -> tokio::task::JoinHandle<()> {
    let monitor = monitor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let removed = monitor.purge_history();
            if removed > 0 {
                log::info!("Purged {} scan result(s) past retention", removed);
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "Received SIGINT",
                _ = terminate.recv() => "Received SIGTERM",
            }
        }
        Err(e) => {
            log::warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "Received SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Received interrupt"
}
