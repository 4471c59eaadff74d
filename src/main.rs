#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use secmonitor::cli::{Cli, Commands, ConfigCommands, DaemonCommands};
use secmonitor::config::ConfigurationManager;
use secmonitor::constants::CONFIGURATION_KEY;
use secmonitor::daemon::{self, launchd};
use secmonitor::error::ScanError;
use secmonitor::logging::{self, EventLog};
use secmonitor::models::ScanMode;
use secmonitor::monitor::SecurityMonitor;
use secmonitor::notifier::{self, LogNotifier, Notifier};
use secmonitor::output::{self, StatusReport, progress::ProgressDisplay};
use secmonitor::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.global.data_dir();

    if matches!(cli.command, Commands::Daemon(DaemonCommands::Run)) {
        let level = if cli.global.verbose { LevelFilter::Debug } else { LevelFilter::Info };
        logging::init_daemon_logging(level)?;
        return daemon::run_service(data_dir).await;
    }
    logging::init_terminal_logging(cli.global.log_level())?;

    match cli.command {
        Commands::Scan { mode, recommended, json, notify } => {
            run_scan(&data_dir, mode, recommended, json, notify, cli.global.quiet).await
        }
        Commands::Status { alerts, json } => show_status(&data_dir, alerts, json),
        Commands::History { limit, json } => {
            let monitor = open_monitor(&data_dir)?;
            let mut scans = monitor.history().scan_history();
            if let Some(limit) = limit {
                scans.truncate(limit);
            }
            if json {
                println!("{}", output::to_json(&scans)?);
            } else {
                println!("{}", output::format_history(&scans));
            }
            Ok(())
        }
        Commands::Purge { days } => {
            let monitor = open_monitor(&data_dir)?;
            let removed = match days {
                Some(days) => monitor
                    .history()
                    .purge_older_than(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
                None => monitor.purge_history(),
            };
            println!("Removed {} scan(s) from history", removed);
            Ok(())
        }
        Commands::Validate => validate(&data_dir),
        Commands::Config(command) => run_config(&data_dir, command),
        Commands::Daemon(command) => run_daemon(&data_dir, command).await,
    }
}

/// Monitor for read-only commands; notifications go to the log
fn open_monitor(data_dir: &Path) -> Result<SecurityMonitor> {
    SecurityMonitor::open(data_dir, |_| Arc::new(LogNotifier))
}

async fn run_scan(
    data_dir: &Path,
    mode: Option<ScanMode>,
    recommended: bool,
    json: bool,
    notify: bool,
    quiet: bool,
) -> Result<()> {
    let monitor = SecurityMonitor::open(data_dir, |config| -> Arc<dyn Notifier> {
        if notify {
            notifier::system_notifier(config.notifications.enable_sounds)
        } else {
            Arc::new(LogNotifier)
        }
    })?;

    let mode = match mode {
        Some(mode) => mode,
        None if recommended => monitor.recommended_scan_mode(),
        None => monitor.config().scan_mode(),
    };

    let handle = monitor.start_scan(mode).context("A scan is already running")?;
    let mut display = ProgressDisplay::start(&monitor, quiet || json);
    let outcome = handle.await.context("Scan task terminated unexpectedly")?;
    display.finish();

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", output::to_json(&result)?);
            } else {
                println!("{}", output::format_scan_result(&result));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("   {}", e.recovery_suggestion());
            Err(e.into())
        }
    }
}

fn show_status(data_dir: &Path, alerts: usize, json: bool) -> Result<()> {
    let monitor = open_monitor(data_dir)?;
    let dashboard = monitor.dashboard_stats();
    let report = StatusReport {
        snapshot: monitor.snapshot(),
        health_score: dashboard.health_score(),
        dashboard,
        recommended_mode: monitor.recommended_scan_mode(),
        next_scan: monitor.next_scan_message(),
        daemon_running: daemon::is_daemon_running(),
        recent_alerts: monitor.recent_alerts(alerts),
    };
    if json {
        println!("{}", output::to_json(&report)?);
    } else {
        println!("{}", output::format_status(&report));
    }
    Ok(())
}

fn validate(data_dir: &Path) -> Result<()> {
    let config = ConfigurationManager::load(Arc::new(FileStore::new(data_dir))).configuration();
    let script = config.script_path(data_dir);
    let monitor = open_monitor(data_dir)?;

    if monitor.validate_environment() {
        println!("✅ Scan routine ready: {}", script.display());
        println!("  Interpreter: {}", config.scan.interpreter.display());
        return Ok(());
    }

    let problem = if script.exists() {
        ScanError::PermissionDenied(script)
    } else {
        ScanError::NotFound(script)
    };
    eprintln!("❌ {}", problem);
    eprintln!("   {}", problem.recovery_suggestion());
    Err(problem.into())
}

fn run_config(data_dir: &Path, command: ConfigCommands) -> Result<()> {
    let store = Arc::new(FileStore::new(data_dir));
    match command {
        ConfigCommands::Show => {
            let config = ConfigurationManager::load(store).configuration();
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Set { updates } => {
            ConfigurationManager::load(store)
                .apply_updates(&updates)
                .context("Configuration unchanged")?;
            println!("{}", output::format_config_updated(&updates, daemon::is_daemon_running()));
        }
        ConfigCommands::Path => {
            println!("{}", store.path_for(CONFIGURATION_KEY)?.display());
        }
        ConfigCommands::AddApp { path } => {
            ConfigurationManager::load(store).add_critical_app(&path)?;
            println!("Added critical application: {}", path);
        }
        ConfigCommands::RemoveApp { path } => {
            ConfigurationManager::load(store).remove_critical_app(&path);
            println!("Removed critical application: {}", path);
        }
    }
    Ok(())
}

async fn run_daemon(data_dir: &Path, command: DaemonCommands) -> Result<()> {
    match command {
        // handled before terminal logging is set up
        DaemonCommands::Run => daemon::run_service(data_dir.to_path_buf()).await,
        DaemonCommands::Start => daemon::start_daemon(data_dir).await,
        DaemonCommands::Stop => {
            let stopped = daemon::stop_daemon()?;
            if stopped == 0 {
                println!("secmonitor daemon is not running");
            } else {
                println!("✅ Sent stop signal to {} daemon process(es)", stopped);
            }
            Ok(())
        }
        DaemonCommands::Status => {
            let pids = daemon::find_daemon_pids();
            if pids.is_empty() {
                println!("secmonitor daemon: not running");
            } else {
                let list: Vec<String> = pids.iter().map(|p| p.to_string()).collect();
                println!("secmonitor daemon: running (PID {})", list.join(", "));
            }
            let plist = launchd::plist_path()?;
            if launchd::is_installed() {
                println!("LaunchAgent: installed ({})", plist.display());
            } else {
                println!("LaunchAgent: not installed");
            }
            Ok(())
        }
        DaemonCommands::Install => {
            let executable = std::env::current_exe().context("Failed to get current executable path")?;
            let plist = launchd::LaunchAgentPlist::new(&executable, data_dir);
            let path = plist.install()?;
            println!("✅ LaunchAgent installed: {}", path.display());
            Ok(())
        }
        DaemonCommands::Uninstall => {
            if launchd::uninstall()? {
                println!("✅ LaunchAgent removed");
            } else {
                println!("LaunchAgent is not installed");
            }
            Ok(())
        }
        DaemonCommands::Logs { lines, system, since } => {
            let entries = if system {
                logging::get_system_logs(&since)?
            } else {
                let settings = ConfigurationManager::load(Arc::new(FileStore::new(data_dir)))
                    .configuration()
                    .logging;
                EventLog::in_data_dir(data_dir, &settings).tail(lines)?
            };
            if entries.is_empty() {
                println!("No daemon log entries found");
            }
            for entry in entries {
                println!("{}", entry);
            }
            Ok(())
        }
    }
}
