//! Progress indicator for interactive scans
//!
//! Polls the monitor snapshot and redraws a single stderr line with a
//! spinner, the current phase, percentage and remaining-time estimate.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use crate::monitor::{MonitorSnapshot, SecurityMonitor};

/// Characters for the spinning animation
const SPINNER_CHARS: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Spinner line driven by `SecurityMonitor::snapshot()`
pub struct ProgressDisplay {
    is_running: Arc<AtomicBool>,
    animation_handle: Option<thread::JoinHandle<()>>,
    quiet_mode: bool,
}

impl ProgressDisplay {
    /// Start redrawing; a quiet display never writes anything
    pub fn start(monitor: &SecurityMonitor, quiet_mode: bool) -> Self {
        let is_running = Arc::new(AtomicBool::new(!quiet_mode));
        let animation_handle = (!quiet_mode).then(|| {
            let running = Arc::clone(&is_running);
            let monitor = monitor.clone();
            thread::spawn(move || {
                let mut frame = 0usize;
                while running.load(Ordering::Relaxed) {
                    let line = render_line(&monitor.snapshot(), SPINNER_CHARS[frame % SPINNER_CHARS.len()]);
                    eprint!("\r\x1b[2K{}", line);
                    io::stderr().flush().unwrap_or(());
                    frame += 1;
                    thread::sleep(REDRAW_INTERVAL);
                }
            })
        });

        Self {
            is_running,
            animation_handle,
            quiet_mode,
        }
    }

    /// Stop the animation and clear the line
    pub fn finish(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.animation_handle.take() {
            let _ = handle.join();
            if !self.quiet_mode {
                eprint!("\r\x1b[2K");
                io::stderr().flush().unwrap_or(());
            }
        }
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        self.finish();
    }
}

/// `⠋ Scanning launch agents... 40% (~1m 20s left)`
pub fn render_line(snapshot: &MonitorSnapshot, spinner: char) -> String {
    if snapshot.current_phase.is_empty() {
        return format!("{} Starting scan...", spinner);
    }
    let percent = (snapshot.progress * 100.0).round() as u32;
    let eta = snapshot.estimated_time_remaining.as_secs();
    if eta == 0 {
        format!("{} {} {}%", spinner, snapshot.current_phase, percent)
    } else {
        format!(
            "{} {} {}% (~{}m {}s left)",
            spinner,
            snapshot.current_phase,
            percent,
            eta / 60,
            eta % 60
        )
    }
}
