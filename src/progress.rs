//! Phase-based progress tracking for a single in-flight scan
//!
//! Pure in-memory state. The executor's cadence timer calls `advance()`,
//! presentation code reads `progress()`, `current_phase()` and
//! `estimated_time_remaining()`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use crate::models::ScanMode;

/// Label shown between `complete()` and `reset()`
pub const COMPLETED_LABEL: &str = "Scan completed";

/// Lifecycle of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Idle,
    Running,
    Completed,
}

/// Progress of one scan through the phases of its mode
#[derive(Debug, Clone)]
pub struct ScanProgress {
    mode: ScanMode,
    phases: &'static [&'static str],
    state: ProgressState,
    phase_index: usize,
    current_phase: String,
    progress: f64,
    started_at: Option<Instant>,
}

/// Tracker shared between the cadence timer and readers
pub type SharedProgress = Arc<Mutex<ScanProgress>>;

/// Lock a shared tracker, recovering the state if a holder panicked
pub fn lock(progress: &SharedProgress) -> MutexGuard<'_, ScanProgress> {
    progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScanProgress {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            phases: mode.phases(),
            state: ProgressState::Idle,
            phase_index: 0,
            current_phase: String::new(),
            progress: 0.0,
            started_at: None,
        }
    }

    pub fn shared(mode: ScanMode) -> SharedProgress {
        Arc::new(Mutex::new(Self::new(mode)))
    }

    /// idle -> running, phase 0
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        self.state = ProgressState::Running;
        self.started_at = Some(now);
        self.phase_index = 0;
        self.update_phase();
    }

    /// Move to the next phase. No-op at the last phase or when not running.
    pub fn advance(&mut self) {
        if self.state != ProgressState::Running || self.phase_index + 1 >= self.phases.len() {
            return;
        }
        self.phase_index += 1;
        self.update_phase();
    }

    /// Mark the scan finished; the label is cleared by `reset()` after a grace period
    pub fn complete(&mut self) {
        self.state = ProgressState::Completed;
        self.progress = 1.0;
        self.current_phase = COMPLETED_LABEL.to_string();
    }

    /// Return to idle with cleared label and zero progress
    pub fn reset(&mut self) {
        self.state = ProgressState::Idle;
        self.progress = 0.0;
        self.phase_index = 0;
        self.current_phase.clear();
        self.started_at = None;
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state != ProgressState::Idle
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn current_phase(&self) -> &str {
        &self.current_phase
    }

    /// Completed fraction in [0, 1]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn estimated_time_remaining(&self) -> Duration {
        self.estimated_time_remaining_at(Instant::now())
    }

    /// elapsed × (1/progress − 1); zero before any phase has completed
    pub fn estimated_time_remaining_at(&self, now: Instant) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        if self.state != ProgressState::Running || self.progress <= 0.0 {
            return Duration::ZERO;
        }
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let remaining = elapsed * (1.0 / self.progress - 1.0);
        Duration::from_secs_f64(remaining.max(0.0))
    }

    fn update_phase(&mut self) {
        self.current_phase = self.phases[self.phase_index].to_string();
        self.progress = self.phase_index as f64 / self.phases.len() as f64;
    }
}
