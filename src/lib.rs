//! secmonitor - periodic workstation security audit
//!
//! This library exposes scan orchestration, result classification, history
//! and notification services, plus the background daemon used by the
//! `secmonitor` binary.

pub mod cli;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod history;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod output;
pub mod parser;
pub mod progress;
pub mod status;
pub mod store;
