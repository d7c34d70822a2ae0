//! Progress reporting for a run
//!
//! The orchestrator emits a [`ProgressUpdate`] at each phase checkpoint.
//! Reporters are best-effort: errors and panics are logged and swallowed so
//! that a broken consumer can never abort a run or skip cleanup.

use crate::defaults::TOTAL_PHASES;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

/// One progress checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// 1-based phase number
    pub phase: u8,
    pub total_phases: u8,
    pub message: String,
    /// 0.0 - 100.0
    pub percentage: f64,
}

impl ProgressUpdate {
    pub fn new(phase: u8, message: impl Into<String>, percentage: f64) -> Self {
        Self {
            phase,
            total_phases: TOTAL_PHASES,
            message: message.into(),
            percentage: percentage.clamp(0.0, 100.0),
        }
    }
}

/// Receives progress updates from a run
#[cfg_attr(test, mockall::automock)]
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: &ProgressUpdate) -> Result<()>;
}

/// Log an update, then hand it to `reporter`, containing any failure.
pub fn notify(reporter: &dyn ProgressReporter, update: &ProgressUpdate) {
    info!(
        "Progress: Phase {}/{} - {} ({:.0}%)",
        update.phase, update.total_phases, update.message, update.percentage
    );

    match catch_unwind(AssertUnwindSafe(|| reporter.report(update))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Progress callback failed"),
        Err(_) => warn!("Progress callback panicked"),
    }
}

/// Reporter that only logs (the orchestrator already logs every update)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, _update: &ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

/// Reporter that forwards updates over a bounded channel without blocking
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, update: &ProgressUpdate) -> Result<()> {
        self.tx.try_send(update.clone()).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("progress channel is full"),
            TrySendError::Closed(_) => anyhow!("progress receiver is gone"),
        })
    }
}
