//! Run events and cancellation.
//!
//! The orchestrator communicates outward exclusively through an ordered
//! event stream: progress updates, aggregate statistics, and exactly one
//! terminal report.  The invoking surface (CLI, UI) holds the receiving
//! end and never shares mutable state with the run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Phases a run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Validating,
    Initializing,
    Preparing,
    GeneratingKeys,
    Creating,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Validating => "Validating",
            RunPhase::Initializing => "Initializing",
            RunPhase::Preparing => "Preparing",
            RunPhase::GeneratingKeys => "Generating keys",
            RunPhase::Creating => "Creating repositories",
            RunPhase::Finalizing => "Finalizing",
            RunPhase::Completed => "Completed",
            RunPhase::Failed => "Failed",
            RunPhase::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// A progress update for the current activity.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    /// Overall run progress, 0..=100.
    pub overall_percent: u8,
    /// Phase the run is in.
    pub step: RunPhase,
    /// Human-readable description of the current activity.
    pub activity: String,
}

/// Aggregate statistics, emitted as the repository loop advances.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub created: usize,
    /// 1-based index of the repository currently being processed.
    pub current_index: usize,
    pub failed: usize,
}

/// Terminal report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Overall success: at least one repository was created.
    pub success: bool,
    pub message: String,
    pub created_repos: Vec<String>,
    pub generated_key_count: usize,
    /// Every warning and error message collected during the run, verbatim.
    pub errors: Vec<String>,
    pub elapsed_secs: f64,
    /// Terminal phase: `Completed`, `Failed`, or `Cancelled`.
    pub phase: RunPhase,
}

/// One event in the run's ordered stream.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    Progress(ProgressUpdate),
    Stats(RunStats),
    Finished(RunReport),
}

/// Sending half of the event stream.
///
/// Sends are infallible from the run's point of view: once the listener
/// is gone the events are dropped silently and the run keeps going.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<UnboundedSender<RunEvent>>,
}

impl EventSender {
    /// A sender that discards every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit a progress update.
    pub fn progress(&self, overall_percent: u8, step: RunPhase, activity: impl Into<String>) {
        self.send(RunEvent::Progress(ProgressUpdate {
            overall_percent,
            step,
            activity: activity.into(),
        }));
    }

    /// Emit an aggregate statistics update.
    pub fn stats(&self, stats: RunStats) {
        self.send(RunEvent::Stats(stats));
    }

    /// Emit the terminal report.
    pub fn finished(&self, report: RunReport) {
        self.send(RunEvent::Finished(report));
    }

    fn send(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn channel() -> (EventSender, UnboundedReceiver<RunEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, rx)
}

/// Cooperative cancellation flag.
///
/// Checked once per repository-loop iteration; a repository already in
/// flight finishes before cancellation takes effect.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
