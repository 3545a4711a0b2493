// crates/jobs/src/state.rs
//! Shared state for one polled job.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};

use dats_types::{JobId, JobKind, JobSnapshot, JobStatus};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::handler::{Observation, TerminalGuard, TerminalOutcome};

/// Progress update pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: JobId,
    pub job_type: JobKind,
    pub status: JobStatus,
    pub current: u32,
    pub total: u32,
    pub message: Option<String>,
    pub timestamp: String,
}

/// Where the poll for a job stands.
#[derive(Debug, Clone)]
pub enum JobPhase {
    /// No read has completed yet.
    Pending,
    Polling(JobSnapshot),
    /// The terminal handler ran.
    Handled(TerminalOutcome),
    Aborted { failures: u32 },
    /// No action tracks the job anymore.
    Cancelled,
}

impl JobPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Polling(_))
    }
}

/// State for a single job.
///
/// One instance exists per polled job; every action tracking the job shares
/// it, which is what coalesces their polls.
pub struct JobState {
    id: JobId,
    kind: JobKind,
    guard: Mutex<TerminalGuard>,
    latest: RwLock<Option<JobSnapshot>>,
    poll_failures: AtomicU32,
    last_error: RwLock<Option<String>>,
    phase_tx: watch::Sender<JobPhase>,
    progress_tx: broadcast::Sender<JobProgress>,
    global_tx: broadcast::Sender<JobProgress>,
    cancel: CancellationToken,
}

impl JobState {
    pub fn new(id: JobId, kind: JobKind, global_tx: broadcast::Sender<JobProgress>) -> Self {
        let (progress_tx, _) = broadcast::channel(64);
        let (phase_tx, _) = watch::channel(JobPhase::Pending);
        Self {
            id,
            kind,
            guard: Mutex::new(TerminalGuard::default()),
            latest: RwLock::new(None),
            poll_failures: AtomicU32::new(0),
            last_error: RwLock::new(None),
            phase_tx,
            progress_tx,
            global_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Record the snapshot returned by the create call. Display only; the
    /// terminal guard is fed by polled snapshots. Ignored once a poll has
    /// been observed.
    pub fn seed(&self, snapshot: JobSnapshot) {
        let polled = match self.guard.lock() {
            Ok(guard) => guard.last().is_some(),
            Err(e) => {
                tracing::error!("Mutex poisoned reading job status: {e}");
                true
            }
        };
        if polled {
            return;
        }
        self.store_latest(snapshot);
        self.broadcast_progress();
    }

    /// Feed a polled snapshot through the terminal guard.
    pub fn observe(&self, snapshot: &JobSnapshot) -> Observation {
        let observation = self.observe_status(snapshot.status());
        if observation == Observation::Regressed {
            return observation;
        }
        self.poll_failures.store(0, Ordering::Relaxed);
        self.store_latest(snapshot.clone());
        self.phase_tx.send_if_modified(|phase| {
            if phase.is_active() {
                *phase = JobPhase::Polling(snapshot.clone());
                true
            } else {
                false
            }
        });
        self.broadcast_progress();
        observation
    }

    /// Feed a status through the terminal guard without a snapshot to keep.
    pub fn observe_status(&self, status: JobStatus) -> Observation {
        match self.guard.lock() {
            Ok(mut guard) => guard.observe(status),
            Err(e) => {
                tracing::error!("Mutex poisoned observing job status: {e}");
                Observation::Regressed
            }
        }
    }

    /// Count a failed read. Returns the number of consecutive failures.
    pub fn record_failure(&self, error: impl Into<String>) -> u32 {
        let failures = self.poll_failures.fetch_add(1, Ordering::Relaxed) + 1;
        match self.last_error.write() {
            Ok(mut guard) => *guard = Some(error.into()),
            Err(e) => tracing::error!("RwLock poisoned writing poll error: {e}"),
        }
        self.broadcast_progress();
        failures
    }

    pub fn mark_handled(&self, outcome: TerminalOutcome) {
        self.phase_tx.send_replace(JobPhase::Handled(outcome));
        self.broadcast_progress();
    }

    pub fn mark_aborted(&self, failures: u32) {
        self.phase_tx.send_replace(JobPhase::Aborted { failures });
    }

    /// Stop polling. A job already handled or aborted keeps its phase.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.phase_tx.send_if_modified(|phase| {
            if phase.is_active() {
                *phase = JobPhase::Cancelled;
                true
            } else {
                false
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<JobPhase> {
        self.phase_tx.subscribe()
    }

    /// Subscribe to progress updates for this specific job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgress> {
        self.progress_tx.subscribe()
    }

    pub fn latest(&self) -> Option<JobSnapshot> {
        match self.latest.read() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading snapshot: {e}");
                None
            }
        }
    }

    pub fn poll_failures(&self) -> u32 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    /// Current progress as pushed to subscribers.
    pub fn progress(&self) -> JobProgress {
        let latest = self.latest();
        let status = match &*self.phase_tx.borrow() {
            JobPhase::Handled(outcome) => outcome.status(),
            _ => latest.as_ref().map(JobSnapshot::status).unwrap_or_default(),
        };
        let progress = latest.as_ref().and_then(JobSnapshot::progress);
        let (current, total) = progress.and_then(|p| p.steps).unwrap_or((0, 0));
        let mut message = progress.and_then(|p| p.description.clone());
        if self.poll_failures() > 0 {
            message = match self.last_error.read() {
                Ok(guard) => guard.clone(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading poll error: {e}");
                    None
                }
            };
        } else if let Some(error) = latest.as_ref().and_then(JobSnapshot::error_message) {
            message = Some(error.to_string());
        }
        JobProgress {
            job_id: self.id.clone(),
            job_type: self.kind,
            status,
            current,
            total,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn store_latest(&self, snapshot: JobSnapshot) {
        match self.latest.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(e) => tracing::error!("RwLock poisoned writing snapshot: {e}"),
        }
    }

    fn broadcast_progress(&self) {
        let progress = self.progress();
        // No subscribers is fine.
        let _ = self.progress_tx.send(progress.clone());
        let _ = self.global_tx.send(progress);
    }
}
