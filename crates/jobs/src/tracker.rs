// crates/jobs/src/tracker.rs
//! Central tracker that submits jobs and polls them to completion.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dats_types::{JobId, JobKind, JobParameters, JobSnapshot, JobStatus};
use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::action::{ActionKey, ActionState};
use crate::api::{HttpJobApi, JobApi};
use crate::config::{ClientConfig, PollConfig};
use crate::effects::{Confirm, DiskFileSaver, Notifier, Severity};
use crate::error::{ApiError, SubmitError};
use crate::handler::{DefaultTerminalHandler, Observation, TerminalHandler, TerminalOutcome};
use crate::poller::{poll_job, PollEvent};
use crate::registry::{JobRegistry, Ticket};
use crate::state::{JobPhase, JobProgress, JobState};
use crate::submit::Submission;

type JobMap = RwLock<HashMap<(JobKind, JobId), Arc<JobState>>>;

/// How a [`JobWatch`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEnd {
    /// The terminal handler ran with this outcome.
    Terminal(TerminalOutcome),
    /// The action was reset or resubmitted before the job ended.
    Cancelled,
    /// Polling gave up after this many consecutive failures.
    PollAborted { failures: u32 },
}

/// One action's view of a tracked job.
pub struct JobWatch {
    action: ActionKey,
    job_id: JobId,
    kind: JobKind,
    token: CancellationToken,
    phase: watch::Receiver<JobPhase>,
    state: Arc<JobState>,
}

impl JobWatch {
    pub fn action(&self) -> &ActionKey {
        &self.action
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Latest snapshot read for the job.
    pub fn latest(&self) -> Option<JobSnapshot> {
        self.state.latest()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgress> {
        self.state.subscribe()
    }

    /// Resolve once the job is handled, polling is aborted, or the action
    /// moves on.
    pub async fn wait(&mut self) -> WatchEnd {
        loop {
            match &*self.phase.borrow_and_update() {
                JobPhase::Handled(outcome) => return WatchEnd::Terminal(outcome.clone()),
                JobPhase::Aborted { failures } => {
                    return WatchEnd::PollAborted {
                        failures: *failures,
                    }
                }
                JobPhase::Cancelled => return WatchEnd::Cancelled,
                JobPhase::Pending | JobPhase::Polling(_) => {}
            }
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return WatchEnd::Cancelled,
                changed = self.phase.changed() => {
                    if changed.is_err() {
                        return WatchEnd::Cancelled;
                    }
                }
            }
        }
    }
}

/// Owns the registry, the per-job states and their poll tasks.
///
/// Poll tasks are spawned on the current tokio runtime.
pub struct JobTracker {
    api: Arc<dyn JobApi>,
    handler: Arc<dyn TerminalHandler>,
    notifier: Arc<dyn Notifier>,
    poll: PollConfig,
    registry: Arc<JobRegistry>,
    jobs: Arc<JobMap>,
    global_tx: broadcast::Sender<JobProgress>,
}

impl JobTracker {
    pub fn new(
        api: Arc<dyn JobApi>,
        handler: Arc<dyn TerminalHandler>,
        notifier: Arc<dyn Notifier>,
        poll: PollConfig,
    ) -> Self {
        let (global_tx, _) = broadcast::channel(256);
        Self {
            api,
            handler,
            notifier,
            poll,
            registry: Arc::new(JobRegistry::new()),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            global_tx,
        }
    }

    /// Tracker backed by the HTTP API, downloading exports into
    /// `config.download_dir`.
    pub fn from_config(
        config: &ClientConfig,
        notifier: Arc<dyn Notifier>,
        confirm: Box<dyn Confirm>,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(HttpJobApi::new(config)?);
        let saver = DiskFileSaver::new(reqwest::Client::new(), &config.download_dir, confirm)
            .with_token(config.token.clone());
        let handler =
            DefaultTerminalHandler::new(notifier.clone(), Arc::new(saver), &config.content_url);
        Ok(Self::new(api, Arc::new(handler), notifier, config.poll.clone()))
    }

    /// Submit a new job for `action` and start polling it.
    ///
    /// A job the action tracked before is abandoned.
    pub async fn submit(
        &self,
        action: impl Into<ActionKey>,
        params: impl Into<JobParameters>,
    ) -> Result<JobWatch, SubmitError> {
        let action = action.into();
        let submission = Submission::new(params)?;
        let (ticket, previous) = self
            .registry
            .begin_submission(&action)
            .map_err(|source| SubmitError::Rejected {
                action: action.clone(),
                source,
            })?;
        if let Some((kind, id)) = previous {
            self.release(kind, &id);
        }

        let snapshot = match submission.send(self.api.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.registry.fail_submission(&ticket);
                return Err(e);
            }
        };
        self.registry.complete_submission(&ticket, &snapshot)?;

        let kind = snapshot.kind();
        let id = snapshot.id().to_string();
        let state = self.ensure_polling(kind, &id, Some(snapshot));
        Ok(self.watch_state(ticket, state))
    }

    /// Track a job created elsewhere.
    pub fn watch(
        &self,
        action: impl Into<ActionKey>,
        kind: JobKind,
        id: impl Into<JobId>,
    ) -> Result<JobWatch, SubmitError> {
        let action = action.into();
        let id = id.into();
        let (ticket, previous) = self
            .registry
            .track_existing(&action, kind, id.clone())
            .map_err(|source| SubmitError::Rejected {
                action: action.clone(),
                source,
            })?;
        if let Some((prev_kind, prev_id)) = previous {
            if (prev_kind, prev_id.as_str()) != (kind, id.as_str()) {
                self.release(prev_kind, &prev_id);
            }
        }
        let state = self.ensure_polling(kind, &id, None);
        Ok(self.watch_state(ticket, state))
    }

    /// Stop tracking for `action`. Its job's handler is suppressed unless
    /// another action still tracks the job.
    pub fn reset(&self, action: &ActionKey) {
        if let Some((kind, id)) = self.registry.reset(action) {
            tracing::info!(%action, %kind, job_id = %id, "action reset");
            self.release(kind, &id);
        }
    }

    pub fn status(&self, action: &ActionKey) -> ActionState {
        self.registry.state(action)
    }

    /// Latest snapshot read for a tracked job.
    pub fn snapshot(&self, kind: JobKind, id: &str) -> Option<JobSnapshot> {
        self.get_state(kind, id).and_then(|state| state.latest())
    }

    /// Progress of every job still being polled.
    pub fn active_jobs(&self) -> Vec<JobProgress> {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .filter(|state| state.phase().is_active())
                .map(|state| state.progress())
                .collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        }
    }

    /// Subscribe to progress updates of all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgress> {
        self.global_tx.subscribe()
    }

    fn watch_state(&self, ticket: Ticket, state: Arc<JobState>) -> JobWatch {
        // A job handled earlier does not fire again; settle the new watcher.
        if let JobPhase::Handled(outcome) = state.phase() {
            self.registry
                .settle_job(state.kind(), state.id(), outcome.status());
        }
        JobWatch {
            action: ticket.action,
            job_id: state.id().to_string(),
            kind: state.kind(),
            token: ticket.token,
            phase: state.watch_phase(),
            state,
        }
    }

    fn get_state(&self, kind: JobKind, id: &str) -> Option<Arc<JobState>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&(kind, id.to_string())).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// Reuse the job's live state, or start a poll task for it. A new state
    /// is seeded before its poll task starts.
    fn ensure_polling(&self, kind: JobKind, id: &str, seed: Option<JobSnapshot>) -> Arc<JobState> {
        let key = (kind, id.to_string());
        let state = {
            let mut jobs = match self.jobs.write() {
                Ok(jobs) => jobs,
                Err(poisoned) => {
                    tracing::error!("RwLock poisoned writing jobs map: {poisoned}");
                    poisoned.into_inner()
                }
            };
            if let Some(existing) = jobs.get(&key) {
                if !existing.is_cancelled() && !matches!(existing.phase(), JobPhase::Aborted { .. }) {
                    tracing::debug!(%kind, job_id = id, "joining existing poll");
                    return Arc::clone(existing);
                }
            }
            let state = Arc::new(JobState::new(key.1.clone(), kind, self.global_tx.clone()));
            if let Some(snapshot) = seed {
                state.seed(snapshot);
            }
            jobs.insert(key, Arc::clone(&state));
            state
        };

        let driver = Driver {
            api: Arc::clone(&self.api),
            handler: Arc::clone(&self.handler),
            notifier: Arc::clone(&self.notifier),
            poll: self.poll.clone(),
            registry: Arc::clone(&self.registry),
            jobs: Arc::clone(&self.jobs),
        };
        tokio::spawn(driver.run(Arc::clone(&state)));
        state
    }

    /// Cancel the job's poll once no action tracks it, and forget a handled
    /// job once no action refers to it.
    fn release(&self, kind: JobKind, id: &str) {
        if self.registry.is_tracked(kind, id) {
            return;
        }
        let Some(state) = self.get_state(kind, id) else {
            return;
        };
        if state.phase().is_active() {
            tracing::info!(%kind, job_id = id, "stopped polling abandoned job");
            state.cancel();
        } else if !self.registry.is_referenced(kind, id) {
            tracing::debug!(%kind, job_id = id, "forgetting handled job");
            forget(&self.jobs, &state);
        }
    }
}

/// Remove `state` from the map unless a newer state replaced it.
fn forget(jobs: &JobMap, state: &Arc<JobState>) {
    match jobs.write() {
        Ok(mut jobs) => {
            let key = (state.kind(), state.id().to_string());
            if jobs.get(&key).is_some_and(|current| Arc::ptr_eq(current, state)) {
                jobs.remove(&key);
            }
        }
        Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
    }
}

/// Everything a poll task needs, detached from the tracker's lifetime.
struct Driver {
    api: Arc<dyn JobApi>,
    handler: Arc<dyn TerminalHandler>,
    notifier: Arc<dyn Notifier>,
    poll: PollConfig,
    registry: Arc<JobRegistry>,
    jobs: Arc<JobMap>,
}

impl Driver {
    async fn run(self, state: Arc<JobState>) {
        let kind = state.kind();
        let id = state.id().to_string();
        let cancel = state.cancel_token();
        let stream = poll_job(self.api.clone(), kind, id.clone(), self.poll.clone());
        futures_util::pin_mut!(stream);

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = stream.next() => event,
            };
            match event {
                None => break,
                Some(PollEvent::Snapshot(snapshot)) => {
                    if state.observe(&snapshot) != Observation::TerminalEdge {
                        self.registry.observe_job(kind, &id, snapshot.status());
                        continue;
                    }
                    let Some(outcome) = TerminalOutcome::from_snapshot(&snapshot) else {
                        break;
                    };
                    self.complete(&state, &cancel, outcome).await;
                    break;
                }
                Some(PollEvent::FinishedWithoutResult) => {
                    if state.observe_status(JobStatus::Finished) == Observation::TerminalEdge {
                        let outcome = TerminalOutcome::Finished {
                            id: id.clone(),
                            kind,
                            result: None,
                        };
                        self.complete(&state, &cancel, outcome).await;
                    }
                    break;
                }
                Some(PollEvent::Failed { error, .. }) => {
                    state.record_failure(error.to_string());
                }
                Some(PollEvent::Aborted { failures }) => {
                    self.notifier.notify(
                        &format!("Error while polling the {} job {id}", kind.label()),
                        Severity::Error,
                    );
                    self.registry.release_job(kind, &id);
                    state.mark_aborted(failures);
                    break;
                }
            }
        }

        // Handled jobs stay while an action refers to them, so re-watching
        // returns the outcome.
        let handled = matches!(state.phase(), JobPhase::Handled(_));
        if !handled || !self.registry.is_referenced(kind, &id) {
            forget(&self.jobs, &state);
        }
    }

    /// Run the handler for a terminal edge, then settle every action on the job.
    async fn complete(&self, state: &JobState, cancel: &CancellationToken, outcome: TerminalOutcome) {
        if cancel.is_cancelled() {
            return;
        }
        let (kind, id, status) = (outcome.kind(), outcome.id().to_string(), outcome.status());
        self.registry.observe_job(kind, &id, status);
        tracing::info!(%kind, job_id = %id, %status, "job reached terminal state");
        self.handler.on_terminal(&outcome).await;
        self.registry.settle_job(kind, &id, status);
        state.mark_handled(outcome);
    }
}
