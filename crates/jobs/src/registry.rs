//! Action → tracked job mapping.
//!
//! Each entry is written only through its own action's submission, reset and
//! terminal handling. A new submission or reset bumps the entry's generation
//! and cancels its token, which invalidates the previous [`Ticket`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use dats_types::{JobId, JobKind, JobSnapshot, JobStatus};
use tokio_util::sync::CancellationToken;

use crate::action::{reduce, ActionEvent, ActionKey, ActionRejected, ActionState};
use crate::error::SubmitError;

/// Proof of which submission (or watch) an action is currently on.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub action: ActionKey,
    pub generation: u64,
    /// Cancelled once the action moves on.
    pub token: CancellationToken,
}

#[derive(Debug)]
struct Entry {
    state: ActionState,
    generation: u64,
    token: CancellationToken,
}

impl Entry {
    fn tracks(&self, kind: JobKind, id: &str) -> bool {
        matches!(&self.state, ActionState::Tracking { job_id, kind: k, .. } if job_id == id && *k == kind)
    }

    fn refers_to(&self, kind: JobKind, id: &str) -> bool {
        job_of(&self.state).is_some_and(|(k, job_id)| k == kind && job_id == id)
    }
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: RwLock<HashMap<ActionKey, Entry>>,
    next_generation: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `action` to `Submitting`. Returns the job the action tracked or
    /// settled on before, which is now abandoned by it.
    pub fn begin_submission(
        &self,
        action: &ActionKey,
    ) -> Result<(Ticket, Option<(JobKind, JobId)>), ActionRejected> {
        self.restart(action, &ActionEvent::Submit)
    }

    /// Start tracking an existing job.
    pub fn track_existing(
        &self,
        action: &ActionKey,
        kind: JobKind,
        job_id: JobId,
    ) -> Result<(Ticket, Option<(JobKind, JobId)>), ActionRejected> {
        self.restart(action, &ActionEvent::Watch { job_id, kind })
    }

    /// Record the create call's answer, unless the action moved on meanwhile.
    pub fn complete_submission(&self, ticket: &Ticket, snapshot: &JobSnapshot) -> Result<(), SubmitError> {
        let event = ActionEvent::Submitted {
            job_id: snapshot.id().to_string(),
            kind: snapshot.kind(),
            status: snapshot.status(),
        };
        match self.apply_current(ticket, &event) {
            Some(Ok(())) => Ok(()),
            Some(Err(source)) => Err(SubmitError::Rejected {
                action: ticket.action.clone(),
                source,
            }),
            None => Err(SubmitError::Superseded(ticket.action.clone())),
        }
    }

    pub fn fail_submission(&self, ticket: &Ticket) {
        if let Some(Err(e)) = self.apply_current(ticket, &ActionEvent::SubmitFailed) {
            tracing::warn!(action = %ticket.action, error = %e, "unexpected submit failure event");
        }
    }

    /// Apply an observed status to every action tracking the job.
    pub fn observe_job(&self, kind: JobKind, job_id: &str, status: JobStatus) {
        self.apply_tracking(kind, job_id, &ActionEvent::Observed(status));
    }

    /// The terminal handler ran: release the pending guard of every action
    /// tracking the job.
    pub fn settle_job(&self, kind: JobKind, job_id: &str, status: JobStatus) {
        self.apply_tracking(kind, job_id, &ActionEvent::Handled(status));
    }

    /// Polling gave up: return every action tracking the job to `Idle`.
    pub fn release_job(&self, kind: JobKind, job_id: &str) {
        self.apply_tracking(kind, job_id, &ActionEvent::Reset);
    }

    /// Return `action` to `Idle`. Returns the job it tracked or settled on.
    pub fn reset(&self, action: &ActionKey) -> Option<(JobKind, JobId)> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("RwLock poisoned writing registry: {e}");
                return None;
            }
        };
        let entry = entries.remove(action)?;
        entry.token.cancel();
        job_of(&entry.state)
    }

    pub fn state(&self, action: &ActionKey) -> ActionState {
        match self.entries.read() {
            Ok(entries) => entries
                .get(action)
                .map(|entry| entry.state.clone())
                .unwrap_or_default(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading registry: {e}");
                ActionState::default()
            }
        }
    }

    /// Whether any action still polls the job.
    pub fn is_tracked(&self, kind: JobKind, job_id: &str) -> bool {
        match self.entries.read() {
            Ok(entries) => entries.values().any(|entry| entry.tracks(kind, job_id)),
            Err(e) => {
                tracing::error!("RwLock poisoned reading registry: {e}");
                false
            }
        }
    }

    /// Whether any action still tracks or settled on the job.
    pub fn is_referenced(&self, kind: JobKind, job_id: &str) -> bool {
        match self.entries.read() {
            Ok(entries) => entries.values().any(|entry| entry.refers_to(kind, job_id)),
            Err(e) => {
                tracing::error!("RwLock poisoned reading registry: {e}");
                true
            }
        }
    }

    fn restart(
        &self,
        action: &ActionKey,
        event: &ActionEvent,
    ) -> Result<(Ticket, Option<(JobKind, JobId)>), ActionRejected> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => {
                tracing::error!("RwLock poisoned writing registry: {poisoned}");
                poisoned.into_inner()
            }
        };
        let current = entries
            .get(action)
            .map(|entry| entry.state.clone())
            .unwrap_or_default();
        let next = reduce(&current, event)?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let previous = entries.insert(
            action.clone(),
            Entry {
                state: next,
                generation,
                token: token.clone(),
            },
        );
        let abandoned = previous.and_then(|entry| {
            entry.token.cancel();
            job_of(&entry.state)
        });
        if let Some((kind, id)) = &abandoned {
            tracing::debug!(%action, %kind, job_id = %id, "action abandoned job");
        }

        Ok((
            Ticket {
                action: action.clone(),
                generation,
                token,
            },
            abandoned,
        ))
    }

    /// `None` if the ticket is stale.
    fn apply_current(&self, ticket: &Ticket, event: &ActionEvent) -> Option<Result<(), ActionRejected>> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("RwLock poisoned writing registry: {e}");
                return None;
            }
        };
        let entry = entries
            .get_mut(&ticket.action)
            .filter(|entry| entry.generation == ticket.generation)?;
        Some(reduce(&entry.state, event).map(|next| entry.state = next))
    }

    fn apply_tracking(&self, kind: JobKind, job_id: &str, event: &ActionEvent) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("RwLock poisoned writing registry: {e}");
                return;
            }
        };
        for (action, entry) in entries.iter_mut().filter(|(_, entry)| entry.tracks(kind, job_id)) {
            match reduce(&entry.state, event) {
                Ok(next) => entry.state = next,
                Err(e) => tracing::warn!(%action, error = %e, "registry event rejected"),
            }
        }
    }
}

/// The job an action is polling or settled on.
fn job_of(state: &ActionState) -> Option<(JobKind, JobId)> {
    match state {
        ActionState::Tracking { job_id, kind, .. } | ActionState::Settled { job_id, kind, .. } => {
            Some((*kind, job_id.clone()))
        }
        ActionState::Idle | ActionState::Submitting => None,
    }
}
