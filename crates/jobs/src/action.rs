//! Per-action state machine.
//!
//! An action is one user-triggerable control (a button, a CLI invocation)
//! that owns at most one tracked job. Its state only changes through
//! [`reduce`], which is pure and rejects illegal events.

use std::fmt;

use dats_types::{JobId, JobKind, JobStatus};
use thiserror::Error;

/// Identifies an action, e.g. `"export:project-1:span-annotations"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey(String);

impl ActionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ActionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionState {
    #[default]
    Idle,
    /// The create call is in flight.
    Submitting,
    /// A job is being polled. `status` is `None` until the first read.
    Tracking {
        job_id: JobId,
        kind: JobKind,
        status: Option<JobStatus>,
    },
    /// The terminal handler ran for the tracked job.
    Settled {
        job_id: JobId,
        kind: JobKind,
        status: JobStatus,
    },
}

impl ActionState {
    /// Whether the action still waits on something (the "pending" guard).
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Submitting => true,
            Self::Tracking { .. } => true,
            Self::Idle | Self::Settled { .. } => false,
        }
    }

    /// A create call is outstanding; a new submission would duplicate it.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting)
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Tracking { job_id, .. } | Self::Settled { job_id, .. } => Some(job_id),
            Self::Idle | Self::Submitting => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Tracking { .. } => "tracking",
            Self::Settled { .. } => "settled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    Submit,
    Submitted {
        job_id: JobId,
        kind: JobKind,
        status: JobStatus,
    },
    SubmitFailed,
    /// Start tracking a job created elsewhere.
    Watch { job_id: JobId, kind: JobKind },
    Observed(JobStatus),
    Handled(JobStatus),
    Reset,
}

impl ActionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Submitted { .. } => "submitted",
            Self::SubmitFailed => "submit_failed",
            Self::Watch { .. } => "watch",
            Self::Observed(_) => "observed",
            Self::Handled(_) => "handled",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {state}")]
pub struct ActionRejected {
    pub state: &'static str,
    pub event: &'static str,
}

/// Apply `event` to `state`.
///
/// A regressing `Observed` status is not an error: the state is returned
/// unchanged and the caller decides whether to log it.
pub fn reduce(state: &ActionState, event: &ActionEvent) -> Result<ActionState, ActionRejected> {
    let reject = || ActionRejected {
        state: state.name(),
        event: event.name(),
    };

    match (state, event) {
        (_, ActionEvent::Reset) => Ok(ActionState::Idle),

        (ActionState::Submitting, ActionEvent::Submit) => Err(reject()),
        (_, ActionEvent::Submit) => Ok(ActionState::Submitting),

        (ActionState::Submitting, ActionEvent::Submitted { job_id, kind, status }) => {
            Ok(ActionState::Tracking {
                job_id: job_id.clone(),
                kind: *kind,
                status: Some(*status),
            })
        }
        (ActionState::Submitting, ActionEvent::SubmitFailed) => Ok(ActionState::Idle),
        (_, ActionEvent::Submitted { .. } | ActionEvent::SubmitFailed) => Err(reject()),

        (ActionState::Submitting, ActionEvent::Watch { .. }) => Err(reject()),
        (_, ActionEvent::Watch { job_id, kind }) => Ok(ActionState::Tracking {
            job_id: job_id.clone(),
            kind: *kind,
            status: None,
        }),

        (
            ActionState::Tracking {
                job_id,
                kind,
                status,
            },
            ActionEvent::Observed(next),
        ) => {
            let advances = status.map_or(true, |last| last.can_advance_to(*next));
            if !advances {
                return Ok(state.clone());
            }
            Ok(ActionState::Tracking {
                job_id: job_id.clone(),
                kind: *kind,
                status: Some(*next),
            })
        }
        (_, ActionEvent::Observed(_)) => Err(reject()),

        (ActionState::Tracking { job_id, kind, .. }, ActionEvent::Handled(status))
            if status.is_terminal() =>
        {
            Ok(ActionState::Settled {
                job_id: job_id.clone(),
                kind: *kind,
                status: *status,
            })
        }
        (_, ActionEvent::Handled(_)) => Err(reject()),
    }
}
