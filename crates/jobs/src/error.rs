use std::path::PathBuf;

use dats_types::{PreconditionError, SnapshotError};
use thiserror::Error;

use crate::action::{ActionKey, ActionRejected};

/// Errors from the job HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid job snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Why a submission did not produce a tracked job.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Submission rejected for {action}: {source}")]
    Rejected {
        action: ActionKey,
        #[source]
        source: ActionRejected,
    },

    #[error("Failed to start job: {0}")]
    Api(#[from] ApiError),

    #[error("Submission for {0} was superseded before the server answered")]
    Superseded(ActionKey),
}

/// Failures of best-effort side effects (downloads, prompts).
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} returned {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not overwriting {path}")]
    Declined { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
