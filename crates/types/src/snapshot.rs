//! Kind-independent view of a background job.
//!
//! Every `*JobRead` payload converts into a [`JobSnapshot`]. The conversion
//! enforces the lifecycle invariants: a result exists iff the job is
//! `FINISHED`, progress is only kept while `RUNNING`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::cota::{CotaRefinementJobRead, CotaRefinementRequest};
use crate::crawler::{CrawlerJobParameters, CrawlerJobRead};
use crate::export::{ExportJobParameters, ExportJobRead};
use crate::llm::{LlmJobParameters, LlmJobRead, LlmJobResult};
use crate::status::{JobId, JobKind, JobStatus};

/// Creation parameters, one variant per job kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParameters {
    Export(ExportJobParameters),
    Llm(LlmJobParameters),
    CotaRefinement(CotaRefinementRequest),
    Crawler(CrawlerJobParameters),
}

impl JobParameters {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Export(_) => JobKind::Export,
            Self::Llm(_) => JobKind::Llm,
            Self::CotaRefinement(_) => JobKind::CotaRefinement,
            Self::Crawler(_) => JobKind::Crawler,
        }
    }

    /// Synchronous checks that must pass before anything is sent.
    pub fn validate(&self) -> Result<(), PreconditionError> {
        match self {
            Self::Export(params) => match params.target.selection() {
                Some([]) => Err(PreconditionError::EmptySelection {
                    what: "items to export",
                }),
                _ => Ok(()),
            },
            Self::Llm(params) => {
                if params.task.sdoc_ids().is_empty() {
                    return Err(PreconditionError::EmptySelection { what: "documents" });
                }
                Ok(())
            }
            Self::CotaRefinement(_) => Ok(()),
            Self::Crawler(params) => {
                if params.urls.is_empty() {
                    return Err(PreconditionError::EmptySelection { what: "URLs to crawl" });
                }
                match params
                    .urls
                    .iter()
                    .find(|url| !(url.starts_with("http://") || url.starts_with("https://")))
                {
                    Some(bad) => Err(PreconditionError::InvalidUrl(bad.clone())),
                    None => Ok(()),
                }
            }
        }
    }
}

impl From<ExportJobParameters> for JobParameters {
    fn from(params: ExportJobParameters) -> Self {
        Self::Export(params)
    }
}

impl From<LlmJobParameters> for JobParameters {
    fn from(params: LlmJobParameters) -> Self {
        Self::Llm(params)
    }
}

impl From<CotaRefinementRequest> for JobParameters {
    fn from(request: CotaRefinementRequest) -> Self {
        Self::CotaRefinement(request)
    }
}

impl From<CrawlerJobParameters> for JobParameters {
    fn from(params: CrawlerJobParameters) -> Self {
        Self::Crawler(params)
    }
}

/// Rejected before submission; no job is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("Nothing selected: select {what} first")]
    EmptySelection { what: &'static str },

    #[error("Not an http(s) URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub results_url: String,
}

impl ExportResult {
    /// File name suggested for the download: the last path segment of the
    /// results URL.
    pub fn file_name(&self) -> &str {
        self.results_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("export.csv")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CotaRefinementResult {
    pub cota_id: i64,
    pub cota_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlerResult {
    pub output_dir: Option<String>,
    pub url_count: usize,
}

/// Result of a finished job, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Export(ExportResult),
    Llm(LlmJobResult),
    CotaRefinement(CotaRefinementResult),
    Crawler(CrawlerResult),
}

impl JobResult {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Export(_) => JobKind::Export,
            Self::Llm(_) => JobKind::Llm,
            Self::CotaRefinement(_) => JobKind::CotaRefinement,
            Self::Crawler(_) => JobKind::Crawler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// `(current, total)` when the server counts steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Progress {
    fn from_parts(current: u32, total: u32, description: Option<&str>) -> Option<Self> {
        let steps = (total > 0).then_some((current.min(total), total));
        let description = description
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);
        if steps.is_none() && description.is_none() {
            return None;
        }
        Some(Self { steps, description })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("{kind} job {id} is FINISHED but carries no result")]
    MissingResult { id: JobId, kind: JobKind },

    #[error("{expected} job {id} carries a {actual} result")]
    KindMismatch {
        id: JobId,
        expected: JobKind,
        actual: JobKind,
    },
}

/// Point-in-time read of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    id: JobId,
    kind: JobKind,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// Build a snapshot, enforcing "result iff FINISHED".
    ///
    /// A result on a non-finished job is dropped; a finished job without a
    /// result, or with a result of another kind, is rejected.
    pub fn new(
        id: impl Into<JobId>,
        kind: JobKind,
        status: JobStatus,
        result: Option<JobResult>,
        created: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        let id = id.into();
        if let Some(actual) = result.as_ref().map(JobResult::kind) {
            if actual != kind {
                return Err(SnapshotError::KindMismatch {
                    id,
                    expected: kind,
                    actual,
                });
            }
        }
        let result = match (status, result) {
            (JobStatus::Finished, None) => return Err(SnapshotError::MissingResult { id, kind }),
            (JobStatus::Finished, Some(result)) => Some(result),
            (_, _) => None,
        };
        Ok(Self {
            id,
            kind,
            status,
            progress: None,
            result,
            error_message: None,
            created,
            updated: None,
        })
    }

    /// Attach progress. Ignored unless the job is running.
    pub fn with_progress(mut self, progress: Option<Progress>) -> Self {
        if self.status == JobStatus::Running {
            self.progress = progress;
        }
        self
    }

    /// Attach the server's failure message. Ignored unless the job failed.
    pub fn with_error_message(mut self, message: Option<String>) -> Self {
        if self.status == JobStatus::Erroneous {
            self.error_message = message;
        }
        self
    }

    pub fn with_updated(mut self, updated: Option<DateTime<Utc>>) -> Self {
        self.updated = updated;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }
}

impl TryFrom<ExportJobRead> for JobSnapshot {
    type Error = SnapshotError;

    fn try_from(read: ExportJobRead) -> Result<Self, Self::Error> {
        let result = read
            .results_url
            .filter(|url| !url.is_empty())
            .map(|results_url| JobResult::Export(ExportResult { results_url }));
        Ok(JobSnapshot::new(read.id, JobKind::Export, read.status, result, read.created)?
            .with_updated(read.updated))
    }
}

impl TryFrom<LlmJobRead> for JobSnapshot {
    type Error = SnapshotError;

    fn try_from(read: LlmJobRead) -> Result<Self, Self::Error> {
        let progress = Progress::from_parts(
            read.current_step,
            read.num_steps_total,
            Some(read.current_step_description.as_str()),
        );
        let result = read.result.map(JobResult::Llm);
        Ok(JobSnapshot::new(read.id, JobKind::Llm, read.status, result, read.created)?
            .with_progress(progress)
            .with_updated(read.updated))
    }
}

impl TryFrom<CotaRefinementJobRead> for JobSnapshot {
    type Error = SnapshotError;

    fn try_from(read: CotaRefinementJobRead) -> Result<Self, Self::Error> {
        let progress = Progress::from_parts(0, 0, read.pipeline_step());
        // The refined COTA itself is the result; it is refetched by id.
        let result = (read.status == JobStatus::Finished).then(|| {
            JobResult::CotaRefinement(CotaRefinementResult {
                cota_id: read.cota.id,
                cota_name: read.cota.name.clone(),
            })
        });
        Ok(
            JobSnapshot::new(read.id, JobKind::CotaRefinement, read.status, result, read.created)?
                .with_progress(progress)
                .with_error_message(read.error_message)
                .with_updated(read.updated),
        )
    }
}

impl TryFrom<CrawlerJobRead> for JobSnapshot {
    type Error = SnapshotError;

    fn try_from(read: CrawlerJobRead) -> Result<Self, Self::Error> {
        let result = (read.status == JobStatus::Finished).then(|| {
            JobResult::Crawler(CrawlerResult {
                output_dir: read.output_dir.clone(),
                url_count: read.parameters.urls.len(),
            })
        });
        Ok(JobSnapshot::new(read.id, JobKind::Crawler, read.status, result, read.created)?
            .with_updated(read.updated))
    }
}
