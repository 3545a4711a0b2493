//! Terminal state handling.
//!
//! [`TerminalGuard`] detects the edge into a terminal status so the handler
//! fires once per job no matter how often the terminal snapshot is seen.

use std::sync::Arc;

use async_trait::async_trait;
use dats_types::{JobId, JobKind, JobResult, JobSnapshot, JobStatus};
use serde::Serialize;

use crate::effects::{FileSaver, Notifier, Severity};

/// What a job ended with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    /// `result` is `None` when the server reported FINISHED without one.
    Finished {
        id: JobId,
        kind: JobKind,
        result: Option<JobResult>,
    },
    Erroneous {
        id: JobId,
        kind: JobKind,
        message: Option<String>,
    },
}

impl TerminalOutcome {
    /// `None` for non-terminal snapshots.
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Option<Self> {
        match snapshot.status() {
            JobStatus::Finished => Some(Self::Finished {
                id: snapshot.id().to_string(),
                kind: snapshot.kind(),
                result: snapshot.result().cloned(),
            }),
            JobStatus::Erroneous => Some(Self::Erroneous {
                id: snapshot.id().to_string(),
                kind: snapshot.kind(),
                message: snapshot.error_message().map(str::to_string),
            }),
            JobStatus::Waiting | JobStatus::Running => None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Finished { id, .. } | Self::Erroneous { id, .. } => id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Finished { kind, .. } | Self::Erroneous { kind, .. } => *kind,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Finished { .. } => JobStatus::Finished,
            Self::Erroneous { .. } => JobStatus::Erroneous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Older than what was already seen; ignore.
    Regressed,
    /// Non-terminal, or a repeat of the same non-terminal status.
    Progressed,
    /// First terminal status: run the handler.
    TerminalEdge,
    /// Terminal status seen again after the edge.
    AlreadyTerminal,
}

/// Compares each status against the previous one.
#[derive(Debug, Default, Clone)]
pub struct TerminalGuard {
    last: Option<JobStatus>,
    fired: bool,
}

impl TerminalGuard {
    pub fn observe(&mut self, status: JobStatus) -> Observation {
        if let Some(last) = self.last {
            if !last.can_advance_to(status) {
                return Observation::Regressed;
            }
        }
        self.last = Some(status);
        if !status.is_terminal() {
            return Observation::Progressed;
        }
        if self.fired {
            return Observation::AlreadyTerminal;
        }
        self.fired = true;
        Observation::TerminalEdge
    }

    pub fn last(&self) -> Option<JobStatus> {
        self.last
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// Hook run once per terminal transition.
#[async_trait]
pub trait TerminalHandler: Send + Sync {
    async fn on_terminal(&self, outcome: &TerminalOutcome);
}

/// Join the content base URL and a result locator.
///
/// Absolute `http(s)` locators are used as-is.
pub fn content_locator(content_url: &str, results_url: &str) -> String {
    if results_url.starts_with("http://") || results_url.starts_with("https://") {
        return results_url.to_string();
    }
    format!(
        "{}/{}",
        content_url.trim_end_matches('/'),
        results_url.trim_start_matches('/')
    )
}

/// Downloads finished exports, reports everything else via the notifier.
pub struct DefaultTerminalHandler {
    notifier: Arc<dyn Notifier>,
    saver: Arc<dyn FileSaver>,
    content_url: String,
}

impl DefaultTerminalHandler {
    pub fn new(notifier: Arc<dyn Notifier>, saver: Arc<dyn FileSaver>, content_url: &str) -> Self {
        Self {
            notifier,
            saver,
            content_url: content_url.to_string(),
        }
    }

    async fn on_finished(&self, id: &str, result: &JobResult) {
        match result {
            JobResult::Export(export) => {
                let url = content_locator(&self.content_url, &export.results_url);
                match self.saver.download_file(&url, export.file_name()).await {
                    Ok(path) => self.notifier.notify(
                        &format!("Export job {id} finished: saved {}", path.display()),
                        Severity::Success,
                    ),
                    Err(e) => {
                        tracing::warn!(job_id = id, %url, error = %e, "export download failed");
                        self.notifier
                            .notify(&format!("Export job {id} finished but {e}"), Severity::Error);
                    }
                }
            }
            JobResult::Llm(llm) => self.notifier.notify(
                &format!(
                    "LLM job {id} finished: suggestions for {} document(s)",
                    llm.document_count()
                ),
                Severity::Success,
            ),
            JobResult::CotaRefinement(cota) => self.notifier.notify(
                &format!(
                    "CotA refinement job {id} finished: refined \"{}\" ({})",
                    cota.cota_name, cota.cota_id
                ),
                Severity::Success,
            ),
            JobResult::Crawler(crawl) => {
                let target = crawl.output_dir.as_deref().unwrap_or("the project");
                self.notifier.notify(
                    &format!(
                        "Crawler job {id} finished: {} URL(s) crawled into {target}",
                        crawl.url_count
                    ),
                    Severity::Success,
                );
            }
        }
    }
}

#[async_trait]
impl TerminalHandler for DefaultTerminalHandler {
    async fn on_terminal(&self, outcome: &TerminalOutcome) {
        match outcome {
            TerminalOutcome::Finished {
                id,
                result: Some(result),
                ..
            } => self.on_finished(id, result).await,
            TerminalOutcome::Finished {
                id,
                kind,
                result: None,
            } => {
                tracing::warn!(%kind, job_id = %id, "job finished without a result");
                self.notifier.notify(
                    &format!("{} job {id} finished without a result", kind.label()),
                    Severity::Error,
                );
            }
            TerminalOutcome::Erroneous { id, kind, message } => {
                let text = match message {
                    Some(message) => format!("{} job {id} failed: {message}", kind.label()),
                    None => format!("{} job {id} failed", kind.label()),
                };
                self.notifier.notify(&text, Severity::Error);
            }
        }
    }
}
