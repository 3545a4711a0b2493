//! Wire types shared by the DATS background-job client.
//!
//! Each job kind has its own create/read payloads (`export`, `llm`, `cota`,
//! `crawler`). They all normalize into a [`JobSnapshot`], which is what the
//! poller and the terminal handler work with.

pub mod cota;
pub mod crawler;
pub mod export;
pub mod llm;
pub mod snapshot;
pub mod status;
mod timestamp;

pub use cota::{CotaRefinementHyperparameters, CotaRefinementJobRead, CotaRefinementRequest, CotaSummary};
pub use crawler::{CrawlerJobParameters, CrawlerJobRead};
pub use export::{ExportFormat, ExportJobParameters, ExportJobRead, ExportJobType, ExportTarget};
pub use llm::{
    LlmJobParameters, LlmJobRead, LlmJobResult, LlmJobType, LlmPromptTemplate, LlmTask, LlmTaskResult,
};
pub use snapshot::{
    CotaRefinementResult, CrawlerResult, ExportResult, JobParameters, JobResult, JobSnapshot,
    PreconditionError, Progress, SnapshotError,
};
pub use status::{JobId, JobKind, JobStatus};
