use dats_types::{JobParameters, JobSnapshot, SnapshotError};

use crate::api::JobApi;
use crate::error::{ApiError, SubmitError};

/// Parameters that passed the synchronous precondition checks.
///
/// Holding a `Submission` means `send` will issue exactly one create call.
#[derive(Debug, Clone)]
pub struct Submission {
    params: JobParameters,
}

impl Submission {
    pub fn new(params: impl Into<JobParameters>) -> Result<Self, dats_types::PreconditionError> {
        let params = params.into();
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &JobParameters {
        &self.params
    }

    /// Issue the create call. No retry.
    pub async fn send(&self, api: &dyn JobApi) -> Result<JobSnapshot, SubmitError> {
        let kind = self.params.kind();
        let snapshot = match api.create_job(&self.params).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "job submission failed");
                return Err(e.into());
            }
        };
        if snapshot.kind() != kind {
            return Err(ApiError::Snapshot(SnapshotError::KindMismatch {
                id: snapshot.id().to_string(),
                expected: kind,
                actual: snapshot.kind(),
            })
            .into());
        }
        tracing::info!(%kind, job_id = snapshot.id(), status = %snapshot.status(), "job submitted");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use dats_types::{
        CrawlerJobParameters, ExportJobParameters, ExportTarget, JobKind, JobStatus,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingApi {
        creates: AtomicUsize,
        reply_kind: JobKind,
    }

    #[async_trait]
    impl JobApi for CountingApi {
        async fn create_job(&self, _params: &JobParameters) -> Result<JobSnapshot, ApiError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(JobSnapshot::new("9", self.reply_kind, JobStatus::Waiting, None, Utc::now())?)
        }

        async fn get_job(&self, _kind: JobKind, id: &str) -> Result<JobSnapshot, ApiError> {
            Err(ApiError::NotFound(id.to_string()))
        }
    }

    #[test]
    fn test_precondition_checked_on_construction() {
        let err = Submission::new(CrawlerJobParameters {
            project_id: 1,
            urls: vec![],
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Nothing selected: select URLs to crawl first");
    }

    #[tokio::test]
    async fn test_send_issues_one_create() {
        let api = CountingApi {
            creates: AtomicUsize::new(0),
            reply_kind: JobKind::Export,
        };
        let submission = Submission::new(ExportJobParameters::new(
            ExportTarget::SingleProjectAllData { project_id: 3 },
        ))
        .unwrap();

        let snapshot = submission.send(&api).await.unwrap();
        assert_eq!(snapshot.id(), "9");
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_rejects_kind_mismatch() {
        let api = CountingApi {
            creates: AtomicUsize::new(0),
            reply_kind: JobKind::Llm,
        };
        let submission = Submission::new(ExportJobParameters::new(
            ExportTarget::SingleProjectAllTags { project_id: 3 },
        ))
        .unwrap();

        let err = submission.send(&api).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Api(ApiError::Snapshot(SnapshotError::KindMismatch { .. }))
        ));
    }
}
