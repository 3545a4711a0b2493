// crates/jobs/src/poller.rs
//! Status poller for a single job.
//!
//! [`poll_job`] is a lazy stream: nothing is requested until it is first
//! polled, and dropping it stops polling. Restarting means calling it again.

use std::sync::Arc;

use dats_types::{JobId, JobKind, JobSnapshot, JobStatus, SnapshotError};
use futures_util::Stream;

use crate::api::JobApi;
use crate::config::PollConfig;
use crate::error::ApiError;

#[derive(Debug)]
pub enum PollEvent {
    /// A snapshot that does not regress the lifecycle.
    Snapshot(JobSnapshot),
    /// The server reported FINISHED but sent no result. Always the last event.
    FinishedWithoutResult,
    /// A read failed; polling continues after a backoff.
    Failed { attempt: u32, error: ApiError },
    /// `max_consecutive_failures` was reached. Always the last event.
    Aborted { failures: u32 },
}

/// Poll `id` until a terminal snapshot has been yielded.
///
/// The first read happens immediately. Snapshots that would move the status
/// backwards are logged and dropped. A FINISHED read without a result ends
/// the stream too; it is not retried.
pub fn poll_job(
    api: Arc<dyn JobApi>,
    kind: JobKind,
    id: JobId,
    config: PollConfig,
) -> impl Stream<Item = PollEvent> + Send {
    async_stream::stream! {
        let mut last: Option<JobStatus> = None;
        let mut failures: u32 = 0;

        loop {
            let delay = match api.get_job(kind, &id).await {
                Ok(snapshot) => {
                    failures = 0;
                    let status = snapshot.status();
                    match last {
                        Some(prev) if !prev.can_advance_to(status) => {
                            tracing::warn!(
                                %kind,
                                job_id = %id,
                                from = %prev,
                                to = %status,
                                "dropping regressed job status"
                            );
                        }
                        _ => {
                            last = Some(status);
                            let terminal = snapshot.is_terminal();
                            yield PollEvent::Snapshot(snapshot);
                            if terminal {
                                tracing::debug!(%kind, job_id = %id, %status, "polling finished");
                                break;
                            }
                        }
                    }
                    config.interval()
                }
                Err(ApiError::Snapshot(SnapshotError::MissingResult { .. })) => {
                    tracing::warn!(%kind, job_id = %id, "job finished without a result");
                    yield PollEvent::FinishedWithoutResult;
                    break;
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(%kind, job_id = %id, attempt = failures, error = %error, "job poll failed");
                    yield PollEvent::Failed { attempt: failures, error };
                    if config.max_consecutive_failures.is_some_and(|max| failures >= max) {
                        tracing::error!(%kind, job_id = %id, failures, "giving up polling job");
                        yield PollEvent::Aborted { failures };
                        break;
                    }
                    config.delay_after(failures)
                }
            };
            tokio::time::sleep(delay).await;
        }
    }
}
