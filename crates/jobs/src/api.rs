//! HTTP surface of the job endpoints.
//!
//! [`JobApi`] is the seam the rest of the crate talks to; [`HttpJobApi`] is
//! the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use dats_types::{
    CotaRefinementJobRead, CrawlerJobRead, ExportJobRead, JobKind, JobParameters, JobSnapshot,
    LlmJobRead,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;

/// Create and read background jobs.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Issue the create call. Returns the server's initial snapshot.
    async fn create_job(&self, params: &JobParameters) -> Result<JobSnapshot, ApiError>;

    /// Read the current state of a job.
    async fn get_job(&self, kind: JobKind, id: &str) -> Result<JobSnapshot, ApiError>;
}

pub struct HttpJobApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpJobApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.api_url, config.token.clone()))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// All LLM jobs of a project, newest first.
    pub async fn list_llm_jobs(&self, project_id: i64) -> Result<Vec<JobSnapshot>, ApiError> {
        let reads: Vec<LlmJobRead> = self
            .send(self.request(Method::GET, &format!("/llm/project/{project_id}")))
            .await?;
        let mut snapshots = reads
            .into_iter()
            .map(JobSnapshot::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.created()));
        Ok(snapshots)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        match status {
            s if s.is_success() => {
                serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(body)),
            StatusCode::UNPROCESSABLE_ENTITY => Err(ApiError::Validation(body)),
            s => Err(ApiError::Status {
                status: s.as_u16(),
                body,
            }),
        }
    }

    async fn read<R>(&self, builder: RequestBuilder) -> Result<JobSnapshot, ApiError>
    where
        R: DeserializeOwned,
        JobSnapshot: TryFrom<R, Error = dats_types::SnapshotError>,
    {
        let read: R = self.send(builder).await?;
        Ok(JobSnapshot::try_from(read)?)
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn create_job(&self, params: &JobParameters) -> Result<JobSnapshot, ApiError> {
        tracing::debug!(kind = %params.kind(), "creating job");
        match params {
            JobParameters::Export(p) => {
                self.read::<ExportJobRead>(self.request(Method::POST, "/export").json(p))
                    .await
            }
            JobParameters::Llm(p) => {
                self.read::<LlmJobRead>(self.request(Method::POST, "/llm").json(p))
                    .await
            }
            JobParameters::CotaRefinement(r) => {
                let mut builder = self.request(Method::POST, &format!("/cota/refine/{}", r.cota_id));
                if let Some(hp) = &r.hyperparameters {
                    builder = builder.json(hp);
                }
                self.read::<CotaRefinementJobRead>(builder).await
            }
            JobParameters::Crawler(p) => {
                self.read::<CrawlerJobRead>(self.request(Method::POST, "/crawler").json(p))
                    .await
            }
        }
    }

    async fn get_job(&self, kind: JobKind, id: &str) -> Result<JobSnapshot, ApiError> {
        let id = urlencoding::encode(id);
        tracing::trace!(%kind, job_id = %id, "reading job");
        match kind {
            JobKind::Export => {
                self.read::<ExportJobRead>(self.request(Method::GET, &format!("/export/{id}")))
                    .await
            }
            JobKind::Llm => {
                self.read::<LlmJobRead>(self.request(Method::GET, &format!("/llm/{id}")))
                    .await
            }
            JobKind::CotaRefinement => {
                self.read::<CotaRefinementJobRead>(
                    self.request(Method::GET, &format!("/cota/refine/{id}")),
                )
                .await
            }
            JobKind::Crawler => {
                self.read::<CrawlerJobRead>(self.request(Method::GET, &format!("/crawler/{id}")))
                    .await
            }
        }
    }
}
