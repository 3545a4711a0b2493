//! Web crawler job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{JobId, JobStatus};
use crate::timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerJobParameters {
    pub project_id: i64,
    pub urls: Vec<String>,
}

/// Crawler job as read from `GET /crawler/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerJobRead {
    pub id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    pub parameters: CrawlerJobParameters,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub updated: Option<DateTime<Utc>>,
}
