//! Concept-over-time analysis (COTA) refinement job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{JobId, JobStatus};
use crate::timestamp;

/// Optional tuning knobs sent as the body of `POST /cota/refine/{cota_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotaRefinementHyperparameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_required_annotations_per_concept: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_epochs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_space_topk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_space_threshold: Option<f64>,
}

/// Request to refine one COTA. The COTA id travels in the path.
#[derive(Debug, Clone, PartialEq)]
pub struct CotaRefinementRequest {
    pub cota_id: i64,
    pub hyperparameters: Option<CotaRefinementHyperparameters>,
}

impl CotaRefinementRequest {
    pub fn new(cota_id: i64) -> Self {
        Self {
            cota_id,
            hyperparameters: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CotaSummary {
    pub id: i64,
    pub name: String,
}

/// Refinement job as read from `GET /cota/refine/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CotaRefinementJobRead {
    pub id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub current_pipeline_step: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub cota: CotaSummary,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub updated: Option<DateTime<Utc>>,
}

impl CotaRefinementJobRead {
    /// Pipeline step worth displaying; the server reports `"None"` before
    /// the first step starts.
    pub fn pipeline_step(&self) -> Option<&str> {
        self.current_pipeline_step
            .as_deref()
            .filter(|step| !step.is_empty() && *step != "None")
    }
}
