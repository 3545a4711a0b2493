//! LLM assistant job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{JobId, JobStatus};
use crate::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LlmJobType {
    DocumentTagging,
    MetadataExtraction,
    Annotation,
    SentenceAnnotation,
}

/// One prompt pair per document language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmPromptTemplate {
    pub language: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Task-specific parameters, tagged by `llm_job_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "llm_job_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LlmTask {
    DocumentTagging { sdoc_ids: Vec<i64>, tag_ids: Vec<i64> },
    MetadataExtraction { sdoc_ids: Vec<i64>, project_metadata_ids: Vec<i64> },
    Annotation { sdoc_ids: Vec<i64>, code_ids: Vec<i64> },
    SentenceAnnotation { sdoc_ids: Vec<i64>, code_ids: Vec<i64> },
}

impl LlmTask {
    pub fn job_type(&self) -> LlmJobType {
        match self {
            Self::DocumentTagging { .. } => LlmJobType::DocumentTagging,
            Self::MetadataExtraction { .. } => LlmJobType::MetadataExtraction,
            Self::Annotation { .. } => LlmJobType::Annotation,
            Self::SentenceAnnotation { .. } => LlmJobType::SentenceAnnotation,
        }
    }

    pub fn sdoc_ids(&self) -> &[i64] {
        match self {
            Self::DocumentTagging { sdoc_ids, .. }
            | Self::MetadataExtraction { sdoc_ids, .. }
            | Self::Annotation { sdoc_ids, .. }
            | Self::SentenceAnnotation { sdoc_ids, .. } => sdoc_ids,
        }
    }
}

/// Parameters of an LLM job (`POST /llm`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "LlmJobParametersWire", try_from = "LlmJobParametersWire")]
pub struct LlmJobParameters {
    pub project_id: i64,
    pub prompts: Vec<LlmPromptTemplate>,
    pub task: LlmTask,
}

#[derive(Serialize, Deserialize)]
struct LlmJobParametersWire {
    llm_job_type: LlmJobType,
    project_id: i64,
    #[serde(default)]
    prompts: Vec<LlmPromptTemplate>,
    specific_task_parameters: LlmTask,
}

impl From<LlmJobParameters> for LlmJobParametersWire {
    fn from(params: LlmJobParameters) -> Self {
        Self {
            llm_job_type: params.task.job_type(),
            project_id: params.project_id,
            prompts: params.prompts,
            specific_task_parameters: params.task,
        }
    }
}

impl TryFrom<LlmJobParametersWire> for LlmJobParameters {
    type Error = String;

    fn try_from(wire: LlmJobParametersWire) -> Result<Self, Self::Error> {
        let inner = wire.specific_task_parameters.job_type();
        if inner != wire.llm_job_type {
            return Err(format!(
                "llm_job_type mismatch: {:?} vs specific parameters {:?}",
                wire.llm_job_type, inner
            ));
        }
        Ok(Self {
            project_id: wire.project_id,
            prompts: wire.prompts,
            task: wire.specific_task_parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTaggingResult {
    pub sdoc_id: i64,
    #[serde(default)]
    pub current_tag_ids: Vec<i64>,
    #[serde(default)]
    pub suggested_tag_ids: Vec<i64>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataExtractionResult {
    pub sdoc_id: i64,
    #[serde(default)]
    pub current_metadata: Vec<serde_json::Value>,
    #[serde(default)]
    pub suggested_metadata: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSuggestionResult {
    pub sdoc_id: i64,
    #[serde(default)]
    pub suggested_annotations: Vec<serde_json::Value>,
}

/// Task-specific result, tagged by `llm_job_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "llm_job_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LlmTaskResult {
    DocumentTagging { results: Vec<DocumentTaggingResult> },
    MetadataExtraction { results: Vec<MetadataExtractionResult> },
    Annotation { results: Vec<AnnotationSuggestionResult> },
    SentenceAnnotation { results: Vec<AnnotationSuggestionResult> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmJobResult {
    pub llm_job_type: LlmJobType,
    pub specific_task_result: LlmTaskResult,
}

impl LlmJobResult {
    /// Number of documents the job produced suggestions for.
    pub fn document_count(&self) -> usize {
        match &self.specific_task_result {
            LlmTaskResult::DocumentTagging { results } => results.len(),
            LlmTaskResult::MetadataExtraction { results } => results.len(),
            LlmTaskResult::Annotation { results } | LlmTaskResult::SentenceAnnotation { results } => {
                results.len()
            }
        }
    }
}

/// LLM job as read from `GET /llm/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmJobRead {
    pub id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub num_steps_total: u32,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub current_step_description: String,
    #[serde(default)]
    pub result: Option<LlmJobResult>,
    pub parameters: LlmJobParameters,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagging_params() -> LlmJobParameters {
        LlmJobParameters {
            project_id: 7,
            prompts: vec![],
            task: LlmTask::DocumentTagging {
                sdoc_ids: vec![1, 2],
                tag_ids: vec![10],
            },
        }
    }

    #[test]
    fn test_parameters_wire_shape() {
        let json = serde_json::to_value(tagging_params()).unwrap();
        assert_eq!(json["llm_job_type"], "DOCUMENT_TAGGING");
        assert_eq!(json["project_id"], 7);
        assert_eq!(json["specific_task_parameters"]["llm_job_type"], "DOCUMENT_TAGGING");
        assert_eq!(json["specific_task_parameters"]["sdoc_ids"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_read_with_tagging_result() {
        let json = serde_json::json!({
            "id": "llm-9",
            "status": "FINISHED",
            "num_steps_total": 2,
            "current_step": 2,
            "current_step_description": "done",
            "result": {
                "llm_job_type": "DOCUMENT_TAGGING",
                "specific_task_result": {
                    "llm_job_type": "DOCUMENT_TAGGING",
                    "results": [
                        {"sdoc_id": 1, "current_tag_ids": [], "suggested_tag_ids": [10], "reasoning": "mentions budget"},
                        {"sdoc_id": 2, "suggested_tag_ids": []}
                    ]
                }
            },
            "parameters": serde_json::to_value(tagging_params()).unwrap(),
            "created": "2024-05-01T10:00:00",
            "updated": "2024-05-01T10:05:00"
        });
        let read: LlmJobRead = serde_json::from_value(json).unwrap();
        let result = read.result.unwrap();
        assert_eq!(result.document_count(), 2);
        assert_eq!(read.parameters, tagging_params());
    }
}
