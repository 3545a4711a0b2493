//! Export job payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{JobId, JobStatus};
use crate::timestamp;

/// What an export job exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportJobType {
    SingleProjectAllData,
    SingleProjectAllUser,
    SingleProjectAllTags,
    SingleProjectAllCodes,
    SingleProjectSelectedSdocs,
    SingleProjectSelectedSpanAnnotations,
    SingleProjectSelectedSentenceAnnotations,
    SingleUserAllData,
    SingleUserAllMemos,
    SingleUserLogbook,
    SingleDocAllUserAnnotations,
    SingleDocSingleUserAnnotations,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

/// Type-specific export parameters, tagged by `export_job_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "export_job_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportTarget {
    SingleProjectAllData { project_id: i64 },
    SingleProjectAllUser { project_id: i64 },
    SingleProjectAllTags { project_id: i64 },
    SingleProjectAllCodes { project_id: i64 },
    SingleProjectSelectedSdocs { project_id: i64, sdoc_ids: Vec<i64> },
    SingleProjectSelectedSpanAnnotations { project_id: i64, span_annotation_ids: Vec<i64> },
    SingleProjectSelectedSentenceAnnotations { project_id: i64, sentence_annotation_ids: Vec<i64> },
    SingleUserAllData { project_id: i64, user_id: i64 },
    SingleUserAllMemos { project_id: i64, user_id: i64 },
    SingleUserLogbook { project_id: i64, user_id: i64 },
    SingleDocAllUserAnnotations { project_id: i64, sdoc_id: i64 },
    SingleDocSingleUserAnnotations { project_id: i64, sdoc_id: i64, user_id: i64 },
}

impl ExportTarget {
    pub fn job_type(&self) -> ExportJobType {
        match self {
            Self::SingleProjectAllData { .. } => ExportJobType::SingleProjectAllData,
            Self::SingleProjectAllUser { .. } => ExportJobType::SingleProjectAllUser,
            Self::SingleProjectAllTags { .. } => ExportJobType::SingleProjectAllTags,
            Self::SingleProjectAllCodes { .. } => ExportJobType::SingleProjectAllCodes,
            Self::SingleProjectSelectedSdocs { .. } => ExportJobType::SingleProjectSelectedSdocs,
            Self::SingleProjectSelectedSpanAnnotations { .. } => {
                ExportJobType::SingleProjectSelectedSpanAnnotations
            }
            Self::SingleProjectSelectedSentenceAnnotations { .. } => {
                ExportJobType::SingleProjectSelectedSentenceAnnotations
            }
            Self::SingleUserAllData { .. } => ExportJobType::SingleUserAllData,
            Self::SingleUserAllMemos { .. } => ExportJobType::SingleUserAllMemos,
            Self::SingleUserLogbook { .. } => ExportJobType::SingleUserLogbook,
            Self::SingleDocAllUserAnnotations { .. } => ExportJobType::SingleDocAllUserAnnotations,
            Self::SingleDocSingleUserAnnotations { .. } => {
                ExportJobType::SingleDocSingleUserAnnotations
            }
        }
    }

    pub fn project_id(&self) -> i64 {
        match self {
            Self::SingleProjectAllData { project_id }
            | Self::SingleProjectAllUser { project_id }
            | Self::SingleProjectAllTags { project_id }
            | Self::SingleProjectAllCodes { project_id }
            | Self::SingleProjectSelectedSdocs { project_id, .. }
            | Self::SingleProjectSelectedSpanAnnotations { project_id, .. }
            | Self::SingleProjectSelectedSentenceAnnotations { project_id, .. }
            | Self::SingleUserAllData { project_id, .. }
            | Self::SingleUserAllMemos { project_id, .. }
            | Self::SingleUserLogbook { project_id, .. }
            | Self::SingleDocAllUserAnnotations { project_id, .. }
            | Self::SingleDocSingleUserAnnotations { project_id, .. } => *project_id,
        }
    }

    /// The explicit selection of a "selected items" export, if any.
    pub fn selection(&self) -> Option<&[i64]> {
        match self {
            Self::SingleProjectSelectedSdocs { sdoc_ids, .. } => Some(sdoc_ids),
            Self::SingleProjectSelectedSpanAnnotations { span_annotation_ids, .. } => {
                Some(span_annotation_ids)
            }
            Self::SingleProjectSelectedSentenceAnnotations { sentence_annotation_ids, .. } => {
                Some(sentence_annotation_ids)
            }
            _ => None,
        }
    }
}

/// Parameters of an export job.
///
/// On the wire the job type appears twice (outer and inside the specific
/// parameters); here it is derived from [`ExportTarget`] so the two can
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ExportJobParametersWire", try_from = "ExportJobParametersWire")]
pub struct ExportJobParameters {
    pub format: ExportFormat,
    pub target: ExportTarget,
}

impl ExportJobParameters {
    pub fn new(target: ExportTarget) -> Self {
        Self {
            format: ExportFormat::default(),
            target,
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct ExportJobParametersWire {
    export_job_type: ExportJobType,
    #[serde(default)]
    export_format: Option<ExportFormat>,
    specific_export_job_parameters: ExportTarget,
}

impl From<ExportJobParameters> for ExportJobParametersWire {
    fn from(params: ExportJobParameters) -> Self {
        Self {
            export_job_type: params.target.job_type(),
            export_format: Some(params.format),
            specific_export_job_parameters: params.target,
        }
    }
}

impl TryFrom<ExportJobParametersWire> for ExportJobParameters {
    type Error = String;

    fn try_from(wire: ExportJobParametersWire) -> Result<Self, Self::Error> {
        let inner = wire.specific_export_job_parameters.job_type();
        if inner != wire.export_job_type {
            return Err(format!(
                "export_job_type mismatch: {:?} vs specific parameters {:?}",
                wire.export_job_type, inner
            ));
        }
        Ok(Self {
            format: wire.export_format.unwrap_or_default(),
            target: wire.specific_export_job_parameters,
        })
    }
}

/// Export job as read from `GET /export/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJobRead {
    pub id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub results_url: Option<String>,
    pub parameters: ExportJobParameters,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parameters_serialize_duplicates_job_type() {
        let params = ExportJobParameters::new(ExportTarget::SingleProjectSelectedSpanAnnotations {
            project_id: 1,
            span_annotation_ids: vec![5, 6],
        });
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
                "export_format": "CSV",
                "specific_export_job_parameters": {
                    "export_job_type": "SINGLE_PROJECT_SELECTED_SPAN_ANNOTATIONS",
                    "project_id": 1,
                    "span_annotation_ids": [5, 6]
                }
            })
        );
    }

    #[test]
    fn test_parameters_reject_mismatched_job_type() {
        let json = serde_json::json!({
            "export_job_type": "SINGLE_PROJECT_ALL_DATA",
            "specific_export_job_parameters": {
                "export_job_type": "SINGLE_USER_LOGBOOK",
                "project_id": 1,
                "user_id": 2
            }
        });
        let err = serde_json::from_value::<ExportJobParameters>(json).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_read_defaults_status_and_format() {
        let json = serde_json::json!({
            "id": "exp-1",
            "parameters": {
                "export_job_type": "SINGLE_PROJECT_ALL_TAGS",
                "specific_export_job_parameters": {
                    "export_job_type": "SINGLE_PROJECT_ALL_TAGS",
                    "project_id": 3
                }
            },
            "created": "2024-05-01T10:00:00.000001"
        });
        let read: ExportJobRead = serde_json::from_value(json).unwrap();
        assert_eq!(read.status, JobStatus::Waiting);
        assert_eq!(read.parameters.format, ExportFormat::Csv);
        assert_eq!(read.parameters.target.project_id(), 3);
        assert!(read.results_url.is_none());
        assert!(read.updated.is_none());
    }

    #[test]
    fn test_selection_only_for_selected_exports() {
        let selected = ExportTarget::SingleProjectSelectedSdocs {
            project_id: 1,
            sdoc_ids: vec![],
        };
        assert_eq!(selected.selection(), Some(&[][..]));
        assert!(ExportTarget::SingleProjectAllData { project_id: 1 }.selection().is_none());
    }
}
