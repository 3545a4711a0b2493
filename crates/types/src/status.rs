//! Job status lifecycle and the closed set of job kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the server.
pub type JobId = String;

/// Status of a server-side background job.
///
/// Lifecycle: `Waiting → Running → {Finished | Erroneous}`. A job may skip
/// `Running` entirely; nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Waiting,
    Running,
    Finished,
    // The web frontend's generated enum spells it "ERRORNEOUS".
    #[serde(alias = "ERRORNEOUS")]
    Erroneous,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Waiting,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::Erroneous,
    ];

    /// `Finished` and `Erroneous` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Erroneous)
    }

    /// Whether an observer that last saw `self` may next see `next`.
    ///
    /// Seeing the same status again is always allowed (polls repeat).
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Waiting => true,
            Self::Running => next.is_terminal(),
            Self::Finished | Self::Erroneous => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Erroneous => "ERRONEOUS",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of background job. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Export,
    Llm,
    CotaRefinement,
    Crawler,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Llm => "llm",
            Self::CotaRefinement => "cota_refinement",
            Self::Crawler => "crawler",
        }
    }

    /// Human-readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Export => "Export",
            Self::Llm => "LLM",
            Self::CotaRefinement => "CotA refinement",
            Self::Crawler => "Crawler",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "export" => Ok(Self::Export),
            "llm" => Ok(Self::Llm),
            "cota" | "cota_refinement" => Ok(Self::CotaRefinement),
            "crawler" => Ok(Self::Crawler),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Erroneous.is_terminal());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Waiting.can_advance_to(JobStatus::Running));
        assert!(JobStatus::Waiting.can_advance_to(JobStatus::Erroneous));
        assert!(JobStatus::Running.can_advance_to(JobStatus::Finished));
        assert!(JobStatus::Running.can_advance_to(JobStatus::Running));

        assert!(!JobStatus::Running.can_advance_to(JobStatus::Waiting));
        assert!(!JobStatus::Finished.can_advance_to(JobStatus::Running));
        assert!(!JobStatus::Finished.can_advance_to(JobStatus::Erroneous));
        assert!(!JobStatus::Erroneous.can_advance_to(JobStatus::Finished));
    }

    #[test]
    fn test_status_wire_values() {
        let json = serde_json::to_string(&JobStatus::Erroneous).unwrap();
        assert_eq!(json, "\"ERRONEOUS\"");

        let status: JobStatus = serde_json::from_str("\"ERRORNEOUS\"").unwrap();
        assert_eq!(status, JobStatus::Erroneous);
        let status: JobStatus = serde_json::from_str("\"WAITING\"").unwrap();
        assert_eq!(status, JobStatus::Waiting);
    }

    #[test]
    fn test_job_kind_from_str() {
        assert_eq!("export".parse::<JobKind>().unwrap(), JobKind::Export);
        assert_eq!("COTA".parse::<JobKind>().unwrap(), JobKind::CotaRefinement);
        assert_eq!("cota-refinement".parse::<JobKind>().unwrap(), JobKind::CotaRefinement);
        assert!("preprocessing".parse::<JobKind>().is_err());
    }
}
