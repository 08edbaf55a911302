//! Job status and intake types.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Lifecycle status of a job row.
///
/// Stored as text in the database; the string forms below are the wire
/// and storage representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum JobStatus {
    /// Freshly created, never claimed.
    #[display("Queued")]
    Queued,
    /// Between stages, ready to be claimed again.
    #[display("Not Started")]
    NotStarted,
    /// Owned by a worker that is executing its current stage.
    #[display("Claimed")]
    Claimed,
    /// A stage failed; requires out-of-band intervention to requeue.
    #[display("Failed")]
    Failed,
    /// All wanted stages done. Transient: finalization deletes the row in
    /// the same transaction, so this is only ever observed in projections.
    #[display("Complete")]
    Complete,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::NotStarted => "Not Started",
            JobStatus::Claimed => "Claimed",
            JobStatus::Failed => "Failed",
            JobStatus::Complete => "Complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Complete)
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Not Started" => Ok(JobStatus::NotStarted),
            "Claimed" => Ok(JobStatus::Claimed),
            "Failed" => Ok(JobStatus::Failed),
            "Complete" => Ok(JobStatus::Complete),
            other => Err(Error::InvalidInput(format!("unknown job status: {other}"))),
        }
    }
}

/// What kind of material a job was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// An uploaded audio file; `file_path` points at the working artifact.
    #[display("audio")]
    Audio,
    /// Text-only intake (lyrics supplied directly, typically for
    /// classification without any audio stages).
    #[display("text")]
    Text,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Audio => "audio",
            InputType::Text => "text",
        }
    }
}

impl FromStr for InputType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(InputType::Audio),
            "text" => Ok(InputType::Text),
            other => Err(Error::InvalidInput(format!("unknown input type: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::NotStarted,
            JobStatus::Claimed,
            JobStatus::Failed,
            JobStatus::Complete,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("Running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::NotStarted.is_terminal());
        assert!(!JobStatus::Claimed.is_terminal());
    }
}
