//! Stage output types.
//!
//! Each stage produces exactly one field-set; the executor returns it to
//! the worker, which persists it in a single update. Nothing is written
//! to the job row until the external call has fully succeeded.

use serde::{Deserialize, Serialize};

use crate::Stage;

/// The fields written by one successful stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageOutput {
    /// Fingerprint identification. All fields optional: the service may
    /// find no match, and intake-provided title/artist must survive.
    Identified {
        title: Option<String>,
        artist: Option<String>,
        fingerprint: Option<String>,
        fingerprint_hash: Option<String>,
        duration: Option<i32>,
    },
    /// Stem separation produced a new working artifact.
    Separated { file_path: String },
    /// Transcription of the vocal stem.
    Transcribed { lyrics: String },
    /// Lyric classification with its confidence score.
    Classified {
        classification: String,
        accuracy: f64,
    },
}

impl StageOutput {
    /// The stage that produced this output.
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Identified { .. } => Stage::Identify,
            StageOutput::Separated { .. } => Stage::Demucs,
            StageOutput::Transcribed { .. } => Stage::Whisper,
            StageOutput::Classified { .. } => Stage::Classify,
        }
    }
}
