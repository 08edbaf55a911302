//! The analysis-service boundary.
//!
//! Each pipeline stage talks to one independent network service. This
//! trait is the narrow request/response contract the orchestration core
//! depends on; the HTTP implementation lives in `songlab-services`, and
//! tests substitute mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One candidate match returned by fingerprint identification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMatch {
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Result of fingerprint identification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identification {
    /// Candidate matches, best first. May be empty.
    pub matches: Vec<TrackMatch>,
    /// The raw acoustic fingerprint, when one could be computed.
    pub fingerprint: Option<String>,
    /// Track duration in seconds.
    pub duration: Option<i32>,
}

/// Result of stem separation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparatedStems {
    /// Path of the produced vocal-stem artifact. The call returns only
    /// once this file exists.
    pub file_path: String,
}

/// Result of transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub lyrics: String,
}

/// Result of lyric classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub accuracy: f64,
}

/// Clients for the four analysis services.
///
/// Every call is synchronous request/response with a bounded timeout;
/// any transport error, timeout, non-success response, or malformed body
/// is returned as an error and treated as stage failure by the caller.
#[async_trait]
pub trait AnalysisServices: Send + Sync {
    /// Fingerprint the audio file and look up candidate matches.
    async fn identify(&self, file_path: &str) -> Result<Identification>;

    /// Separate the vocal stem from the audio file, returning the path of
    /// the new working artifact once it is ready.
    async fn separate(&self, file_path: &str) -> Result<SeparatedStems>;

    /// Transcribe the vocal stem to text.
    async fn transcribe(&self, file_path: &str) -> Result<Transcript>;

    /// Classify lyrics text.
    async fn classify(&self, lyrics: &str) -> Result<Classification>;
}
