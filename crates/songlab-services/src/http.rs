//! reqwest-backed implementation of [`AnalysisServices`].
//!
//! Deployment convention shared by all four services: audio artifacts live
//! on a shared volume, requests upload the file bytes, and the separation
//! service writes its vocal stem under the stems directory using the same
//! base name as the input file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use songlab_core::services::{
    AnalysisServices, Classification, Identification, SeparatedStems, TrackMatch, Transcript,
};
use songlab_core::{Error, Result};

/// Default location of produced vocal stems on the shared volume.
pub const DEFAULT_STEMS_DIR: &str = "/shared_data/vocal_stems";

// The separation service only responds after writing its output, but
// shared-volume visibility can lag the HTTP response slightly.
const ARTIFACT_WAIT: Duration = Duration::from_secs(30);
const ARTIFACT_POLL: Duration = Duration::from_millis(200);

/// Base URLs of the four analysis services, without trailing slash.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub identify: String,
    pub separate: String,
    pub transcribe: String,
    pub classify: String,
}

/// Per-request timeouts, sized to each service's latency class.
///
/// Identification and classification answer in seconds; separation and
/// transcription run model inference and can take many minutes.
#[derive(Debug, Clone)]
pub struct ServiceTimeouts {
    pub connect: Duration,
    pub identify: Duration,
    pub separate: Duration,
    pub transcribe: Duration,
    pub classify: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            identify: Duration::from_secs(120),
            separate: Duration::from_secs(900),
            transcribe: Duration::from_secs(600),
            classify: Duration::from_secs(60),
        }
    }
}

/// HTTP client for the analysis services.
///
/// One reqwest client is shared across all four services; each request
/// carries its own deadline from [`ServiceTimeouts`].
pub struct HttpAnalysisServices {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
    timeouts: ServiceTimeouts,
    stems_dir: PathBuf,
}

impl HttpAnalysisServices {
    pub fn new(
        endpoints: ServiceEndpoints,
        timeouts: ServiceTimeouts,
        stems_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| Error::Service(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoints,
            timeouts,
            stems_dir: stems_dir.into(),
        })
    }

    /// Where the separation service will have written the stem for `file_name`.
    fn stem_path(&self, file_name: &str) -> PathBuf {
        self.stems_dir.join(file_name)
    }
}

#[async_trait]
impl AnalysisServices for HttpAnalysisServices {
    async fn identify(&self, file_path: &str) -> Result<Identification> {
        let file_name = base_name(file_path)?;
        let bytes = read_file(file_path).await?;

        tracing::debug!(file = %file_name, "requesting fingerprint identification");

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.clone()))
            .text("filename", file_name);
        let response = self
            .client
            .post(format!("{}/identify", self.endpoints.identify))
            .multipart(form)
            .timeout(self.timeouts.identify)
            .send()
            .await
            .map_err(|e| request_error("identify", e))?;
        let body: IdentifyResponse = read_json("identify", response).await?;

        Ok(Identification {
            matches: body.matches,
            fingerprint: body.fingerprint,
            duration: body.duration.map(|d| d.round() as i32),
        })
    }

    async fn separate(&self, file_path: &str) -> Result<SeparatedStems> {
        let file_name = base_name(file_path)?;
        let bytes = read_file(file_path).await?;

        tracing::debug!(file = %file_name, "requesting stem separation");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.clone()));
        let response = self
            .client
            .post(format!("{}/separate", self.endpoints.separate))
            .multipart(form)
            .timeout(self.timeouts.separate)
            .send()
            .await
            .map_err(|e| request_error("separate", e))?;
        let body: SeparateResponse = read_json("separate", response).await?;

        // The service answers 200 with a status field even when separation
        // failed inside the model.
        if body.status != "ok" {
            return Err(Error::Service(format!(
                "separate reported failure: {}",
                body.message.unwrap_or_else(|| "no detail".to_string())
            )));
        }

        let stem = self.stem_path(&file_name);
        wait_for_artifact(&stem).await?;

        Ok(SeparatedStems {
            file_path: stem.to_string_lossy().into_owned(),
        })
    }

    async fn transcribe(&self, file_path: &str) -> Result<Transcript> {
        let stem_name = base_name(file_path)?;

        tracing::debug!(stem = %stem_name, "requesting transcription");

        let response = self
            .client
            .get(format!("{}/transcribe", self.endpoints.transcribe))
            .query(&[("stem_name", stem_name.as_str())])
            .timeout(self.timeouts.transcribe)
            .send()
            .await
            .map_err(|e| request_error("transcribe", e))?;
        let body: TranscribeResponse = read_json("transcribe", response).await?;

        Ok(Transcript {
            lyrics: body.lyrics.unwrap_or_default(),
        })
    }

    async fn classify(&self, lyrics: &str) -> Result<Classification> {
        tracing::debug!(lyrics_len = lyrics.len(), "requesting classification");

        let response = self
            .client
            .post(format!("{}/classify", self.endpoints.classify))
            .json(&serde_json::json!({ "lyrics": lyrics }))
            .timeout(self.timeouts.classify)
            .send()
            .await
            .map_err(|e| request_error("classify", e))?;
        let body: ClassifyResponse = read_json("classify", response).await?;

        Ok(Classification {
            label: body.classification,
            accuracy: body.accuracy,
        })
    }
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    #[serde(default)]
    matches: Vec<TrackMatch>,
    fingerprint: Option<String>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SeparateResponse {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    lyrics: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    classification: String,
    accuracy: f64,
}

fn request_error(ctx: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{ctx} call exceeded its deadline: {err}"))
    } else {
        Error::Service(format!("{ctx} request failed: {err}"))
    }
}

async fn read_json<T: DeserializeOwned>(ctx: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Service(format!(
            "{ctx} failed: HTTP {status} - {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| Error::InvalidResponse(format!("{ctx} returned a malformed body: {e}")))
}

fn base_name(file_path: &str) -> Result<String> {
    Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidInput(format!("no file name in path: {file_path}")))
}

async fn read_file(file_path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(file_path)
        .await
        .map_err(|e| Error::InvalidInput(format!("cannot read {file_path}: {e}")))
}

async fn wait_for_artifact(path: &Path) -> Result<()> {
    let deadline = tokio::time::Instant::now() + ARTIFACT_WAIT;
    loop {
        match tokio::fs::try_exists(path).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                return Err(Error::Service(format!(
                    "cannot stat {}: {e}",
                    path.display()
                )));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "stem artifact never appeared: {}",
                path.display()
            )));
        }
        tokio::time::sleep(ARTIFACT_POLL).await;
    }
}
