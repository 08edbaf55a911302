//! Analyze command: submit a job and optionally watch it.

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use songlab_core::{InputType, StageFlags};

/// One user-facing analysis product. Each maps to the pipeline stages
/// needed to produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Identify,
    Vocals,
    Lyrics,
    Classification,
}

fn parse_output(name: &str) -> Result<Output> {
    match name {
        "identify" => Ok(Output::Identify),
        "vocals" => Ok(Output::Vocals),
        "lyrics" => Ok(Output::Lyrics),
        "classification" => Ok(Output::Classification),
        other => bail!(
            "unknown output '{other}' (expected identify, vocals, lyrics or classification)"
        ),
    }
}

/// Requested outputs imply their prerequisite stages: vocals need
/// separation, lyrics need the vocal stem transcribed, classification
/// needs lyrics. Text intake carries lyrics already, so it skips the
/// audio stages entirely.
fn derive_want(outputs: &[Output], input_type: InputType) -> StageFlags {
    let mut want = StageFlags::NONE;
    for output in outputs {
        match output {
            Output::Identify => want.identify = true,
            Output::Vocals => want.demucs = true,
            Output::Lyrics => {
                want.demucs = true;
                want.whisper = true;
            }
            Output::Classification => {
                want.demucs = true;
                want.whisper = true;
                want.classify = true;
            }
        }
    }
    if input_type == InputType::Text {
        want.identify = false;
        want.demucs = false;
        want.whisper = false;
    }
    want
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    api_url: &str,
    file_path: Option<String>,
    input_type: &str,
    title: Option<String>,
    artist: Option<String>,
    lyrics: Option<String>,
    outputs: &[String],
    watch: bool,
) -> Result<()> {
    let input_type: InputType = input_type.parse().context("invalid --input-type")?;
    let outputs = outputs
        .iter()
        .map(|s| parse_output(s))
        .collect::<Result<Vec<_>>>()?;
    let want = derive_want(&outputs, input_type);
    ensure!(
        want.any(),
        "the requested outputs need audio input; nothing to do for text"
    );

    let client = reqwest::Client::new();
    let body = json!({
        "input_type": input_type.as_str(),
        "title": title,
        "artist": artist,
        "lyrics": lyrics,
        "file_path": file_path,
        "want": want,
    });

    let resp = client
        .post(format!("{api_url}/api/jobs"))
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("create job failed: HTTP {status} - {body}");
    }
    let created: CreateJobResponse = resp.json().await?;
    println!("Created job {} ({})", created.id, created.status);

    if watch {
        watch_job(&client, api_url, created.id).await?;
    }
    Ok(())
}

/// Poll the job once per second, printing each status/stage transition.
/// A 404 means the job finalized into the catalog.
async fn watch_job(client: &reqwest::Client, api_url: &str, id: i64) -> Result<()> {
    let url = format!("{api_url}/api/jobs/{id}");
    let mut last: Option<(String, Option<String>)> = None;

    loop {
        let resp = client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            println!("Job {id} finalized");
            return Ok(());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("watch failed: HTTP {status} - {body}");
        }
        let job: JobView = resp.json().await?;

        let state = (job.status.clone(), job.current_stage.clone());
        if last.as_ref() != Some(&state) {
            match &job.current_stage {
                Some(stage) => println!("{}  stage {}", job.status, stage),
                None => println!("{}", job.status),
            }
            last = Some(state);
        }

        if job.status == "Failed" {
            println!("Error: {}", job.error.unwrap_or_default());
            std::process::exit(1);
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    id: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobView {
    status: String,
    current_stage: Option<String>,
    error: Option<String>,
}
