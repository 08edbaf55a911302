//! Job listing and inspection commands.

use anyhow::Result;
use serde::Deserialize;

use super::get_json;

pub async fn run(api_url: &str, id: Option<i64>) -> Result<()> {
    let client = reqwest::Client::new();
    match id {
        Some(id) => show(&client, api_url, id).await,
        None => list(&client, api_url).await,
    }
}

#[derive(Debug, Deserialize)]
struct JobRow {
    id: i64,
    status: String,
    current_stage: Option<String>,
    title: Option<String>,
}

async fn list(client: &reqwest::Client, api_url: &str) -> Result<()> {
    let value = get_json(client, &format!("{api_url}/api/jobs")).await?;
    let jobs: Vec<JobRow> = serde_json::from_value(value)?;

    if jobs.is_empty() {
        println!("No jobs in flight");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{:<8} {:<12} {:<10} {}",
            job.id,
            job.status,
            job.current_stage.as_deref().unwrap_or("-"),
            job.title.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn show(client: &reqwest::Client, api_url: &str, id: i64) -> Result<()> {
    let job = get_json(client, &format!("{api_url}/api/jobs/{id}")).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
