//! Song catalog commands.

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
struct SongRow {
    id: i64,
    title: Option<String>,
    artist: Option<String>,
    classification: Option<String>,
}

async fn list(client: &reqwest::Client, api_url: &str) -> Result<()> {
    let value = get_json(client, &format!("{api_url}/api/songs")).await?;
    let songs: Vec<SongRow> = serde_json::from_value(value)?;

    if songs.is_empty() {
        println!("Catalog is empty");
        return Ok(());
    }
    for song in songs {
        println!(
            "{:<8} {:<30} {:<20} {}",
            song.id,
            song.title.as_deref().unwrap_or("-"),
            song.artist.as_deref().unwrap_or("-"),
            song.classification.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn show(client: &reqwest::Client, api_url: &str, id: i64) -> Result<()> {
    let song = get_json(client, &format!("{api_url}/api/songs/{id}")).await?;
    println!("{}", serde_json::to_string_pretty(&song)?);
    Ok(())
}
