//! Song catalog endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;
use crate::error::ApiError;
use songlab_db::Song;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_songs))
        .route("/{id}", get(get_song))
}

async fn list_songs(State(state): State<AppState>) -> Result<Json<Vec<Song>>, ApiError> {
    let songs = state.songs.list(100).await?;
    Ok(Json(songs))
}

async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Song>, ApiError> {
    let song = state.songs.get(id).await?;
    Ok(Json(song))
}
