//! Song store: the permanent, deduplicated catalog.
//!
//! Songs are keyed by `fingerprint_hash`. All writes go through the
//! merge rule: an incoming field only overwrites when it is non-null,
//! and `audio_processed` only ever moves from false to true.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::{DbError, DbResult};

/// A song row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Song {
    pub id: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub lyrics: Option<String>,
    pub classification: Option<String>,
    pub accuracy: Option<f64>,
    pub duration: Option<i32>,
    pub fingerprint: Option<String>,
    pub fingerprint_hash: String,
    pub file_path: Option<String>,
    pub audio_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An incoming song projection, built from a completed job's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongDraft {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub lyrics: Option<String>,
    pub classification: Option<String>,
    pub accuracy: Option<f64>,
    pub duration: Option<i32>,
    pub fingerprint: Option<String>,
    pub fingerprint_hash: String,
    pub file_path: Option<String>,
    pub audio_processed: bool,
}

/// Merge an incoming draft over an existing song: incoming non-null
/// fields win, existing values survive a null, and `audio_processed` is
/// OR'd so it never regresses.
pub fn merge(existing: &Song, incoming: &SongDraft) -> SongDraft {
    SongDraft {
        title: incoming.title.clone().or_else(|| existing.title.clone()),
        artist: incoming.artist.clone().or_else(|| existing.artist.clone()),
        lyrics: incoming.lyrics.clone().or_else(|| existing.lyrics.clone()),
        classification: incoming
            .classification
            .clone()
            .or_else(|| existing.classification.clone()),
        accuracy: incoming.accuracy.or(existing.accuracy),
        duration: incoming.duration.or(existing.duration),
        fingerprint: incoming
            .fingerprint
            .clone()
            .or_else(|| existing.fingerprint.clone()),
        fingerprint_hash: existing.fingerprint_hash.clone(),
        file_path: incoming
            .file_path
            .clone()
            .or_else(|| existing.file_path.clone()),
        audio_processed: existing.audio_processed || incoming.audio_processed,
    }
}

/// Song store backed by PostgreSQL.
pub struct SongStore {
    pool: PgPool,
}

impl SongStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> DbResult<Song> {
        let song = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("song {}", id)))?;
        Ok(song)
    }

    pub async fn list(&self, limit: i64) -> DbResult<Vec<Song>> {
        let songs =
            sqlx::query_as::<_, Song>("SELECT * FROM songs ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(songs)
    }

    /// Dedupe lookup. Absence is normal, not an error.
    pub async fn get_by_fingerprint_hash(&self, hash: &str) -> DbResult<Option<Song>> {
        let song = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE fingerprint_hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(song)
    }
}

/// Upsert a draft into the catalog under the merge rule, inside a
/// caller-owned transaction. Returns the affected row.
///
/// The existing row (if any) is locked and merged in Rust; the INSERT
/// branch carries an ON CONFLICT clause mirroring the same rule, which
/// only fires when two transactions race to insert the same new hash.
pub async fn upsert(conn: &mut PgConnection, draft: &SongDraft) -> DbResult<Song> {
    let existing = sqlx::query_as::<_, Song>(
        "SELECT * FROM songs WHERE fingerprint_hash = $1 FOR UPDATE",
    )
    .bind(&draft.fingerprint_hash)
    .fetch_optional(&mut *conn)
    .await?;

    let song = match existing {
        Some(current) => {
            let merged = merge(&current, draft);
            sqlx::query_as::<_, Song>(
                r#"
                UPDATE songs
                SET title = $2, artist = $3, lyrics = $4, classification = $5,
                    accuracy = $6, duration = $7, fingerprint = $8,
                    file_path = $9, audio_processed = $10, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(current.id)
            .bind(&merged.title)
            .bind(&merged.artist)
            .bind(&merged.lyrics)
            .bind(&merged.classification)
            .bind(merged.accuracy)
            .bind(merged.duration)
            .bind(&merged.fingerprint)
            .bind(&merged.file_path)
            .bind(merged.audio_processed)
            .fetch_one(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, Song>(
                r#"
                INSERT INTO songs (
                    title, artist, lyrics, classification, accuracy,
                    duration, fingerprint, fingerprint_hash, file_path,
                    audio_processed
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (fingerprint_hash) DO UPDATE SET
                    title = COALESCE(EXCLUDED.title, songs.title),
                    artist = COALESCE(EXCLUDED.artist, songs.artist),
                    lyrics = COALESCE(EXCLUDED.lyrics, songs.lyrics),
                    classification = COALESCE(EXCLUDED.classification, songs.classification),
                    accuracy = COALESCE(EXCLUDED.accuracy, songs.accuracy),
                    duration = COALESCE(EXCLUDED.duration, songs.duration),
                    fingerprint = COALESCE(EXCLUDED.fingerprint, songs.fingerprint),
                    file_path = COALESCE(EXCLUDED.file_path, songs.file_path),
                    audio_processed = songs.audio_processed OR EXCLUDED.audio_processed,
                    updated_at = NOW()
                RETURNING *
                "#,
            )
            .bind(&draft.title)
            .bind(&draft.artist)
            .bind(&draft.lyrics)
            .bind(&draft.classification)
            .bind(draft.accuracy)
            .bind(draft.duration)
            .bind(&draft.fingerprint)
            .bind(&draft.fingerprint_hash)
            .bind(&draft.file_path)
            .bind(draft.audio_processed)
            .fetch_one(&mut *conn)
            .await?
        }
    };
    Ok(song)
}
