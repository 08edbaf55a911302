//! Finalization: promoting completed jobs into the song catalog.
//!
//! A job whose wanted stages are all done is projected into a song,
//! upserted under the catalog merge rule, and its row deleted, all in one
//! transaction. Calling finalize on a job that is already gone is a
//! harmless no-op, so every worker may call it after every stage.

use sqlx::PgPool;
use tracing::info;

use songlab_db::DbResult;
use songlab_db::repo::{jobs, songs};

/// What a finalize attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Wanted stages remain; the job stays in the store.
    Pending,
    /// The job was promoted into the catalog and its row deleted.
    Finalized { song_id: i64 },
    /// The job completed without a fingerprint hash and was retired
    /// with no catalog entry.
    Retired,
    /// The job row no longer exists (already finalized).
    Gone,
}

pub struct Finalizer {
    pool: PgPool,
}

impl Finalizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Promote the job if every wanted stage is done.
    ///
    /// Completeness is recomputed from the row under a row lock, so a
    /// stale caller cannot finalize a job another worker has already
    /// advanced past or retired.
    pub async fn finalize_if_ready(&self, job_id: i64) -> DbResult<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(job) = jobs::fetch_for_update(&mut *tx, job_id).await? else {
            return Ok(FinalizeOutcome::Gone);
        };
        if !job.is_complete() {
            return Ok(FinalizeOutcome::Pending);
        }

        let outcome = match job.song_draft() {
            Some(draft) => {
                let song = songs::upsert(&mut *tx, &draft).await?;
                FinalizeOutcome::Finalized { song_id: song.id }
            }
            None => FinalizeOutcome::Retired,
        };
        jobs::delete(&mut *tx, job_id).await?;
        tx.commit().await?;

        match outcome {
            FinalizeOutcome::Finalized { song_id } => {
                info!(job_id, song_id, "Job finalized into catalog");
            }
            FinalizeOutcome::Retired => {
                info!(job_id, "Job retired without a fingerprint");
            }
            _ => {}
        }
        Ok(outcome)
    }
}

/// Integration tests that require a running PostgreSQL instance with
/// DATABASE_URL set. Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::test_support::{DB_LOCK, test_pool};
    use songlab_core::{StageFlags, StageOutput};
    use songlab_db::{JobStore, NewJob, SongStore};
    use std::time::Duration;

    #[tokio::test]
    #[ignore]
    async fn test_incomplete_job_is_left_alone() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = JobStore::new(pool.clone());
        let finalizer = Finalizer::new(pool);

        let job = store
            .create(NewJob {
                want: StageFlags {
                    identify: true,
                    demucs: false,
                    whisper: false,
                    classify: false,
                },
                file_path: Some("a.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let outcome = finalizer.finalize_if_ready(job.id).await.expect("finalize");
        assert_eq!(outcome, FinalizeOutcome::Pending);
        assert!(store.get(job.id).await.is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn test_finalize_is_idempotent() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let jobs = JobStore::new(pool.clone());
        let songs = SongStore::new(pool.clone());
        let finalizer = Finalizer::new(pool);

        let job = jobs
            .create(NewJob {
                want: StageFlags {
                    identify: true,
                    demucs: false,
                    whisper: false,
                    classify: false,
                },
                file_path: Some("a.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let claimed = jobs
            .claim_next("w1", Duration::from_secs(3600))
            .await
            .expect("claim")
            .expect("job");
        let output = StageOutput::Identified {
            title: Some("X".to_string()),
            artist: Some("Y".to_string()),
            fingerprint: Some("abc".to_string()),
            fingerprint_hash: Some("900150983cd24fb0d6963f7d28e17f72".to_string()),
            duration: Some(180),
        };
        jobs.apply_stage_output(&claimed, "w1", &output, StageFlags::NONE)
            .await
            .expect("apply")
            .expect("fence holds");

        let first = finalizer.finalize_if_ready(job.id).await.expect("finalize");
        let song_id = match first {
            FinalizeOutcome::Finalized { song_id } => song_id,
            other => panic!("expected finalized, got {other:?}"),
        };

        let second = finalizer.finalize_if_ready(job.id).await.expect("finalize");
        assert_eq!(second, FinalizeOutcome::Gone);

        assert!(jobs.get(job.id).await.is_err());
        let catalog = songs.list(10).await.expect("list");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, song_id);
        assert_eq!(catalog[0].title.as_deref(), Some("X"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_zero_want_job_retires_without_song() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let jobs = JobStore::new(pool.clone());
        let songs = SongStore::new(pool.clone());
        let finalizer = Finalizer::new(pool);

        let job = jobs
            .create(NewJob {
                lyrics: Some("la la".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let outcome = finalizer.finalize_if_ready(job.id).await.expect("finalize");
        assert_eq!(outcome, FinalizeOutcome::Retired);
        assert!(jobs.get(job.id).await.is_err());
        assert!(songs.list(10).await.expect("list").is_empty());

        // Again: the row is gone.
        let outcome = finalizer.finalize_if_ready(job.id).await.expect("finalize");
        assert_eq!(outcome, FinalizeOutcome::Gone);
    }
}
