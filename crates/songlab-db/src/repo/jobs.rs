//! Job store: durable in-flight pipeline work.
//!
//! The claim protocol lives here. Claiming is a single UPDATE over a
//! SKIP LOCKED subselect, so any number of workers can poll concurrently
//! without ever receiving the same row. Stage results are applied with a
//! `claimed_by` fence: if the lease expired and another worker took the
//! job over, the stale worker's write matches zero rows instead of
//! clobbering newer progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::time::Duration;

use songlab_core::{InputType, JobStatus, StageFlags, StageOutput, next_stage};

use crate::{DbError, DbResult};

use super::songs::SongDraft;

/// A job row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub input_type: String,
    pub status: String,
    pub current_stage: Option<String>,
    pub error: Option<String>,

    pub want_identify: bool,
    pub want_demucs: bool,
    pub want_whisper: bool,
    pub want_classify: bool,
    pub done_identify: bool,
    pub done_demucs: bool,
    pub done_whisper: bool,
    pub done_classify: bool,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub lyrics: Option<String>,
    pub classification: Option<String>,
    pub accuracy: Option<f64>,
    pub duration: Option<i32>,
    pub fingerprint: Option<String>,
    pub fingerprint_hash: Option<String>,
    pub file_path: Option<String>,
    pub audio_processed: bool,

    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn want_flags(&self) -> StageFlags {
        StageFlags {
            identify: self.want_identify,
            demucs: self.want_demucs,
            whisper: self.want_whisper,
            classify: self.want_classify,
        }
    }

    pub fn done_flags(&self) -> StageFlags {
        StageFlags {
            identify: self.done_identify,
            demucs: self.done_demucs,
            whisper: self.done_whisper,
            classify: self.done_classify,
        }
    }

    /// True when every wanted stage is done.
    pub fn is_complete(&self) -> bool {
        songlab_core::stage::is_complete(self.want_flags(), self.done_flags())
    }

    /// Song projection of the payload fields, if the job resolved a
    /// fingerprint hash. Jobs without one are retired without a song.
    pub fn song_draft(&self) -> Option<SongDraft> {
        let fingerprint_hash = self.fingerprint_hash.clone()?;
        Some(SongDraft {
            title: self.title.clone(),
            artist: self.artist.clone(),
            lyrics: self.lyrics.clone(),
            classification: self.classification.clone(),
            accuracy: self.accuracy,
            duration: self.duration,
            fingerprint: self.fingerprint.clone(),
            fingerprint_hash,
            file_path: self.file_path.clone(),
            audio_processed: self.audio_processed,
        })
    }
}

/// Parameters for creating a job.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub input_type: Option<InputType>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub lyrics: Option<String>,
    pub file_path: Option<String>,
    pub want: StageFlags,
}

/// The job-row field values after a successful stage, computed from the
/// claimed row plus the stage output. Incoming non-null values win;
/// existing values survive where the output carries nothing.
#[derive(Debug, Clone, PartialEq)]
struct StagePatch {
    title: Option<String>,
    artist: Option<String>,
    lyrics: Option<String>,
    classification: Option<String>,
    accuracy: Option<f64>,
    duration: Option<i32>,
    fingerprint: Option<String>,
    fingerprint_hash: Option<String>,
    file_path: Option<String>,
    audio_processed: bool,
    done: StageFlags,
    current_stage: Option<&'static str>,
}

impl StagePatch {
    fn compute(job: &Job, output: &StageOutput, already_satisfied: StageFlags) -> StagePatch {
        let mut patch = StagePatch {
            title: job.title.clone(),
            artist: job.artist.clone(),
            lyrics: job.lyrics.clone(),
            classification: job.classification.clone(),
            accuracy: job.accuracy,
            duration: job.duration,
            fingerprint: job.fingerprint.clone(),
            fingerprint_hash: job.fingerprint_hash.clone(),
            file_path: job.file_path.clone(),
            audio_processed: job.audio_processed,
            done: job.done_flags(),
            current_stage: None,
        };

        match output {
            StageOutput::Identified {
                title,
                artist,
                fingerprint,
                fingerprint_hash,
                duration,
            } => {
                patch.title = title.clone().or(patch.title);
                patch.artist = artist.clone().or(patch.artist);
                patch.fingerprint = fingerprint.clone().or(patch.fingerprint);
                patch.fingerprint_hash = fingerprint_hash.clone().or(patch.fingerprint_hash);
                patch.duration = duration.or(patch.duration);
            }
            StageOutput::Separated { file_path } => {
                patch.file_path = Some(file_path.clone());
                patch.audio_processed = true;
            }
            StageOutput::Transcribed { lyrics } => {
                patch.lyrics = Some(lyrics.clone());
            }
            StageOutput::Classified {
                classification,
                accuracy,
            } => {
                patch.classification = Some(classification.clone());
                patch.accuracy = Some(*accuracy);
            }
        }

        patch.done.set(output.stage(), true);
        patch.done = patch.done.union(already_satisfied);
        patch.current_stage = next_stage(job.want_flags(), patch.done).map(|s| s.as_str());
        patch
    }
}

/// Job store backed by PostgreSQL.
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new job. Status starts at `Queued` with the initial
    /// `current_stage` derived from the want flags.
    pub async fn create(&self, new: NewJob) -> DbResult<Job> {
        let input_type = new.input_type.unwrap_or(InputType::Audio);
        let current_stage = next_stage(new.want, StageFlags::NONE).map(|s| s.as_str());
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                input_type, status, current_stage,
                want_identify, want_demucs, want_whisper, want_classify,
                title, artist, lyrics, file_path
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(input_type.as_str())
        .bind(JobStatus::Queued.as_str())
        .bind(current_stage)
        .bind(new.want.identify)
        .bind(new.want.demucs)
        .bind(new.want.whisper)
        .bind(new.want.classify)
        .bind(&new.title)
        .bind(&new.artist)
        .bind(&new.lyrics)
        .bind(&new.file_path)
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn get(&self, id: i64) -> DbResult<Job> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        Ok(job)
    }

    pub async fn list(&self, limit: i64) -> DbResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY id DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    /// Claim the next eligible job for `worker_id`.
    ///
    /// Eligible means: status is `Queued` or `Not Started`, or `Claimed`
    /// with a lease older than `lease`; and at least one wanted stage is
    /// not done. Lowest id wins. SKIP LOCKED keeps concurrent claimants
    /// from blocking on or double-claiming the same row.
    pub async fn claim_next(&self, worker_id: &str, lease: Duration) -> DbResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'Claimed',
                claimed_by = $1,
                claimed_at = NOW(),
                updated_at = NOW(),
                current_stage = CASE
                    WHEN want_identify AND NOT done_identify THEN 'identify'
                    WHEN want_demucs AND NOT done_demucs THEN 'demucs'
                    WHEN want_whisper AND NOT done_whisper THEN 'whisper'
                    WHEN want_classify AND NOT done_classify THEN 'classify'
                END
            WHERE id = (
                SELECT id FROM jobs
                WHERE (status IN ('Queued', 'Not Started')
                       OR (status = 'Claimed'
                           AND claimed_at < NOW() - make_interval(secs => $2)))
                  AND ((want_identify AND NOT done_identify)
                       OR (want_demucs AND NOT done_demucs)
                       OR (want_whisper AND NOT done_whisper)
                       OR (want_classify AND NOT done_classify))
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Persist a successful stage execution and release the claim.
    ///
    /// Returns the updated row, or `None` when the fence failed because
    /// `worker_id` no longer owns the job (lease expired and it was
    /// reclaimed). The caller must then discard its work for this job.
    pub async fn apply_stage_output(
        &self,
        job: &Job,
        worker_id: &str,
        output: &StageOutput,
        already_satisfied: StageFlags,
    ) -> DbResult<Option<Job>> {
        let patch = StagePatch::compute(job, output, already_satisfied);
        let updated = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET title = $3, artist = $4, lyrics = $5, classification = $6,
                accuracy = $7, duration = $8, fingerprint = $9,
                fingerprint_hash = $10, file_path = $11, audio_processed = $12,
                done_identify = $13, done_demucs = $14,
                done_whisper = $15, done_classify = $16,
                current_stage = $17,
                status = 'Not Started',
                claimed_by = NULL, claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND claimed_by = $2 AND status = 'Claimed'
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(&patch.title)
        .bind(&patch.artist)
        .bind(&patch.lyrics)
        .bind(&patch.classification)
        .bind(patch.accuracy)
        .bind(patch.duration)
        .bind(&patch.fingerprint)
        .bind(&patch.fingerprint_hash)
        .bind(&patch.file_path)
        .bind(patch.audio_processed)
        .bind(patch.done.identify)
        .bind(patch.done.demucs)
        .bind(patch.done.whisper)
        .bind(patch.done.classify)
        .bind(patch.current_stage)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Mark a job as failed, recording the error detail. Fenced the same
    /// way as `apply_stage_output`; returns false when the claim was
    /// already lost. Claim bookkeeping is left in place on the failed row
    /// so it shows which worker failed it.
    pub async fn mark_failed(&self, job_id: i64, worker_id: &str, error: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'Failed', error = $3, updated_at = NOW()
            WHERE id = $1 AND claimed_by = $2 AND status = 'Claimed'
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Fetch a job under a row lock, inside a caller-owned transaction.
/// Returns `None` when the row is gone (already finalized).
pub async fn fetch_for_update(conn: &mut PgConnection, id: i64) -> DbResult<Option<Job>> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

/// Delete a job row, inside a caller-owned transaction.
pub async fn delete(conn: &mut PgConnection, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use songlab_core::Stage;

    fn bare_job(want: StageFlags, done: StageFlags) -> Job {
        Job {
            id: 1,
            input_type: "audio".to_string(),
            status: "Claimed".to_string(),
            current_stage: None,
            error: None,
            want_identify: want.identify,
            want_demucs: want.demucs,
            want_whisper: want.whisper,
            want_classify: want.classify,
            done_identify: done.identify,
            done_demucs: done.demucs,
            done_whisper: done.whisper,
            done_classify: done.classify,
            title: None,
            artist: None,
            lyrics: None,
            classification: None,
            accuracy: None,
            duration: None,
            fingerprint: None,
            fingerprint_hash: None,
            file_path: Some("input.wav".to_string()),
            audio_processed: false,
            claimed_by: Some("w1".to_string()),
            claimed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const ALL: StageFlags = StageFlags {
        identify: true,
        demucs: true,
        whisper: true,
        classify: true,
    };

    #[test]
    fn test_identify_patch_advances_to_demucs() {
        let job = bare_job(ALL, StageFlags::NONE);
        let output = StageOutput::Identified {
            title: Some("X".to_string()),
            artist: Some("Y".to_string()),
            fingerprint: Some("abc".to_string()),
            fingerprint_hash: Some("900150983cd24fb0d6963f7d28e17f72".to_string()),
            duration: Some(180),
        };
        let patch = StagePatch::compute(&job, &output, StageFlags::NONE);

        assert_eq!(patch.title.as_deref(), Some("X"));
        assert_eq!(patch.duration, Some(180));
        assert!(patch.done.identify);
        assert!(!patch.done.demucs);
        assert_eq!(patch.current_stage, Some(Stage::Demucs.as_str()));
    }

    #[test]
    fn test_identify_preserves_intake_fields() {
        let mut job = bare_job(ALL, StageFlags::NONE);
        job.title = Some("Intake Title".to_string());
        job.artist = Some("Intake Artist".to_string());

        // No matches: service returned a fingerprint but no metadata.
        let output = StageOutput::Identified {
            title: None,
            artist: None,
            fingerprint: Some("abc".to_string()),
            fingerprint_hash: Some("900150983cd24fb0d6963f7d28e17f72".to_string()),
            duration: None,
        };
        let patch = StagePatch::compute(&job, &output, StageFlags::NONE);

        assert_eq!(patch.title.as_deref(), Some("Intake Title"));
        assert_eq!(patch.artist.as_deref(), Some("Intake Artist"));
        assert_eq!(patch.fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_already_satisfied_skips_stages() {
        let job = bare_job(ALL, StageFlags::NONE);
        let output = StageOutput::Identified {
            title: None,
            artist: None,
            fingerprint: Some("abc".to_string()),
            fingerprint_hash: Some("900150983cd24fb0d6963f7d28e17f72".to_string()),
            duration: None,
        };
        // An existing song already has stems and lyrics: only classify
        // remains after identify.
        let satisfied = StageFlags {
            identify: false,
            demucs: true,
            whisper: true,
            classify: false,
        };
        let patch = StagePatch::compute(&job, &output, satisfied);

        assert!(patch.done.demucs);
        assert!(patch.done.whisper);
        assert_eq!(patch.current_stage, Some(Stage::Classify.as_str()));
    }

    #[test]
    fn test_separated_patch_replaces_working_file() {
        let job = bare_job(ALL, StageFlags {
            identify: true,
            demucs: false,
            whisper: false,
            classify: false,
        });
        let output = StageOutput::Separated {
            file_path: "vocal_stems/input.wav".to_string(),
        };
        let patch = StagePatch::compute(&job, &output, StageFlags::NONE);

        assert_eq!(patch.file_path.as_deref(), Some("vocal_stems/input.wav"));
        assert!(patch.audio_processed);
        assert_eq!(patch.current_stage, Some(Stage::Whisper.as_str()));
    }

    #[test]
    fn test_final_stage_clears_current_stage() {
        let job = bare_job(ALL, StageFlags {
            identify: true,
            demucs: true,
            whisper: true,
            classify: false,
        });
        let output = StageOutput::Classified {
            classification: "ballad".to_string(),
            accuracy: 0.93,
        };
        let patch = StagePatch::compute(&job, &output, StageFlags::NONE);

        assert_eq!(patch.classification.as_deref(), Some("ballad"));
        assert_eq!(patch.accuracy, Some(0.93));
        assert_eq!(patch.current_stage, None);
        assert!(songlab_core::stage::is_complete(job.want_flags(), patch.done));
    }
}

/// Integration tests that require a running PostgreSQL instance with
/// DATABASE_URL set. Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::test_support::{DB_LOCK, test_pool};

    fn want_all() -> StageFlags {
        StageFlags {
            identify: true,
            demucs: true,
            whisper: true,
            classify: true,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_claim_is_exclusive() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = std::sync::Arc::new(JobStore::new(pool));

        store
            .create(NewJob {
                want: want_all(),
                file_path: Some("a.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let lease = Duration::from_secs(3600);
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_next(&format!("w{i}"), lease).await.expect("claim")
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            if handle.await.expect("join").is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_claim_sets_stage_consistent_with_flags() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = JobStore::new(pool);

        store
            .create(NewJob {
                want: StageFlags {
                    identify: false,
                    demucs: false,
                    whisper: true,
                    classify: true,
                },
                file_path: Some("stem.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let job = store
            .claim_next("w1", Duration::from_secs(3600))
            .await
            .expect("claim")
            .expect("one eligible job");

        assert_eq!(job.status, "Claimed");
        assert_eq!(job.claimed_by.as_deref(), Some("w1"));
        let derived = next_stage(job.want_flags(), job.done_flags()).map(|s| s.as_str());
        assert_eq!(job.current_stage.as_deref(), derived);
        assert_eq!(job.current_stage.as_deref(), Some("whisper"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_expired_lease_is_reclaimed_and_fenced() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = JobStore::new(pool);

        store
            .create(NewJob {
                want: want_all(),
                file_path: Some("a.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let stale = store
            .claim_next("w1", Duration::from_secs(3600))
            .await
            .expect("claim")
            .expect("job");

        // Zero lease: w1's claim is immediately stale for w2.
        let taken = store
            .claim_next("w2", Duration::from_secs(0))
            .await
            .expect("claim")
            .expect("reclaim");
        assert_eq!(taken.id, stale.id);
        assert_eq!(taken.claimed_by.as_deref(), Some("w2"));

        // w1's late write must bounce off the fence.
        let output = StageOutput::Identified {
            title: None,
            artist: None,
            fingerprint: Some("abc".to_string()),
            fingerprint_hash: Some("900150983cd24fb0d6963f7d28e17f72".to_string()),
            duration: None,
        };
        let applied = store
            .apply_stage_output(&stale, "w1", &output, StageFlags::NONE)
            .await
            .expect("apply");
        assert!(applied.is_none());

        // w2 still owns it.
        let applied = store
            .apply_stage_output(&taken, "w2", &output, StageFlags::NONE)
            .await
            .expect("apply")
            .expect("fence holds for owner");
        assert_eq!(applied.status, "Not Started");
        assert!(applied.done_identify);
        assert_eq!(applied.current_stage.as_deref(), Some("demucs"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_failed_job_is_never_reclaimed() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = JobStore::new(pool);

        store
            .create(NewJob {
                want: want_all(),
                file_path: Some("a.wav".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");

        let job = store
            .claim_next("w1", Duration::from_secs(3600))
            .await
            .expect("claim")
            .expect("job");
        let recorded = store
            .mark_failed(job.id, "w1", "separation failed: HTTP 500")
            .await
            .expect("mark failed");
        assert!(recorded);

        let next = store
            .claim_next("w2", Duration::from_secs(0))
            .await
            .expect("claim");
        assert!(next.is_none());

        let failed = store.get(job.id).await.expect("get");
        assert_eq!(failed.status, "Failed");
        assert_eq!(
            failed.error.as_deref(),
            Some("separation failed: HTTP 500")
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_zero_want_jobs_are_never_claimed() {
        let _guard = DB_LOCK.lock().await;
        let pool = test_pool().await;
        let store = JobStore::new(pool);

        let job = store
            .create(NewJob {
                lyrics: Some("la la".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");
        assert_eq!(job.current_stage, None);

        let claimed = store
            .claim_next("w1", Duration::from_secs(3600))
            .await
            .expect("claim");
        assert!(claimed.is_none());
    }
}
