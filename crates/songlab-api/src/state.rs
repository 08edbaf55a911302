//! Application state.

use songlab_db::{JobStore, SongStore};
use songlab_scheduler::Finalizer;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jobs: Arc<JobStore>,
    pub songs: Arc<SongStore>,
    /// Used only to retire zero-want jobs at intake; everything else is
    /// finalized by the workers.
    pub finalizer: Arc<Finalizer>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let jobs = Arc::new(JobStore::new(pool.clone()));
        let songs = Arc::new(SongStore::new(pool.clone()));
        let finalizer = Arc::new(Finalizer::new(pool.clone()));

        Self {
            pool,
            jobs,
            songs,
            finalizer,
        }
    }
}
