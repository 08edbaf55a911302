//! API server for Songlab.
//!
//! HTTP intake and query surface over the job queue and song catalog.
//! Jobs are created here and drained by the worker pool; this crate
//! never executes stages itself.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
