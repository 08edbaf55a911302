//! Job orchestration for Songlab.
//!
//! Workers claim jobs from the store, execute one analysis stage per
//! claim, and finalize completed jobs into the song catalog. Claiming
//! uses PostgreSQL SKIP LOCKED so any number of workers can run
//! concurrently without a central dispatcher.

pub mod executor;
pub mod finalizer;
pub mod worker;

pub use executor::{ExecutedStage, StageExecutor};
pub use finalizer::{FinalizeOutcome, Finalizer};
pub use worker::{Worker, WorkerConfig};
