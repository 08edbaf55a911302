//! Core domain types and traits for the Songlab analysis pipeline.
//!
//! This crate contains:
//! - Stage definitions and the want/done flag model
//! - Job status and intake types
//! - Stage output types
//! - Fingerprint hashing
//! - The `AnalysisServices` trait implemented by the HTTP client layer

pub mod error;
pub mod fingerprint;
pub mod job;
pub mod output;
pub mod services;
pub mod stage;

pub use error::{Error, Result};
pub use job::{InputType, JobStatus};
pub use output::StageOutput;
pub use stage::{Stage, StageFlags, next_stage};
