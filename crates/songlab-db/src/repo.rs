//! Store implementations.

pub mod jobs;
pub mod songs;

pub use jobs::{Job, JobStore, NewJob};
pub use songs::{Song, SongDraft, SongStore, merge};
