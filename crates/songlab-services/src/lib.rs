//! HTTP clients for the four analysis services.
//!
//! Each pipeline stage is served by an independent network service:
//! fingerprint identification, vocal-stem separation, transcription, and
//! lyric classification. This crate implements the [`AnalysisServices`]
//! trait from `songlab-core` over HTTP, with explicit per-service endpoints
//! and timeouts passed in at construction.
//!
//! [`AnalysisServices`]: songlab_core::services::AnalysisServices

pub mod http;

pub use http::{DEFAULT_STEMS_DIR, HttpAnalysisServices, ServiceEndpoints, ServiceTimeouts};
