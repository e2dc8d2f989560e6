//! Segmented HTTP downloading into a single pre-sized file.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`] - Pure transformations
//! - effects - I/O operations with trait abstraction
//!
//! # Key Features
//!
//! - **Probe First**: one metadata request learns the size and range support
//! - **Disjoint Ranges**: every worker owns one byte range and writes it at its
//!   absolute offset, so the shared file needs no lock
//! - **Fail Fast**: the first failing range cancels its siblings
//! - **Mechanism-Only**: no retries and no cleanup; the caller decides

pub mod core;
pub mod data;
mod effects;
mod error;

pub use crate::core::ByteRange;
pub use data::{
    Capability, DEFAULT_WORKER_COUNT, DownloadReport, DownloadTask, FetchOptions,
    OverwritePolicy, ProbeMethod, ProgressSnapshot, RangeProgress, RangeUnitPolicy,
};
pub use effects::{
    BoxStream, FetchState, HttpClient, NoopSink, OutputFile, ProgressAggregator, ProgressSink,
    RangeReporter, Response, ResponseHead, SegmentedFetcher, capability_from, probe,
};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestClient;

pub use error::{Error, Result, Stage};
