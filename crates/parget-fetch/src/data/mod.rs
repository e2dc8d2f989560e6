//! Immutable data types for segmented downloads.
//!
//! Configuration, the task description fixed after probing, and the progress
//! records shared between workers, the aggregator and the caller.

pub mod options;
pub mod progress;
pub mod task;

pub use options::{
    DEFAULT_WORKER_COUNT, FetchOptions, OverwritePolicy, ProbeMethod, RangeUnitPolicy,
};
pub use progress::{ProgressSnapshot, RangeProgress};
pub use task::{Capability, DownloadReport, DownloadTask};
