use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::progress::ProgressSnapshot;

/// What the probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capability {
    /// Size of the resource from `Content-Length`.
    pub total_size: u64,
    /// Whether the server serves `Range: bytes=...` requests.
    pub range_supported: bool,
}

/// One download run, fixed once the probe has answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTask {
    pub source_url: String,
    pub destination: PathBuf,
    /// Number of ranges actually scheduled.
    pub worker_count: u32,
    pub total_size: u64,
    pub range_supported: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub task: DownloadTask,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub progress: ProgressSnapshot,
}
