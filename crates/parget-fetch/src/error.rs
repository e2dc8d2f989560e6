//! Error types for parget-fetch.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which part of a run an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The capability probe.
    Probe,
    /// The fetch of one range, by index.
    Range(u32),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Probe => write!(f, "probe"),
            Stage::Range(index) => write!(f, "part {index}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("server reported no usable content length for {url}")]
    Probe { url: String },

    #[error("server advertises ranges in unit '{unit}', only 'bytes' is supported")]
    UnsupportedRangeUnit { unit: String },

    #[error("part {index} unfinished: received {received} of {expected} bytes")]
    ShortRead {
        index: u32,
        expected: u64,
        received: u64,
    },

    #[error("part {index} short write at offset {offset}: wrote {written} of {len} bytes")]
    ShortWrite {
        index: u32,
        offset: u64,
        written: usize,
        len: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    #[error("unexpected HTTP status {status} during {stage}")]
    HttpStatus { stage: Stage, status: u16 },

    #[error("part {index} expected {expected} bytes but server declared {declared}")]
    LengthMismatch {
        index: u32,
        expected: u64,
        declared: u64,
    },

    #[error("part {index} requested {requested} but server answered with {served}")]
    RangeMismatch {
        index: u32,
        requested: String,
        served: String,
    },

    #[error("part {index} received more than its {expected} bytes")]
    Overrun { index: u32, expected: u64 },

    #[error("network error during {stage}: {message}")]
    Network { stage: Stage, message: String },

    #[error("part {index} failed to write at offset {offset}: {source}")]
    Write {
        index: u32,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare destination {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("download timed out")]
    TimedOut,

    #[error("worker for part {index} terminated abnormally")]
    WorkerPanicked { index: u32 },
}

impl Error {
    pub(crate) fn network(stage: Stage, e: impl std::error::Error) -> Self {
        Error::Network {
            stage,
            message: e.to_string(),
        }
    }

    /// Returns `true` for errors caused by cancellation rather than by a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
