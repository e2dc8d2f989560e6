//! I/O operations for segmented fetching.
//!
//! Everything that touches the network, the filesystem or spawns tasks lives
//! here. The pure decisions these functions make are delegated to
//! [`crate::core`].

mod file;
mod http;
mod probe;
mod progress;
mod segmented;
mod worker;

pub use file::OutputFile;
pub use http::{BoxStream, HttpClient, Response, ResponseHead};
pub use probe::{capability_from, probe};
pub use progress::{NoopSink, ProgressAggregator, ProgressSink, RangeReporter};
pub use segmented::{FetchState, SegmentedFetcher};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
