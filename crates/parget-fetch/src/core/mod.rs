//! Pure transformations for segmented fetching.
//!
//! Partitioning, header interpretation and file naming. Nothing here touches
//! the network or the filesystem.

mod naming;
mod segment;
mod validation;

pub use naming::{destination_for, file_name_from_url, timestamped};
pub use segment::{ByteRange, partition, plan_ranges};
pub use validation::{
    AcceptRanges, ContentRange, accept_ranges, content_length, content_range, is_success,
};
