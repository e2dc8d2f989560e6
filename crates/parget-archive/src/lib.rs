//! Zip extraction with path sanitization for downloaded archives.
//!
//! # Architecture
//!
//! - `sanitize.rs` - Path sanitization (zip-slip prevention)
//! - `extract.rs` - Sequential zip walk
//! - `options.rs` - Stripping and traversal policy
//! - `report.rs` - What was written and what was skipped

pub use error::{Error, Result};
pub use extract::{extract_from_reader, extract_zip};
pub use options::{ExtractOptions, TraversalPolicy};
pub use report::{ArchiveReport, ExtractedEntry, SkippedEntry};
pub use sanitize::{SanitizedPath, sanitize_path};

mod error;
mod extract;
mod options;
mod report;
mod sanitize;
