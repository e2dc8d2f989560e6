use std::path::PathBuf;

use serde::Serialize;

/// Summary of one extraction.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ArchiveReport {
    /// Entries written, directories included.
    pub entry_count: usize,
    /// Bytes of file content written.
    pub total_bytes: u64,
    pub entries: Vec<ExtractedEntry>,
    /// Entries left unwritten under [`TraversalPolicy::Skip`](crate::TraversalPolicy::Skip).
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExtractedEntry {
    pub original_path: String,
    pub target_path: PathBuf,
    pub size: u64,
    pub mode: Option<u32>,
    pub is_directory: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedEntry {
    pub original_path: String,
    pub reason: String,
}
