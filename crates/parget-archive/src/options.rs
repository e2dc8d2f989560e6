use std::path::Path;

use crate::Result;
use crate::sanitize::{SanitizedPath, sanitize_path};

/// What to do with an entry whose path would land outside the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TraversalPolicy {
    /// Fail the whole extraction.
    #[default]
    Abort,
    /// Leave the entry unwritten and list it in
    /// [`ArchiveReport::skipped`](crate::ArchiveReport::skipped).
    Skip,
}

#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Leading path components removed from every entry.
    pub strip_components: usize,
    pub traversal: TraversalPolicy,
}

impl ExtractOptions {
    #[must_use]
    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    #[must_use]
    pub fn traversal(mut self, policy: TraversalPolicy) -> Self {
        self.traversal = policy;
        self
    }

    /// Resolve `entry_name` beneath `base` with these options applied.
    pub fn sanitize_path(&self, entry_name: &str, base: &Path) -> Result<SanitizedPath> {
        sanitize_path(entry_name, base, self.strip_components)
    }
}
