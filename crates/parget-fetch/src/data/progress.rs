use serde::Serialize;

/// Progress of one range.
///
/// Produced from the owning worker's reports and stored by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeProgress {
    pub range_index: u32,
    /// Bytes written to the output file so far.
    pub bytes_written: u64,
    /// Size of the range.
    pub expected_bytes: u64,
    pub done: bool,
    pub failed: bool,
}

impl RangeProgress {
    pub fn new(range_index: u32, expected_bytes: u64) -> Self {
        Self {
            range_index,
            bytes_written: 0,
            expected_bytes,
            done: false,
            failed: false,
        }
    }

    /// Integer completion percentage. An empty range counts as complete
    /// only once it is done.
    #[must_use]
    pub fn percentage(&self) -> u8 {
        percent_of(self.bytes_written, self.expected_bytes, self.done)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.done || self.failed
    }
}

/// Read-only copy of every range's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub ranges: Vec<RangeProgress>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.ranges.iter().map(|r| r.bytes_written).sum()
    }

    #[must_use]
    pub fn expected_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.expected_bytes).sum()
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        percent_of(self.bytes_written(), self.expected_bytes(), self.is_complete())
    }

    /// `true` once every range is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.ranges.is_empty() && self.ranges.iter().all(|r| r.done)
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.ranges.iter().any(|r| r.failed)
    }
}

pub(crate) fn percent_of(written: u64, expected: u64, done: bool) -> u8 {
    if expected == 0 {
        return if done { 100 } else { 0 };
    }
    let pct = u128::from(written.min(expected)) * 100 / u128::from(expected);
    pct as u8
}
