use serde::Serialize;

use crate::error::{Error, Result};

/// A contiguous byte span of the resource, fetched by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    /// Range index (0-based)
    pub index: u32,
    /// Starting byte offset
    pub start: u64,
    /// Ending byte offset (exclusive)
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive offset of the last byte, `None` for an empty range.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.end - 1)
    }

    /// Value for the `Range` request header, `None` for an empty range.
    ///
    /// ```
    /// use parget_fetch::ByteRange;
    ///
    /// let range = ByteRange { index: 0, start: 0, end: 250_000 };
    /// assert_eq!(range.header_value().as_deref(), Some("bytes=0-249999"));
    /// ```
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        self.last().map(|last| format!("bytes={}-{}", self.start, last))
    }
}

/// Split `total_size` bytes into `worker_count` contiguous ranges.
///
/// Every range but the last holds `total_size / worker_count` bytes; the last
/// one absorbs the remainder. The worker count is clamped to `total_size` so
/// no range is empty unless the resource is. An empty resource yields a
/// single empty range.
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if `worker_count` is 0.
pub fn partition(total_size: u64, worker_count: u32) -> Result<Vec<ByteRange>> {
    check_worker_count(worker_count)?;

    if total_size == 0 {
        return Ok(vec![ByteRange {
            index: 0,
            start: 0,
            end: 0,
        }]);
    }

    let count = u64::from(worker_count).min(total_size);
    let partial_size = total_size / count;

    let ranges = (0..count)
        .map(|i| {
            let start = i * partial_size;
            let end = if i == count - 1 {
                total_size
            } else {
                start + partial_size
            };
            ByteRange {
                index: i as u32,
                start,
                end,
            }
        })
        .collect();

    Ok(ranges)
}

/// Ranges for a probed resource: `partition` when the server accepts byte
/// ranges, otherwise one range spanning the whole resource.
pub fn plan_ranges(
    total_size: u64,
    worker_count: u32,
    range_supported: bool,
) -> Result<Vec<ByteRange>> {
    if range_supported {
        return partition(total_size, worker_count);
    }

    check_worker_count(worker_count)?;
    Ok(vec![ByteRange {
        index: 0,
        start: 0,
        end: total_size,
    }])
}

fn check_worker_count(worker_count: u32) -> Result<()> {
    if worker_count == 0 {
        return Err(Error::InvalidConfiguration(
            "worker count must be at least 1".into(),
        ));
    }
    Ok(())
}
