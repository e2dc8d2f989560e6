/// Range capability as advertised by the `Accept-Ranges` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptRanges {
    /// Header absent.
    Absent,
    /// `Accept-Ranges: none`.
    None,
    /// `Accept-Ranges: bytes`.
    Bytes,
    /// Some other range unit.
    Other(String),
}

/// Classify an `Accept-Ranges` header value.
///
/// The header is a comma separated list of units; `bytes` anywhere in the
/// list wins. Comparison is case-insensitive.
///
/// ```
/// use parget_fetch::core::{accept_ranges, AcceptRanges};
///
/// assert_eq!(accept_ranges(Some("bytes")), AcceptRanges::Bytes);
/// assert_eq!(accept_ranges(Some("none")), AcceptRanges::None);
/// assert_eq!(accept_ranges(None), AcceptRanges::Absent);
/// ```
pub fn accept_ranges(value: Option<&str>) -> AcceptRanges {
    let Some(value) = value else {
        return AcceptRanges::Absent;
    };

    let units: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|unit| !unit.is_empty())
        .collect();

    if units.iter().any(|unit| unit.eq_ignore_ascii_case("bytes")) {
        AcceptRanges::Bytes
    } else if units.is_empty() || units.iter().all(|unit| unit.eq_ignore_ascii_case("none")) {
        AcceptRanges::None
    } else {
        AcceptRanges::Other(units.join(", "))
    }
}

/// Parsed `Content-Range: bytes <first>-<last>/<complete>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    /// `None` when the server sent `*`.
    pub complete: Option<u64>,
}

impl ContentRange {
    /// Number of bytes the response body carries. `None` when the span does
    /// not fit in a `u64`.
    #[must_use]
    pub fn body_len(&self) -> Option<u64> {
        self.last.checked_sub(self.first)?.checked_add(1)
    }
}

/// Parse a `Content-Range` header. Returns `None` for anything that is not a
/// satisfied byte range.
pub fn content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, complete) = rest.split_once('/')?;
    let (first, last) = span.trim().split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    if last < first || (last - first).checked_add(1).is_none() {
        return None;
    }

    let complete = match complete.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };

    Some(ContentRange {
        first,
        last,
        complete,
    })
}

/// Parse a `Content-Length` header value.
pub fn content_length(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Returns `true` for 2xx status codes.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
