use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{Error, Result};

/// File name for a download: the last non-empty path segment of the URL.
///
/// ```
/// use parget_fetch::core::file_name_from_url;
///
/// let name = file_name_from_url("https://example.com/dist/tool_1.0_linux.zip?sig=abc").unwrap();
/// assert_eq!(name, "tool_1.0_linux.zip");
/// ```
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::InvalidConfiguration(format!("invalid URL '{url}': {e}")))?;

    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .filter(|s| *s != "." && *s != "..")
        .ok_or_else(|| {
            Error::InvalidConfiguration(format!("URL '{url}' has no file name to save as"))
        })?;

    Ok(name.to_string())
}

/// Prefix a file name with the nanosecond Unix timestamp of `now`.
pub fn timestamped(name: &str, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros() * 1000);
    format!("{nanos}_{name}")
}

/// Local path a download of `url` is saved to inside `dir`.
pub fn destination_for(dir: &Path, url: &str, timestamp: bool) -> Result<PathBuf> {
    let name = file_name_from_url(url)?;
    let name = if timestamp {
        timestamped(&name, Utc::now())
    } else {
        name
    };
    Ok(dir.join(name))
}
