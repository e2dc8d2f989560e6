use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Number of ranges fetched concurrently when the caller does not choose.
pub const DEFAULT_WORKER_COUNT: u32 = 4;

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Fail with [`Error::DestinationExists`](crate::Error::DestinationExists)
    /// before any request is sent.
    #[default]
    Reject,
    /// Remove the existing file and download into a fresh one.
    Replace,
}

/// How to treat an `Accept-Ranges` header naming a unit other than `bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeUnitPolicy {
    /// Fail the probe with
    /// [`Error::UnsupportedRangeUnit`](crate::Error::UnsupportedRangeUnit).
    #[default]
    Strict,
    /// Treat the server as not supporting ranges and fall back to one worker.
    Permissive,
}

/// Request used to learn the size and range capability of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMethod {
    #[default]
    Head,
    /// A `GET` whose body is dropped unread, for servers that mishandle `HEAD`.
    Get,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Head => write!(f, "HEAD"),
            ProbeMethod::Get => write!(f, "GET"),
        }
    }
}

/// Configuration for a segmented download.
///
/// # Examples
///
/// ```
/// use parget_fetch::{FetchOptions, OverwritePolicy};
/// use std::time::Duration;
///
/// let options = FetchOptions::default()
///     .worker_count(8)
///     .overwrite(OverwritePolicy::Replace)
///     .timeout(Some(Duration::from_secs(600)))
///     .header("Authorization", "Bearer token");
/// ```
#[derive(Clone)]
pub struct FetchOptions {
    /// Requested number of concurrent ranges. Must be at least 1.
    ///
    /// Default: 4
    pub worker_count: u32,

    /// Behavior when the destination already exists.
    ///
    /// Default: [`OverwritePolicy::Reject`]
    pub overwrite: OverwritePolicy,

    /// Handling of non-byte range units.
    ///
    /// Default: [`RangeUnitPolicy::Strict`]
    pub range_units: RangeUnitPolicy,

    /// Request method for the capability probe.
    ///
    /// Default: [`ProbeMethod::Head`]
    pub probe_method: ProbeMethod,

    /// Upper bound on the whole run, probe included. `None` waits indefinitely.
    ///
    /// Default: None
    pub timeout: Option<Duration>,

    /// Custom HTTP headers sent with the probe and with every range request.
    ///
    /// Default: empty
    pub headers: Arc<[(String, String)]>,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("worker_count", &self.worker_count)
            .field("overwrite", &self.overwrite)
            .field("range_units", &self.range_units)
            .field("probe_method", &self.probe_method)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers.len())
            .finish()
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            overwrite: OverwritePolicy::default(),
            range_units: RangeUnitPolicy::default(),
            probe_method: ProbeMethod::default(),
            timeout: None,
            headers: Arc::new([]),
        }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn worker_count(mut self, worker_count: u32) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn range_units(mut self, policy: RangeUnitPolicy) -> Self {
        self.range_units = policy;
        self
    }

    #[must_use]
    pub fn probe_method(mut self, method: ProbeMethod) -> Self {
        self.probe_method = method;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a single custom HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers: Vec<_> = self.headers.iter().cloned().collect();
        headers.push((key.into(), value.into()));
        self.headers = Arc::from(headers);
        self
    }

    /// Replace all custom HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = Arc::from(headers);
        self
    }

    /// Check the options before any I/O happens.
    pub fn validate(&self) -> crate::Result<()> {
        if self.worker_count == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
