//! Segmented download functionality.
//!
//! [`SegmentedFetcher`] probes a resource, splits it into byte ranges and
//! fetches every range concurrently into one pre-sized file.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant as Deadline;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{ByteRange, plan_ranges};
use crate::data::{DownloadReport, DownloadTask, FetchOptions};
use crate::effects::file::OutputFile;
use crate::effects::http::HttpClient;
use crate::effects::probe::probe;
use crate::effects::progress::{NoopSink, ProgressAggregator, ProgressSink};
use crate::effects::worker::{FetchMode, RangeWorker};
use crate::error::{Error, Result};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FetchState {
    Idle,
    Probing,
    Partitioning,
    Downloading,
    Completed,
    Failed,
}

/// Downloads a resource as concurrent byte ranges.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> parget_fetch::Result<()> {
/// use parget_fetch::{FetchOptions, ReqwestClient, SegmentedFetcher};
/// use std::path::Path;
///
/// let client = ReqwestClient::new().expect("client");
/// let fetcher = SegmentedFetcher::new(client)
///     .with_options(FetchOptions::default().worker_count(8));
/// let report = fetcher
///     .fetch("https://example.com/tool.zip", Path::new("tool.zip"))
///     .await?;
/// println!("{} bytes", report.bytes_written);
/// # Ok(())
/// # }
/// ```
pub struct SegmentedFetcher<C> {
    client: Arc<C>,
    options: FetchOptions,
    cancel: CancellationToken,
    state: watch::Sender<FetchState>,
}

impl<C: HttpClient + 'static> SegmentedFetcher<C> {
    /// Create a new segmented fetcher.
    pub fn new(client: C) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);
        Self {
            client: Arc::new(client),
            options: FetchOptions::default(),
            cancel: CancellationToken::new(),
            state,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Cancelling `token` stops the current run with [`Error::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FetchState {
        *self.state.borrow()
    }

    /// Download `url` into `destination` without progress output.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<DownloadReport> {
        self.fetch_with_progress(url, destination, NoopSink).await
    }

    /// Download `url` into `destination`, forwarding per-range progress to
    /// `sink`.
    ///
    /// On failure the partially written file is left in place.
    pub async fn fetch_with_progress(
        &self,
        url: &str,
        destination: &Path,
        sink: impl ProgressSink,
    ) -> Result<DownloadReport> {
        let result = self.run(url, destination, Box::new(sink)).await;
        match &result {
            Ok(report) => {
                self.transition(FetchState::Completed);
                info!(
                    url,
                    bytes = report.bytes_written,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "download completed"
                );
            }
            Err(e) => {
                self.transition(FetchState::Failed);
                warn!(url, error = %e, "download failed");
            }
        }
        result
    }

    async fn run(
        &self,
        url: &str,
        destination: &Path,
        sink: Box<dyn ProgressSink>,
    ) -> Result<DownloadReport> {
        let started = Instant::now();
        let deadline = self.options.timeout.map(|t| Deadline::now() + t);
        self.transition(FetchState::Idle);
        self.options.validate()?;
        OutputFile::check_destination(destination, self.options.overwrite).await?;

        self.transition(FetchState::Probing);
        let capability = self
            .guarded(deadline, probe(&*self.client, url, &self.options))
            .await?;
        info!(
            url,
            bytes = capability.total_size,
            range_supported = capability.range_supported,
            "probed resource"
        );

        self.transition(FetchState::Partitioning);
        if !capability.range_supported && self.options.worker_count > 1 {
            info!(url, "server does not serve byte ranges, using a single connection");
        }
        let ranges = plan_ranges(
            capability.total_size,
            self.options.worker_count,
            capability.range_supported,
        )?;
        let task = DownloadTask {
            source_url: url.to_string(),
            destination: destination.to_path_buf(),
            worker_count: ranges.len() as u32,
            total_size: capability.total_size,
            range_supported: capability.range_supported,
        };
        let file = Arc::new(
            OutputFile::create(destination, self.options.overwrite, capability.total_size)
                .await?,
        );

        self.transition(FetchState::Downloading);
        let aggregator = ProgressAggregator::start(&ranges, sink);
        let outcome = self
            .download(&task, &ranges, &file, &aggregator, deadline)
            .await;

        let bytes_written = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                aggregator.seal();
                aggregator.close().await;
                return Err(e);
            }
        };

        file.sync().await?;
        drop(file);
        let progress = aggregator.close().await;

        Ok(DownloadReport {
            task,
            bytes_written,
            elapsed: started.elapsed(),
            progress,
        })
    }

    /// Fan out one worker per range and join them all.
    async fn download(
        &self,
        task: &DownloadTask,
        ranges: &[ByteRange],
        file: &Arc<OutputFile>,
        aggregator: &ProgressAggregator,
        deadline: Option<Deadline>,
    ) -> Result<u64> {
        let cancel = self.cancel.child_token();
        let mode = if task.range_supported {
            FetchMode::Ranged
        } else {
            FetchMode::Full
        };
        let url: Arc<str> = Arc::from(task.source_url.as_str());

        let mut workers = JoinSet::new();
        for range in ranges {
            let index = range.index;
            let worker = RangeWorker {
                client: Arc::clone(&self.client),
                url: Arc::clone(&url),
                headers: Arc::clone(&self.options.headers),
                file: Arc::clone(file),
                range: *range,
                total_size: task.total_size,
                mode,
                reporter: aggregator.reporter(range),
                cancel: cancel.clone(),
            };
            workers.spawn(async move {
                AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(Error::WorkerPanicked { index }))
            });
        }
        debug!(parts = ranges.len(), "spawned range workers");

        let mut failure: Option<Error> = None;
        let mut total = 0u64;

        loop {
            let joined = match deadline {
                Some(deadline) if failure.is_none() => {
                    match tokio::time::timeout_at(deadline, workers.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            warn!("download timed out, cancelling remaining parts");
                            failure = Some(Error::TimedOut);
                            aggregator.seal();
                            cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => workers.join_next().await,
            };
            let Some(joined) = joined else { break };

            // Tasks are never aborted and panics are caught inside them, so a
            // join error only happens on runtime shutdown.
            let outcome = joined.unwrap_or(Err(Error::Cancelled));
            match outcome {
                Ok(bytes) => total += bytes,
                Err(e) => {
                    if failure.is_none() {
                        aggregator.seal();
                        cancel.cancel();
                    }
                    record_failure(&mut failure, e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    /// Race a single request against external cancellation and the deadline.
    async fn guarded<T>(
        &self,
        deadline: Option<Deadline>,
        request: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = expired => {
                warn!("download timed out before the transfer started");
                Err(Error::TimedOut)
            }
            result = request => result,
        }
    }

    fn transition(&self, state: FetchState) {
        debug!(?state, "fetch state");
        self.state.send_replace(state);
    }
}

/// Keep the first real fault. Cancellations caused by it never replace it.
fn record_failure(slot: &mut Option<Error>, error: Error) {
    let replace = match slot {
        None => true,
        Some(existing) => existing.is_cancelled() && !error.is_cancelled(),
    };
    if replace {
        *slot = Some(error);
    }
}
