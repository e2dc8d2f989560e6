use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use indicatif::MultiProgress;
use parget_archive::{ArchiveReport, ExtractOptions};
use parget_fetch::core::destination_for;
use parget_fetch::{
    DEFAULT_WORKER_COUNT, DownloadReport, FetchOptions, OverwritePolicy, ProbeMethod,
    RangeUnitPolicy, ReqwestClient, SegmentedFetcher,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::extract::extract_archive;
use crate::ui::tracker::BarSink;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Probe {
    Head,
    Get,
}

impl From<Probe> for ProbeMethod {
    fn from(probe: Probe) -> Self {
        match probe {
            Probe::Head => ProbeMethod::Head,
            Probe::Get => ProbeMethod::Get,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct DownloadArg {
    /// URL of the file to download
    pub url: String,

    /// Number of concurrent connections
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_WORKER_COUNT,
        env = "PARGET_CONNECTIONS",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub connections: u32,

    /// Prefix the file name with a nanosecond timestamp
    #[arg(short, long)]
    pub timestamp: bool,

    /// Replace the destination if it already exists
    #[arg(short = 'r', long)]
    pub remove_existing: bool,

    /// Directory the file is saved to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Request used to learn the file size
    #[arg(long, value_enum, default_value_t = Probe::Head)]
    pub probe: Probe,

    /// Fall back to one connection when the server names an unknown range unit
    #[arg(long)]
    pub lenient_ranges: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extract the downloaded zip archive into DIR
    #[arg(long, value_name = "DIR")]
    pub extract: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl DownloadArg {
    fn options(&self) -> FetchOptions {
        FetchOptions::default()
            .worker_count(self.connections)
            .overwrite(if self.remove_existing {
                OverwritePolicy::Replace
            } else {
                OverwritePolicy::Reject
            })
            .range_units(if self.lenient_ranges {
                RangeUnitPolicy::Permissive
            } else {
                RangeUnitPolicy::Strict
            })
            .probe_method(self.probe.into())
            .timeout(self.timeout.map(Duration::from_secs))
    }
}

#[derive(Serialize)]
struct Output<'a> {
    download: &'a DownloadReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    extract: Option<&'a ArchiveReport>,
}

pub async fn run(arg: DownloadArg, quiet: bool) -> Result<()> {
    let destination = destination_for(&arg.output_dir, &arg.url, arg.timestamp)
        .context("cannot choose a local file name")?;

    let cancel = CancellationToken::new();
    let client = ReqwestClient::new().context("failed to build the HTTP client")?;
    let fetcher = SegmentedFetcher::new(client)
        .with_options(arg.options())
        .with_cancellation(cancel.clone());

    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    let result = if quiet || arg.json {
        fetcher.fetch(&arg.url, &destination).await
    } else {
        let sink = BarSink::new(MultiProgress::new());
        fetcher.fetch_with_progress(&arg.url, &destination, sink).await
    };
    let report = match result.with_context(|| format!("failed to download {}", arg.url)) {
        Ok(report) => report,
        Err(e) => {
            interrupt.abort();
            return Err(e);
        }
    };

    let extracted = match &arg.extract {
        Some(dir) => {
            let extraction = extract_archive(
                report.task.destination.clone(),
                dir.clone(),
                ExtractOptions::default(),
            );
            Some(unless_interrupted(&cancel, extraction).await?)
        }
        None => None,
    };
    interrupt.abort();

    if arg.json {
        let output = Output {
            download: &report,
            extract: extracted.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !quiet {
        println!(
            "Downloaded {} ({} bytes, {} part(s)) in {:.2?}",
            report.task.destination.display(),
            report.bytes_written,
            report.task.worker_count,
            report.elapsed
        );
        if let (Some(dir), Some(extracted)) = (&arg.extract, &extracted) {
            println!(
                "Extracted {} entries ({} bytes) into {}",
                extracted.entry_count,
                extracted.total_bytes,
                dir.display()
            );
        }
    }
    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling");
        token.cancel();
    }
}

/// Stop waiting on `work` once `cancel` fires. Blocking work keeps running
/// until the runtime shuts down.
async fn unless_interrupted<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => bail!("interrupted"),
        result = work => result,
    }
}
