use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use parget_archive::{ArchiveReport, ExtractOptions, TraversalPolicy, extract_zip};

#[derive(Clone, Debug, Args)]
pub struct ExtractArg {
    /// Zip archive to extract
    pub archive: PathBuf,

    /// Destination directory
    pub dir: PathBuf,

    /// Remove this many leading path components from every entry
    #[arg(long, default_value_t = 0)]
    pub strip_components: usize,

    /// Skip entries that would land outside DIR instead of failing
    #[arg(long)]
    pub skip_unsafe: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(arg: ExtractArg, quiet: bool) -> Result<()> {
    let options = ExtractOptions::default()
        .strip_components(arg.strip_components)
        .traversal(if arg.skip_unsafe {
            TraversalPolicy::Skip
        } else {
            TraversalPolicy::Abort
        });

    let report = extract_archive(arg.archive.clone(), arg.dir.clone(), options).await?;

    if arg.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        println!(
            "Extracted {} entries ({} bytes) into {}",
            report.entry_count,
            report.total_bytes,
            arg.dir.display()
        );
        for skipped in &report.skipped {
            println!("  skipped {}: {}", skipped.original_path, skipped.reason);
        }
    }
    Ok(())
}

/// Run the blocking extraction off the async workers.
pub async fn extract_archive(
    archive: PathBuf,
    dir: PathBuf,
    options: ExtractOptions,
) -> Result<ArchiveReport> {
    let context = format!("failed to extract {}", archive.display());
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dir, &options))
        .await?
        .context(context)
}
