use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::app::{App, Commands};
use crate::cli::{download, extract};

mod cli;
mod logging;
mod ui;

fn main() -> ExitCode {
    let app = App::parse();
    logging::init(app.verbose, app.quiet);

    match run(app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(app: App) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let result = runtime.block_on(async move {
        match app.cmd {
            Commands::Download(arg) => download::run(arg, app.quiet).await,
            Commands::Extract(arg) => extract::run(arg, app.quiet).await,
        }
    });
    // An interrupted extraction may still be running on the blocking pool.
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}
