use clap::{ArgAction, Parser, Subcommand};

use super::download::DownloadArg;
use super::extract::ExtractArg;

#[derive(Clone, Debug, Parser)]
#[command(name = "parget", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,

    /// More log output, repeat for more detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "dl", name = "download", about = "Download a file over parallel byte ranges")]
    Download(DownloadArg),
    #[command(alias = "x", name = "extract", about = "Extract a zip archive")]
    Extract(ExtractArg),
}
