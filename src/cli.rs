//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

/// Download one file over HTTP as concurrent byte ranges.
///
/// The resource is probed with HEAD, split into ranges, and each range is
/// fetched with its own request and written at its offset in the output file.
/// Dropped connections are retried per range.
#[derive(clap::Parser, Debug)]
#[command(name = "rangeget")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the file to download
    pub url: String,

    /// Output file (created or truncated)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Retries allowed per range for dropped connections [default: 3]
    #[arg(long, env = "RANGEGET_DOWNLOAD_RETRIES")]
    pub download_retries: Option<String>,

    /// Maximum ranges in flight (1-100) [default: 4]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Number of ranges to split the file into (1-10000) [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=rangeget::MAX_HUNKS))]
    pub hunks: Option<u64>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
