//! CLI entry point for rangeget.

use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rangeget::{
    BarReporter, CONNECT_TIMEOUT_SECS, DownloadConfig, Downloader, HunkRanger, NoopReporter,
    ProgressReporter, READ_TIMEOUT_SECS, ReqwestTransport, StaticLink,
};
use tracing::{debug, info};

mod app_config;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_default_file_config()?;
    debug!(?file_config, "file config loaded");

    let mut config = DownloadConfig::default();
    if let Some(retries) = args
        .download_retries
        .clone()
        .or(file_config.download_retries)
    {
        config = config.with_retries(retries);
    }
    if let Some(concurrency) = args.concurrency.or(file_config.concurrency) {
        config = config.with_concurrency(usize::from(concurrency));
    }

    let ranger = args
        .hunks
        .or(file_config.hunks)
        .map_or_else(HunkRanger::default, HunkRanger::new);

    let transport = ReqwestTransport::with_timeouts(
        Duration::from_secs(
            file_config
                .connect_timeout_secs
                .unwrap_or(CONNECT_TIMEOUT_SECS),
        ),
        Duration::from_secs(file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)),
    )
    .context("Failed to build HTTP client")?;

    let progress: Arc<dyn ProgressReporter> = if args.no_progress || args.quiet || args.json {
        Arc::new(NoopReporter)
    } else {
        Arc::new(BarReporter::new())
    };

    let downloader = Downloader::new(Arc::new(transport), Arc::new(ranger), progress, config)?;

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .read(true)
        .truncate(true)
        .open(&args.output)
        .with_context(|| format!("Failed to open output file '{}'", args.output.display()))?;

    info!(url = %args.url, output = %args.output.display(), "rangeget starting");

    let report = match downloader
        .fetch(Arc::new(file), &StaticLink::new(&args.url), std::io::stderr())
        .await
    {
        Ok(report) => report,
        Err(error) => {
            let stage = error.stage();
            return Err(anyhow::Error::new(error).context(format!("download failed ({stage})")));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else if !args.quiet {
        println!(
            "Downloaded {} bytes to {} ({} ranges, {} retries)",
            report.content_length,
            args.output.display(),
            report.ranges,
            report.retries
        );
    }

    Ok(())
}
