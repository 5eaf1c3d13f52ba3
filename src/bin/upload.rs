// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! coldtrace-upload - Drain the readings journal to the ingestion endpoint.
//!
//! Usage:
//!   coldtrace-upload --config coldtrace.yaml
//!   coldtrace-upload --endpoint https://api.example.com/iot-logs/ingest
//!   coldtrace-upload --once   # single upload cycle, then exit

use anyhow::Result;
use clap::Parser;
use coldtrace::{Config, CursorFile, HttpIngestClient, Journal, Uploader};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "coldtrace-upload")]
#[command(about = "Drain the readings journal to the ingestion endpoint")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingestion endpoint URL, overrides the config file
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Journal path, overrides the config file
    #[arg(short, long)]
    journal: Option<PathBuf>,

    /// Seconds between upload cycles, overrides the config file
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single upload cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config.upload.endpoint = endpoint;
    }
    if let Some(journal) = args.journal {
        config.journal.path = journal;
    }
    if let Some(interval) = args.interval {
        config.upload.interval_secs = interval;
    }

    tracing::info!("Coldtrace uploader v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Endpoint: {}", config.upload.endpoint);
    tracing::info!("  Journal: {}", config.journal.path.display());
    tracing::info!("  Cursor: {}", config.journal.cursor_path.display());

    let uploader = Uploader::new(
        Journal::new(&config.journal.path),
        CursorFile::new(&config.journal.cursor_path),
        Journal::new(&config.journal.dead_letter_path),
        HttpIngestClient::new(&config.upload)?,
        config.upload.max_reject_attempts,
    );

    if args.once {
        let report = uploader.run_once().await?;
        tracing::info!(
            uploaded = report.uploaded,
            dead_lettered = report.dead_lettered,
            "upload cycle complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    uploader
        .run(
            Duration::from_secs(config.upload.interval_secs),
            shutdown_rx,
        )
        .await
}
