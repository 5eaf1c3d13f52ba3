// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! coldtrace-listen - Record MQTT sensor readings to a durable journal.
//!
//! Usage:
//!   coldtrace-listen --config coldtrace.yaml
//!   coldtrace-listen --broker localhost:1883 --topic medicine/data
//!   coldtrace-listen --journal /var/lib/coldtrace/readings.jsonl

use anyhow::Result;
use clap::Parser;
use coldtrace::{Config, Journal, Listener};
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "coldtrace-listen")]
#[command(about = "Record MQTT sensor readings to a durable journal")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker address (host:port), overrides the config file
    #[arg(short, long)]
    broker: Option<String>,

    /// Readings topic, overrides the config file
    #[arg(short, long)]
    topic: Option<String>,

    /// Journal path, overrides the config file
    #[arg(short, long)]
    journal: Option<PathBuf>,

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
    if let Some(broker) = args.broker {
        config.broker.addr = broker;
    }
    if let Some(topic) = args.topic {
        config.broker.topic = topic;
    }
    if let Some(journal) = args.journal {
        config.journal.path = journal;
    }

    tracing::info!("Coldtrace listener v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Broker: {}", config.broker.addr);
    tracing::info!("  Topic: {}", config.broker.topic);
    tracing::info!("  Journal: {}", config.journal.path.display());

    let journal = Journal::new(&config.journal.path);
    let listener = Listener::new(&config, journal);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    listener.run(shutdown_rx).await
}
