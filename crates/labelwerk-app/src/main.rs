// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelwerk: hot-folder label conversion daemon
//
// Entry point. Initialises logging, loads configuration, starts the pipeline
// and runs until interrupted.

mod services;

use std::process::ExitCode;
use std::sync::Arc;

use labelwerk_core::error::Result;
use labelwerk_render::LabelaryPdfBackend;
use labelwerk_watch::{Pipeline, PipelineEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Labelwerk starting");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Labelwerk failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let (config, origin) = services::config_source::load()?;
    debug!(?origin, ?config, "effective configuration");

    let backend = Arc::new(LabelaryPdfBackend::from_config(&config)?);
    let pipeline = Pipeline::new(&config, backend)?;

    let events = tokio::spawn(log_events(pipeline.subscribe()));
    pipeline.start()?;
    info!(
        dir = %pipeline.watch_dir().display(),
        endpoint = %config.render_endpoint,
        workers = config.max_concurrent,
        "watching for label files"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C, shutting down");
    }
    info!("shutdown requested");

    pipeline.stop().await;
    events.abort();
    let stats = pipeline.stats();
    info!(abandoned = stats.queue_length, "Labelwerk stopped");
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::FileDetected { path }) => {
                info!(path = %path.display(), "file detected");
            }
            Ok(PipelineEvent::ProcessingSucceeded { item, output_path }) => {
                info!(
                    path = %item.file_path.display(),
                    output = %output_path.display(),
                    retries = item.retry_count,
                    "converted"
                );
            }
            Ok(PipelineEvent::ProcessingFailed { item, message }) => {
                warn!(path = %item.file_path.display(), reason = %message, "conversion failed");
            }
            Ok(PipelineEvent::ProcessingCompleted { path, success }) => {
                debug!(path = %path.display(), success, "processing completed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
