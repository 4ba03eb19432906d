// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline wiring: one detector feeding one queue from a single config.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use labelwerk_core::backend::ConversionBackend;
use labelwerk_core::config::PipelineConfig;
use labelwerk_core::error::Result;
use labelwerk_core::types::QueueStats;
use labelwerk_label::DimensionResolver;

use crate::detector::{DetectorSettings, FileDetector};
use crate::events::PipelineEvent;
use crate::gate::{FileProbe, FsProbe};
use crate::inflight::InFlightSet;
use crate::queue::{ProcessingQueue, QueueSettings};

/// A running hot folder.
pub struct Pipeline {
    detector: FileDetector,
    queue: Arc<ProcessingQueue>,
}

impl Pipeline {
    /// Validate `config` and build the detector and queue around `backend`.
    pub fn new(config: &PipelineConfig, backend: Arc<dyn ConversionBackend>) -> Result<Self> {
        Self::with_settings(
            config,
            DetectorSettings::from_config(config),
            backend,
            Arc::new(FsProbe),
        )
    }

    /// Like [`new`](Self::new) with explicit detector settings and probe.
    pub fn with_settings(
        config: &PipelineConfig,
        detector_settings: DetectorSettings,
        backend: Arc<dyn ConversionBackend>,
        probe: Arc<dyn FileProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(ProcessingQueue::new(
            QueueSettings::from_config(config),
            backend,
            Arc::clone(&probe),
            InFlightSet::new(),
        ));
        let detector = FileDetector::new(
            &config.watch_dir,
            detector_settings,
            DimensionResolver::new(config.dimension_defaults()),
            probe,
            Arc::clone(&queue),
        )?;

        Ok(Self { detector, queue })
    }

    /// Start the queue first so nothing detected waits on a stopped loop.
    pub fn start(&self) -> Result<()> {
        self.queue.start();
        self.detector.start()?;
        info!(dir = %self.detector.dir().display(), "pipeline running");
        Ok(())
    }

    /// Stop detection, then let running conversions finish.
    pub async fn stop(&self) {
        self.detector.stop();
        self.queue.stop().await;
        info!("pipeline stopped");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.queue.subscribe()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn watch_dir(&self) -> &Path {
        self.detector.dir()
    }

    pub fn detector(&self) -> &FileDetector {
        &self.detector
    }
}
