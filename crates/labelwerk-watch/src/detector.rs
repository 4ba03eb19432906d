// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hot-folder detector.
//
// Candidates arrive from every notification source on one channel.  Each is
// run through the validation gate and claimed in the in-flight set, then a
// settle task waits out the writer, checks the lock, reads the content,
// resolves dimensions and hands a `ProcessingItem` to the queue.  The claim
// is held until the queue reports the item finished.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use labelwerk_core::config::PipelineConfig;
use labelwerk_core::error::Result;
use labelwerk_core::types::{LabelDimensions, ProcessingItem};
use labelwerk_core::units::MeasurementUnit;
use labelwerk_label::DimensionResolver;
use labelwerk_label::segment::{preprocess, split};

use crate::events::PipelineEvent;
use crate::gate::{self, FileProbe};
use crate::inflight::InFlightSet;
use crate::parked::ParkedSet;
use crate::queue::ProcessingQueue;
use crate::source::{NotificationSource, PollSource, WatchSource};

/// Where a file is in the detection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Unseen,
    PendingSettle,
    LockCheck,
    /// Handed to the processing queue.
    Enqueued,
    /// Failed the validation gate.
    Rejected,
    /// Vanished or stayed locked while settling; left for a later scan.
    Abandoned,
}

/// Result of offering a candidate path to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Rejected,
    AlreadyInFlight,
    /// Failed earlier and unchanged since; skipped until it is modified.
    Parked,
}

/// Detector timing and dimension parameters.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub settle_delay: Duration,
    pub lock_attempts: u32,
    pub lock_retry_interval: Duration,
    pub poll_interval: Duration,
    pub explicit_width: Option<f64>,
    pub explicit_height: Option<f64>,
    pub unit: MeasurementUnit,
    pub dpi: u32,
    /// Disable the native watcher and rely on polling only.
    pub poll_only: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl DetectorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            lock_attempts: config.lock_attempts,
            lock_retry_interval: config.lock_retry_interval(),
            poll_interval: config.poll_interval(),
            explicit_width: config.explicit_width,
            explicit_height: config.explicit_height,
            unit: config.unit,
            dpi: config.dpi,
            poll_only: false,
        }
    }
}

struct DetectorShared {
    dir: PathBuf,
    settings: DetectorSettings,
    resolver: DimensionResolver,
    probe: Arc<dyn FileProbe>,
    in_flight: InFlightSet,
    queue: Arc<ProcessingQueue>,
    events: broadcast::Sender<PipelineEvent>,
    parked: ParkedSet,
    cancel: CancellationToken,
}

/// Watches one directory and feeds eligible files to a [`ProcessingQueue`].
pub struct FileDetector {
    shared: Arc<DetectorShared>,
    sources: Mutex<Vec<Box<dyn NotificationSource>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FileDetector {
    /// Create the detector, creating `dir` if it does not exist.
    ///
    /// The directory is canonicalized so every source reports the same key
    /// for a given file.
    pub fn new(
        dir: impl AsRef<Path>,
        settings: DetectorSettings,
        resolver: DimensionResolver,
        probe: Arc<dyn FileProbe>,
        queue: Arc<ProcessingQueue>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let dir = dir.canonicalize()?;

        Ok(Self {
            shared: Arc::new(DetectorShared {
                dir,
                settings,
                resolver,
                probe,
                in_flight: queue.in_flight().clone(),
                parked: queue.parked().clone(),
                events: queue.event_sender(),
                queue,
                cancel: CancellationToken::new(),
            }),
            sources: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Canonical watch directory.
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Start the notification sources and the acceptance loop.
    ///
    /// A native watcher that cannot be installed is logged and polling
    /// carries on alone; only a failure to start polling is an error.
    #[instrument(skip(self), fields(dir = %self.shared.dir.display()))]
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut sources: Vec<Box<dyn NotificationSource>> = Vec::new();
        if !shared.settings.poll_only {
            let mut watch = WatchSource::new();
            match watch.start(&shared.dir, tx.clone(), shared.cancel.child_token()) {
                Ok(()) => sources.push(Box::new(watch)),
                Err(e) => warn!(error = %e, "native watch unavailable, polling only"),
            }
        }
        let mut poll = PollSource::new(shared.settings.poll_interval);
        poll.start(&shared.dir, tx, shared.cancel.child_token())?;
        sources.push(Box::new(poll));
        *lock(&self.sources) = sources;

        let acceptor = Arc::clone(shared);
        let accept_task = tokio::spawn(async move {
            loop {
                let path = tokio::select! {
                    _ = acceptor.cancel.cancelled() => break,
                    path = rx.recv() => match path {
                        Some(path) => path,
                        None => break,
                    },
                };
                let offer = DetectorShared::offer(&acceptor, &path);
                trace!(path = %path.display(), ?offer, "candidate offered");
            }
            debug!("acceptance loop exited");
        });

        lock(&self.tasks).push(accept_task);
        info!("file detector started");
        Ok(())
    }

    /// Stop all sources and detector tasks. Settle tasks already running see
    /// the cancellation and release their claims.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
        for mut source in lock(&self.sources).drain(..) {
            debug!(source = source.name(), "stopping notification source");
            source.stop();
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        info!("file detector stopped");
    }

    /// Offer one candidate path. Never blocks on the settle delay.
    pub fn offer(&self, path: &Path) -> Offer {
        DetectorShared::offer(&self.shared, path)
    }

    pub fn is_parked(&self, path: &Path) -> bool {
        let key = self.shared.key_for(path);
        key.is_some_and(|key| self.shared.parked.contains(&key))
    }
}

impl Drop for FileDetector {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl DetectorShared {
    /// Map any reported path to `<canonical dir>/<file name>`.
    fn key_for(&self, path: &Path) -> Option<PathBuf> {
        path.file_name().map(|name| self.dir.join(name))
    }

    fn offer(shared: &Arc<Self>, path: &Path) -> Offer {
        let Some(key) = shared.key_for(path) else {
            return Offer::Rejected;
        };

        if !gate::is_eligible(&key) {
            trace!(path = %key.display(), state = ?DetectionState::Rejected, "gate rejected");
            shared.parked.forget(&key);
            return Offer::Rejected;
        }
        if shared.parked.is_parked(&key) {
            return Offer::Parked;
        }
        if !shared.in_flight.try_acquire(&key) {
            return Offer::AlreadyInFlight;
        }

        debug!(path = %key.display(), state = ?DetectionState::PendingSettle, "file detected");
        let _ = shared.events.send(PipelineEvent::FileDetected { path: key.clone() });

        let settler = Arc::clone(shared);
        tokio::spawn(async move {
            settler.settle(key).await;
        });
        Offer::Accepted
    }

    /// Settle, probe, read, resolve, enqueue. Returns the final state.
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn settle(&self, path: PathBuf) -> DetectionState {
        let state = self.settle_inner(&path).await;
        if state != DetectionState::Enqueued {
            self.in_flight.release(&path);
        }
        debug!(?state, "settle finished");
        state
    }

    async fn settle_inner(&self, path: &Path) -> DetectionState {
        if !self.wait(self.settings.settle_delay).await {
            return DetectionState::Abandoned;
        }
        if !self.probe.exists(path) {
            debug!("file vanished while settling");
            return DetectionState::Abandoned;
        }

        trace!(state = ?DetectionState::LockCheck, "probing lock");
        let Some(content) = self.read_when_unlocked(path).await else {
            warn!(
                attempts = self.settings.lock_attempts,
                "file still locked after settling, leaving for a later scan"
            );
            return DetectionState::Abandoned;
        };

        let dimensions = self.resolve_dimensions(&content);
        let item = ProcessingItem::new(path, content, dimensions);
        info!(
            item_id = %item.id,
            width_mm = dimensions.width_mm(),
            height_mm = dimensions.height_mm(),
            source = ?dimensions.source(),
            "file accepted"
        );
        self.queue.enqueue(item);
        DetectionState::Enqueued
    }

    /// Up to `lock_attempts` probes. A read failing after an unlocked probe
    /// counts as a failed attempt.
    async fn read_when_unlocked(&self, path: &Path) -> Option<String> {
        let attempts = self.settings.lock_attempts.max(1);
        for attempt in 1..=attempts {
            if !self.probe.is_locked(path) {
                match tokio::fs::read(path).await {
                    Ok(bytes) => return Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => debug!(attempt, error = %e, "read failed"),
                }
            } else {
                debug!(attempt, "file locked");
            }
            if attempt < attempts && !self.wait(self.settings.lock_retry_interval).await {
                return None;
            }
        }
        None
    }

    /// Dimensions of the first label unit drive the whole file.
    fn resolve_dimensions(&self, content: &str) -> LabelDimensions {
        let settings = &self.settings;
        let units = split(&preprocess(content));
        let extracted = units
            .first()
            .map(|unit| self.resolver.extract_from_unit(unit))
            .unwrap_or_else(|| LabelDimensions::empty(settings.dpi));
        self.resolver.apply_priority(
            settings.explicit_width,
            settings.explicit_height,
            settings.unit,
            &extracted,
            settings.dpi,
        )
    }

    /// Sleep unless cancelled first. `false` on cancellation.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
