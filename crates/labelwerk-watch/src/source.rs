// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Notification sources feeding candidate paths to the detector.
//
// Two independent sources run side by side.  `WatchSource` relays native
// filesystem notifications and can miss events (buffer overflow, network
// shares); `PollSource` rescans the directory on a fixed interval and covers
// whatever the watcher dropped.  Duplicates are expected and are filtered
// downstream by the in-flight set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use labelwerk_core::error::{LabelwerkError, Result};

/// A producer of candidate file paths for one directory.
pub trait NotificationSource: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Begin sending candidate paths into `tx` until `cancel` fires or
    /// [`stop`](Self::stop) is called.
    fn start(
        &mut self,
        dir: &Path,
        tx: UnboundedSender<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<()>;

    fn stop(&mut self);
}

/// Native change notifications for the top level of the directory.
#[derive(Default)]
pub struct WatchSource {
    watcher: Option<RecommendedWatcher>,
}

impl WatchSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationSource for WatchSource {
    fn name(&self) -> &'static str {
        "watch"
    }

    fn start(
        &mut self,
        dir: &Path,
        tx: UnboundedSender<PathBuf>,
        _cancel: CancellationToken,
    ) -> Result<()> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_relevant(&event.kind) => {
                    for path in event.paths {
                        trace!(path = %path.display(), kind = ?event.kind, "watch event");
                        // Receiver gone means the detector stopped.
                        let _ = tx.send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "folder watcher reported an error"),
            }
        })
        .map_err(|e| LabelwerkError::Watch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| LabelwerkError::Watch(format!("{}: {e}", dir.display())))?;

        info!(dir = %dir.display(), "native folder watch started");
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher unregisters it.
        if self.watcher.take().is_some() {
            debug!("native folder watch stopped");
        }
    }
}

/// Creates and content writes both announce a candidate.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Periodic directory scan. The first scan runs immediately, which also picks
/// up files that were already present at startup.
pub struct PollSource {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl PollSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            task: None,
        }
    }
}

impl NotificationSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn start(
        &mut self,
        dir: &Path,
        tx: UnboundedSender<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(
            dir = %dir.display(),
            interval_ms = self.interval.as_millis() as u64,
            "directory polling started"
        );
        let dir = dir.to_path_buf();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let scan_dir = dir.clone();
                let found = match tokio::task::spawn_blocking(move || scan_directory(&scan_dir))
                    .await
                {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        warn!(dir = %dir.display(), error = %e, "directory scan failed");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "directory scan task failed");
                        continue;
                    }
                };
                trace!(count = found.len(), "directory scan");
                for path in found {
                    if tx.send(path).is_err() {
                        return;
                    }
                }
            }
            debug!("poll source exited");
        });

        self.task = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn scan_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
