// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paths currently owned by the pipeline.
//
// The detector inserts a path when it accepts a file; the queue removes it
// when the item reaches a terminal state.  This is the only state shared
// across the detection/processing boundary, and every access goes through
// the one mutex below.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// Cloneable handle to the shared in-flight path set.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`. Returns `false` if it is already in flight.
    ///
    /// Check and insert happen under one lock acquisition.
    pub fn try_acquire(&self, path: &Path) -> bool {
        let acquired = self.lock().insert(path.to_path_buf());
        trace!(path = %path.display(), acquired, "in-flight acquire");
        acquired
    }

    /// Give up ownership of `path`. Releasing an absent path is a no-op.
    pub fn release(&self, path: &Path) {
        let removed = self.lock().remove(path);
        trace!(path = %path.display(), removed, "in-flight release");
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned guard is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
