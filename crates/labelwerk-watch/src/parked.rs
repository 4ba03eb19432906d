// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failed files left in the watch directory.
//
// A failed source stays where it is, so every directory scan would offer it
// again.  The queue parks a path, with the modification time it had, before
// releasing its in-flight claim; the detector skips parked paths until the
// file changes.  Entries for files that no longer exist are dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tracing::debug;

/// Cloneable handle to the shared parked-file map.
#[derive(Debug, Clone, Default)]
pub struct ParkedSet {
    files: Arc<Mutex<HashMap<PathBuf, Option<SystemTime>>>>,
}

impl ParkedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `path` at its current modification time. Entries whose files
    /// are gone are pruned at the same time.
    pub fn park(&self, path: &Path) {
        let modified = modified_time(path);
        let mut files = self.lock();
        files.retain(|parked, _| parked.is_file());
        files.insert(path.to_path_buf(), modified);
        debug!(path = %path.display(), parked = files.len(), "failed file parked until modified");
    }

    /// Parked and unchanged. A modified or deleted file is unparked.
    pub fn is_parked(&self, path: &Path) -> bool {
        let mut files = self.lock();
        let Some(recorded) = files.get(path) else {
            return false;
        };
        if path.is_file() && *recorded == modified_time(path) {
            return true;
        }
        files.remove(path);
        debug!(path = %path.display(), "parked file changed, offering again");
        false
    }

    /// Drop the entry for `path`, if any.
    pub fn forget(&self, path: &Path) {
        self.lock().remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Option<SystemTime>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
