// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Validation gate: decides whether a path is worth picking up.

use std::fs::{OpenOptions, TryLockError};
use std::path::Path;

use tracing::trace;

/// Extensions of the text-based label formats the pipeline accepts:
/// label text, print-ready, native ZPL markup, and legacy print files.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "prn", "zpl", "imp"];

/// Whether the path carries a supported extension (case-insensitive).
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Supported extension and an existing regular file at check time.
pub fn is_eligible(path: &Path) -> bool {
    has_supported_extension(path) && path.is_file()
}

/// Open the file and try to take a non-blocking exclusive lock on it.
/// Any failure, including a lock held elsewhere, counts as locked.
///
/// On Unix the lock is advisory (`flock`), so only writers that lock the
/// file are seen.  On Windows the open itself also refuses sharing.  The
/// answer can be stale by the time the caller acts on it, so a failed read
/// after an unlocked check must be treated like a lock.
pub fn is_locked(path: &Path) -> bool {
    let mut options = OpenOptions::new();
    options.read(true);

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        // No sharing: fails while any other handle is open.
        options.share_mode(0);
    }

    let Ok(file) = options.open(path) else {
        return true;
    };
    match file.try_lock() {
        Ok(()) => {
            // Closing the handle would release it too.
            let _ = file.unlock();
            false
        }
        Err(TryLockError::WouldBlock) => true,
        Err(TryLockError::Error(e)) => {
            trace!(path = %path.display(), error = %e, "lock check failed");
            true
        }
    }
}

/// Filesystem checks used by the detector and the queue.
///
/// `FsProbe` talks to the real filesystem; tests substitute scripted probes.
pub trait FileProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_locked(&self, path: &Path) -> bool;
}

/// [`FileProbe`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_locked(&self, path: &Path) -> bool {
        is_locked(path)
    }
}
