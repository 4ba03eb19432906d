// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lifecycle notifications published to pipeline observers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use labelwerk_core::types::ProcessingItem;

/// Capacity of the event channel. Slow subscribers lag rather than block the
/// pipeline.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something observable happened to a file.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A file passed the validation gate and was claimed.
    FileDetected { path: PathBuf },
    /// Output written and verified.
    ProcessingSucceeded {
        item: Arc<ProcessingItem>,
        output_path: PathBuf,
    },
    /// Terminal failure; the source file is left in place.
    ProcessingFailed {
        item: Arc<ProcessingItem>,
        message: String,
    },
    /// Fired after every success or failure.
    ProcessingCompleted { path: PathBuf, success: bool },
}

impl PipelineEvent {
    /// Path of the source file the event concerns.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::FileDetected { path } | Self::ProcessingCompleted { path, .. } => path,
            Self::ProcessingSucceeded { item, .. } | Self::ProcessingFailed { item, .. } => {
                &item.file_path
            }
        }
    }
}

/// Create the broadcast channel shared by the detector and the queue.
pub fn channel() -> broadcast::Sender<PipelineEvent> {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
