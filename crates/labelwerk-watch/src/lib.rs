// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelwerk Watch: the concurrent half of the pipeline.  Files found in the
// watch directory (by native notification or by periodic re-scan) pass the
// validation gate, settle, and become `ProcessingItem`s on a FIFO queue whose
// workers call the conversion backend.  The in-flight set guarantees a path
// is owned by at most one attempt at a time.

pub mod detector;
pub mod events;
pub mod gate;
pub mod inflight;
pub mod parked;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod source;

pub use detector::{DetectionState, DetectorSettings, FileDetector, Offer};
pub use events::PipelineEvent;
pub use gate::{FileProbe, FsProbe};
pub use inflight::InFlightSet;
pub use parked::ParkedSet;
pub use pipeline::Pipeline;
pub use queue::{ProcessingQueue, QueueSettings};
pub use source::{NotificationSource, PollSource, WatchSource};
