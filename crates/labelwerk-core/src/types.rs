// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Labelwerk label pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::units::{mm_to_points, points_to_mm};

/// Unique identifier for a queued processing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One self-contained label, from its start marker to its end marker, with
/// any shared file preamble already prepended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelUnit(String);

impl LabelUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for LabelUnit {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LabelUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which tier of the dimension cascade produced a [`LabelDimensions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionSource {
    /// `^PW` / `^LL` directives found inside the label itself.
    EmbeddedExtraction,
    /// Width and height supplied by the operator.
    ExplicitParameter,
    /// Configured fallback size.
    Default,
}

/// Physical size of a label in printer dots and millimetres.
///
/// Fields are only set through the constructors, so the recorded
/// [`DimensionSource`] cannot change after a value is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelDimensions {
    width_points: u32,
    height_points: u32,
    width_mm: f64,
    height_mm: f64,
    dpi: u32,
    has_dimensions: bool,
    source: DimensionSource,
}

impl LabelDimensions {
    /// Build from dot counts; millimetres are derived at `dpi`.
    pub fn from_points(
        width_points: u32,
        height_points: u32,
        dpi: u32,
        source: DimensionSource,
    ) -> Self {
        Self {
            width_points,
            height_points,
            width_mm: points_to_mm(width_points, dpi),
            height_mm: points_to_mm(height_points, dpi),
            dpi,
            has_dimensions: width_points > 0 || height_points > 0,
            source,
        }
    }

    /// Build from millimetres, kept exactly; dots are derived at `dpi`.
    pub fn from_mm(width_mm: f64, height_mm: f64, dpi: u32, source: DimensionSource) -> Self {
        let width_mm = width_mm.max(0.0);
        let height_mm = height_mm.max(0.0);
        Self {
            width_points: mm_to_points(width_mm, dpi),
            height_points: mm_to_points(height_mm, dpi),
            width_mm,
            height_mm,
            dpi,
            has_dimensions: width_mm > 0.0 || height_mm > 0.0,
            source,
        }
    }

    /// An extraction that found nothing.
    pub fn empty(dpi: u32) -> Self {
        Self::from_points(0, 0, dpi, DimensionSource::EmbeddedExtraction)
    }

    /// The same dot counts re-expressed at another resolution. The source is
    /// carried over unchanged.
    pub fn with_dpi(&self, dpi: u32) -> Self {
        Self::from_points(self.width_points, self.height_points, dpi, self.source)
    }

    pub fn width_points(&self) -> u32 {
        self.width_points
    }

    pub fn height_points(&self) -> u32 {
        self.height_points
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn has_dimensions(&self) -> bool {
        self.has_dimensions
    }

    pub fn source(&self) -> DimensionSource {
        self.source
    }
}

/// A file accepted by the detector and owned by the processing queue until
/// it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingItem {
    pub id: ItemId,
    pub file_path: PathBuf,
    pub file_name: String,
    /// Full file content as read after the file settled.
    pub content: String,
    /// Dimensions resolved from the first label unit of the file.
    pub dimensions: LabelDimensions,
    pub created_at: DateTime<Utc>,
    /// Number of times the file was found locked by the queue.
    pub retry_count: u32,
    pub error_message: Option<String>,
}

impl ProcessingItem {
    pub fn new(file_path: impl Into<PathBuf>, content: String, dimensions: LabelDimensions) -> Self {
        let file_path = file_path.into();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: ItemId::new(),
            file_path,
            file_name,
            content,
            dimensions,
            created_at: Utc::now(),
            retry_count: 0,
            error_message: None,
        }
    }

    /// Source file name without its extension.
    pub fn file_stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }
}

/// Point-in-time snapshot of the processing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items waiting to be dequeued (excludes items sleeping before a retry).
    pub queue_length: usize,
    /// Whether the background loop is running.
    pub is_processing: bool,
    pub max_concurrent_slots: usize,
    /// Items currently holding a worker slot.
    pub active_workers: usize,
}
