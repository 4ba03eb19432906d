// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Labelwerk.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Labelwerk operations.
#[derive(Debug, Error)]
pub enum LabelwerkError {
    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Detection --
    #[error("folder watch failed: {0}")]
    Watch(String),

    #[error("file stayed locked past the retry budget: {}", .0.display())]
    LockTimeout(PathBuf),

    // -- Conversion --
    #[error("no label units found")]
    NoLabelUnits,

    #[error("label rendering failed: {0}")]
    Render(String),

    #[error("backend returned {actual} rendered labels for {expected} label units")]
    RenderCountMismatch { expected: usize, actual: usize },

    #[error("document encoding failed: {0}")]
    Encode(String),

    #[error("output file missing after conversion: {}", .0.display())]
    OutputMissing(PathBuf),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabelwerkError>;
