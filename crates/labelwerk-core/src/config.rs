// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LabelwerkError, Result};
use crate::units::MeasurementUnit;

/// Default Labelary-compatible render endpoint.
pub const DEFAULT_RENDER_ENDPOINT: &str = "http://api.labelary.com";

/// Settings for the watch/convert pipeline, passed into each component at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory watched for incoming label files (created if absent).
    pub watch_dir: PathBuf,
    /// Where PDFs are written. `None` writes beside the source file.
    pub output_dir: Option<PathBuf>,
    /// Lock retries the queue allows before giving up on a file.
    pub max_retries: u32,
    /// Delay before a locked item is re-enqueued.
    pub retry_delay_ms: u64,
    /// Worker slots processing items concurrently.
    pub max_concurrent: usize,
    /// Pause after detection before the file is touched.
    pub settle_delay_ms: u64,
    /// Lock probes the detector makes before abandoning a file.
    pub lock_attempts: u32,
    pub lock_retry_interval_ms: u64,
    /// Period of the directory re-scan backing up native notifications.
    pub poll_interval_ms: u64,
    /// How long the queue loop idles when there is nothing to dequeue.
    pub idle_wait_ms: u64,
    /// Pause after an unexpected loop-level failure.
    pub error_pause_ms: u64,
    /// Fallback label width, in `unit`.
    pub default_width: f64,
    /// Fallback label height, in `unit`.
    pub default_height: f64,
    pub unit: MeasurementUnit,
    pub dpi: u32,
    /// Operator override for the label width, in `unit`.
    pub explicit_width: Option<f64>,
    /// Operator override for the label height, in `unit`.
    pub explicit_height: Option<f64>,
    pub render_endpoint: String,
    pub render_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("labels"),
            output_dir: None,
            max_retries: 3,
            retry_delay_ms: 2_000,
            max_concurrent: 1,
            settle_delay_ms: 500,
            lock_attempts: 3,
            lock_retry_interval_ms: 1_000,
            poll_interval_ms: 2_000,
            idle_wait_ms: 250,
            error_pause_ms: 1_000,
            default_width: 100.0,
            default_height: 150.0,
            unit: MeasurementUnit::Mm,
            dpi: 203,
            explicit_width: None,
            explicit_height: None,
            render_endpoint: DEFAULT_RENDER_ENDPOINT.into(),
            render_timeout_secs: 30,
        }
    }
}

/// Fallback size and resolution used by the dimension resolver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionDefaults {
    pub width: f64,
    pub height: f64,
    pub unit: MeasurementUnit,
    pub dpi: u32,
}

impl Default for DimensionDefaults {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 150.0,
            unit: MeasurementUnit::Mm,
            dpi: 203,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(LabelwerkError::Config("max_concurrent must be at least 1".into()));
        }
        if self.dpi == 0 {
            return Err(LabelwerkError::Config("dpi must be positive".into()));
        }
        if self.default_width <= 0.0 || self.default_height <= 0.0 {
            return Err(LabelwerkError::Config(format!(
                "default size must be positive, got {}x{}",
                self.default_width, self.default_height
            )));
        }
        if self.lock_attempts == 0 {
            return Err(LabelwerkError::Config("lock_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn dimension_defaults(&self) -> DimensionDefaults {
        DimensionDefaults {
            width: self.default_width,
            height: self.default_height,
            unit: self.unit,
            dpi: self.dpi,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}
