// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelwerk core: types, configuration, and error definitions shared across
// all crates.

pub mod backend;
pub mod config;
pub mod error;
pub mod types;
pub mod units;

pub use backend::ConversionBackend;
pub use config::PipelineConfig;
pub use error::LabelwerkError;
pub use types::*;
pub use units::MeasurementUnit;
