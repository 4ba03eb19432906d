// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary to the external rendering/encoding backend.
//
// The pipeline never interprets label markup or writes document bytes itself.
// It hands label units to a `ConversionBackend` and only checks the contract:
// N units in, N rendered payloads out, in the same order.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::LabelUnit;

/// Renders label units and encodes the rendered payloads into one output file.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Render each unit at the given physical size.
    ///
    /// Must return exactly one payload per unit, in unit order, or an error.
    async fn render(
        &self,
        units: &[LabelUnit],
        width_mm: f64,
        height_mm: f64,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>>;

    /// Encode the ordered payloads into a single file at `output_path`.
    async fn encode(&self, buffers: Vec<Vec<u8>>, output_path: &Path) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
