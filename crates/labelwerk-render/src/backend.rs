// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The production conversion backend: Labelary rendering into a PDF file.

use std::path::Path;

use async_trait::async_trait;
use labelwerk_core::backend::ConversionBackend;
use labelwerk_core::config::PipelineConfig;
use labelwerk_core::error::{LabelwerkError, Result};
use labelwerk_core::types::LabelUnit;
use tracing::{info, instrument};

use crate::labelary::{LabelaryRenderer, effective_dpi};
use crate::pdf::PdfAssembler;

/// Renders units to PNG over HTTP and writes them as pages of one PDF.
///
/// Pages are sized at the density configured when the backend was built, so
/// items are expected to be rendered at that same dpi.
#[derive(Debug, Clone)]
pub struct LabelaryPdfBackend {
    renderer: LabelaryRenderer,
    assembler: PdfAssembler,
}

impl LabelaryPdfBackend {
    pub fn new(renderer: LabelaryRenderer, assembler: PdfAssembler) -> Self {
        Self {
            renderer,
            assembler,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let renderer = LabelaryRenderer::new(&config.render_endpoint, config.render_timeout())?;
        let assembler = PdfAssembler::new(effective_dpi(config.dpi));
        Ok(Self::new(renderer, assembler))
    }
}

#[async_trait]
impl ConversionBackend for LabelaryPdfBackend {
    async fn render(
        &self,
        units: &[LabelUnit],
        width_mm: f64,
        height_mm: f64,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>> {
        self.renderer
            .render_all(units, width_mm, height_mm, dpi)
            .await
    }

    #[instrument(skip(self, buffers), fields(pages = buffers.len(), output = %output_path.display()))]
    async fn encode(&self, buffers: Vec<Vec<u8>>, output_path: &Path) -> Result<()> {
        let assembler = self.assembler.clone();
        let pdf = tokio::task::spawn_blocking(move || assembler.assemble(&buffers))
            .await
            .map_err(|e| LabelwerkError::Encode(format!("assembly task failed: {e}")))??;

        tokio::fs::write(output_path, &pdf).await?;
        info!(bytes = pdf.len(), "PDF written");
        Ok(())
    }

    fn name(&self) -> &str {
        "labelary-pdf"
    }
}
