// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP label renderer speaking the Labelary API.
//
// Each label unit is POSTed as the request body to
// `{endpoint}/v1/printers/{dpmm}dpmm/labels/{w}x{h}/0/` and comes back as a
// PNG.  Sizes in the URL are inches; density is dots per millimetre and only
// takes the values the service supports.

use std::time::Duration;

use labelwerk_core::error::{LabelwerkError, Result};
use labelwerk_core::types::LabelUnit;
use labelwerk_core::units::MM_PER_INCH;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument, warn};

/// Print densities (dots per mm) the service can render.
pub const SUPPORTED_DPMM: [u32; 4] = [6, 8, 12, 24];

/// Largest label side the service accepts, in inches.
pub const MAX_SIDE_INCHES: f64 = 15.0;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Nearest supported density for a dots-per-inch value.
///
/// 152 dpi maps to 6 dpmm, 203 to 8, 300 to 12 and 600 to 24.
pub fn dpmm_for_dpi(dpi: u32) -> u32 {
    let wanted = f64::from(dpi) / MM_PER_INCH;
    SUPPORTED_DPMM
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (f64::from(*a) - wanted).abs();
            let db = (f64::from(*b) - wanted).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(8)
}

/// Dots per inch the service actually renders at for `dpi`.
pub fn effective_dpi(dpi: u32) -> f32 {
    (f64::from(dpmm_for_dpi(dpi)) * MM_PER_INCH) as f32
}

/// Inch value for the URL path: at most three decimals, no trailing zeros.
fn format_inches(mm: f64) -> String {
    let inches = (mm / MM_PER_INCH).clamp(0.001, MAX_SIDE_INCHES);
    let text = format!("{inches:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Client for a Labelary-compatible rendering service.
#[derive(Debug, Clone)]
pub struct LabelaryRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl LabelaryRenderer {
    /// Build a renderer for `endpoint` (scheme and host, no trailing path).
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LabelwerkError::Render(format!("HTTP client setup failed: {e}")))?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request URL for one label of the given size.
    pub fn label_url(&self, width_mm: f64, height_mm: f64, dpi: u32) -> String {
        format!(
            "{}/v1/printers/{}dpmm/labels/{}x{}/0/",
            self.endpoint,
            dpmm_for_dpi(dpi),
            format_inches(width_mm),
            format_inches(height_mm)
        )
    }

    /// Render one unit to PNG bytes.
    #[instrument(skip(self, unit), fields(unit_len = unit.len()))]
    pub async fn render_unit(
        &self,
        unit: &LabelUnit,
        width_mm: f64,
        height_mm: f64,
        dpi: u32,
    ) -> Result<Vec<u8>> {
        let url = self.label_url(width_mm, height_mm, dpi);
        debug!(%url, "rendering label");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "image/png")
            .body(unit.as_str().to_owned())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LabelwerkError::Render(format!("renderer timed out: {url}"))
                } else {
                    LabelwerkError::Render(format!("renderer request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "renderer rejected label");
            return Err(LabelwerkError::Render(format!(
                "renderer returned HTTP {status}: {}",
                body.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LabelwerkError::Render(format!("reading renderer response: {e}")))?;

        if !bytes.starts_with(PNG_MAGIC) {
            return Err(LabelwerkError::Render(
                "renderer response is not a PNG image".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }

    /// Render every unit in order. The first failure aborts the batch.
    pub async fn render_all(
        &self,
        units: &[LabelUnit],
        width_mm: f64,
        height_mm: f64,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>> {
        let mut images = Vec::with_capacity(units.len());
        for unit in units {
            images.push(self.render_unit(unit, width_mm, height_mm, dpi).await?);
        }
        Ok(images)
    }
}
