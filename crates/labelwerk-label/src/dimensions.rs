// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Label dimension resolution.
//
// Size comes from one of three tiers, in strict order:
//   1. `^PW` (print width) / `^LL` (label length) directives in the label
//   2. an explicit width/height supplied by the operator
//   3. the configured default size
// Embedded directives always win over operator overrides.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use labelwerk_core::config::DimensionDefaults;
use labelwerk_core::types::{DimensionSource, LabelDimensions, LabelUnit};
use labelwerk_core::units::MeasurementUnit;

static RE_PRINT_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\^PW(\d+)").expect("print width pattern is valid"));

static RE_LABEL_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\^LL(\d+)").expect("label length pattern is valid"));

/// Smallest accepted label side, in millimetres.
pub const MIN_SIDE_MM: f64 = 1.0;

/// Largest accepted label side, in millimetres.
pub const MAX_SIDE_MM: f64 = 1000.0;

/// Resolves the physical size of a label using the configured defaults.
#[derive(Debug, Clone, Copy)]
pub struct DimensionResolver {
    defaults: DimensionDefaults,
}

impl Default for DimensionResolver {
    fn default() -> Self {
        Self::new(DimensionDefaults::default())
    }
}

impl DimensionResolver {
    pub fn new(defaults: DimensionDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &DimensionDefaults {
        &self.defaults
    }

    /// Read `^PW` and `^LL` from a label unit, in dots at the default dpi.
    ///
    /// A side with no directive is 0. The first occurrence of each directive
    /// is used.
    pub fn extract_from_unit(&self, unit: &LabelUnit) -> LabelDimensions {
        let width = first_number(&RE_PRINT_WIDTH, unit.as_str());
        let height = first_number(&RE_LABEL_LENGTH, unit.as_str());

        let dims = LabelDimensions::from_points(
            width.unwrap_or(0),
            height.unwrap_or(0),
            self.defaults.dpi,
            DimensionSource::EmbeddedExtraction,
        );
        debug!(
            width_points = dims.width_points(),
            height_points = dims.height_points(),
            has_dimensions = dims.has_dimensions(),
            "extracted embedded dimensions"
        );
        dims
    }

    /// Both sides positive and within [1mm, 1000mm].
    pub fn validate(dims: &LabelDimensions) -> bool {
        dims.width_points() > 0
            && dims.height_points() > 0
            && side_in_range(dims.width_mm())
            && side_in_range(dims.height_mm())
    }

    /// Apply the embedded > explicit > default cascade.
    ///
    /// `explicit_width`/`explicit_height` are in `unit`; both must be present
    /// for the explicit tier to apply.
    pub fn apply_priority(
        &self,
        explicit_width: Option<f64>,
        explicit_height: Option<f64>,
        unit: MeasurementUnit,
        extracted: &LabelDimensions,
        dpi: u32,
    ) -> LabelDimensions {
        if Self::validate(extracted) {
            let dims = extracted.with_dpi(dpi);
            debug!(
                width_mm = dims.width_mm(),
                height_mm = dims.height_mm(),
                "using embedded dimensions"
            );
            return dims;
        }

        if let (Some(width), Some(height)) = (explicit_width, explicit_height) {
            let dims = LabelDimensions::from_mm(
                unit.to_mm(width),
                unit.to_mm(height),
                dpi,
                DimensionSource::ExplicitParameter,
            );
            if Self::validate(&dims) {
                debug!(
                    width_mm = dims.width_mm(),
                    height_mm = dims.height_mm(),
                    "using explicit dimensions"
                );
                return dims;
            }
            debug!(width, height, ?unit, "explicit dimensions out of range, ignoring");
        }

        let dims = LabelDimensions::from_mm(
            self.defaults.unit.to_mm(self.defaults.width),
            self.defaults.unit.to_mm(self.defaults.height),
            dpi,
            DimensionSource::Default,
        );
        debug!(
            width_mm = dims.width_mm(),
            height_mm = dims.height_mm(),
            "using default dimensions"
        );
        dims
    }
}

fn first_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

fn side_in_range(mm: f64) -> bool {
    (MIN_SIDE_MM..=MAX_SIDE_MM).contains(&mm)
}
