// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Physical unit conversion between printer dots ("points") and millimetres.

use serde::{Deserialize, Serialize};

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Unit in which explicit and default label sizes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementUnit {
    #[default]
    Mm,
    Cm,
    In,
}

impl MeasurementUnit {
    /// Convert a value expressed in this unit to millimetres.
    pub fn to_mm(&self, value: f64) -> f64 {
        match self {
            Self::Mm => value,
            Self::Cm => value * 10.0,
            Self::In => value * MM_PER_INCH,
        }
    }

    /// Parse a unit keyword (`mm`, `cm`, `in`), case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "mm" => Some(Self::Mm),
            "cm" => Some(Self::Cm),
            "in" | "inch" | "inches" => Some(Self::In),
            _ => None,
        }
    }
}

/// `points = round(mm / 25.4 * dpi)`.
pub fn mm_to_points(mm: f64, dpi: u32) -> u32 {
    let points = (mm / MM_PER_INCH * dpi as f64).round();
    if points <= 0.0 { 0 } else { points as u32 }
}

/// `mm = points / dpi * 25.4`. A zero dpi yields zero.
pub fn points_to_mm(points: u32, dpi: u32) -> f64 {
    if dpi == 0 {
        return 0.0;
    }
    points as f64 / dpi as f64 * MM_PER_INCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_to_mm_at_203_dpi() {
        let mm = points_to_mm(400, 203);
        assert!((mm - 50.04).abs() < 0.01, "got {mm}");
    }

    #[test]
    fn mm_to_points_rounds() {
        // 50mm at 203dpi = 399.6 dots
        assert_eq!(mm_to_points(50.0, 203), 400);
        assert_eq!(mm_to_points(25.4, 300), 300);
        assert_eq!(mm_to_points(-3.0, 203), 0);
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(MeasurementUnit::Cm.to_mm(10.0), 100.0);
        assert_eq!(MeasurementUnit::In.to_mm(2.0), 50.8);
        assert_eq!(MeasurementUnit::from_keyword(" IN "), Some(MeasurementUnit::In));
        assert_eq!(MeasurementUnit::from_keyword("pt"), None);
    }
}
