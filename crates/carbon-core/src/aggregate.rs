//! Collapse per-(class, zone) coefficients to one value per land-cover class.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classes::{output_codes, LandCoverCode};
use crate::resolve::CoefficientRow;

/// Aggregation strategy, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Value of the zone with the most pixels of the class.
    #[default]
    Dominant,
    /// Pixel-count-weighted mean over zones with a value.
    Weighted,
}

impl AggregationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMethod::Dominant => "dominant",
            AggregationMethod::Weighted => "weighted",
        }
    }

    /// Reduce the rows of one class. `None` when no supporting value exists.
    pub fn class_value<'a>(self, rows: impl Iterator<Item = &'a CoefficientRow>) -> Option<f64> {
        match self {
            AggregationMethod::Dominant => dominant_value(rows),
            AggregationMethod::Weighted => weighted_value(rows),
        }
    }

    /// Exactly one row per code 1..=17, in code order.
    pub fn aggregate(self, rows: &[CoefficientRow]) -> Vec<AggregatedRow> {
        output_codes()
            .map(|code| {
                let value = self.class_value(rows.iter().filter(|r| r.land_cover_code == code));
                AggregatedRow {
                    land_cover_code: code,
                    carbon_value: value.unwrap_or(0.0),
                    defaulted: value.is_none(),
                }
            })
            .collect()
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dominant" => Ok(AggregationMethod::Dominant),
            "weighted" => Ok(AggregationMethod::Weighted),
            other => Err(format!("unknown aggregation method '{other}' (expected dominant or weighted)")),
        }
    }
}

/// Final coefficient of one land-cover class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub land_cover_code: LandCoverCode,
    pub carbon_value: f64,
    /// True when no row supplied a value.
    pub defaulted: bool,
}

/// Row with the strictly greatest pixel count; the first row wins ties.
fn dominant_value<'a>(rows: impl Iterator<Item = &'a CoefficientRow>) -> Option<f64> {
    let mut best: Option<&CoefficientRow> = None;
    for row in rows {
        if best.map_or(true, |b| row.pixel_count > b.pixel_count) {
            best = Some(row);
        }
    }
    best.and_then(CoefficientRow::value)
}

/// Σ(count × value) / Σ(count) over rows with a value. Zero weight is `None`.
fn weighted_value<'a>(rows: impl Iterator<Item = &'a CoefficientRow>) -> Option<f64> {
    let (num, den) = rows
        .filter_map(|r| r.value().map(|v| (r.pixel_count as f64, v)))
        .fold((0.0, 0.0), |(num, den), (w, v)| (num + w * v, den + w));
    (den > 0.0).then(|| num / den)
}

/// Σ pixel_count × value × pixel area over every row.
pub fn total_carbon_mass(rows: &[CoefficientRow], pixel_area_ha: f64) -> f64 {
    rows.iter().map(|r| r.total_carbon_mass(pixel_area_ha)).sum()
}
