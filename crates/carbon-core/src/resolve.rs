//! Attribute resolution: turn cross-tab rows into coefficient rows through
//! chained left joins against the zone attributes, the crosswalk and the
//! coefficient lookup.
//!
//! A join miss is never an error. The row stays, carrying `None` forward to
//! the fallback rules and the aggregator's defaulting.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classes::{igbp_label, ClassGroup, LandCoverCode};
use crate::lookup::{normalize_key, LookupKey, LookupTables};
use crate::overlay::CrossTabRow;
use crate::zones::{ClippedZoneSet, ZoneId};

/// Rule tag of a row no fallback rule touched.
pub const NO_RULE: &str = "none";

/// Where a row's raw carbon value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Exact (classification, region, ecological zone, frontier) match.
    Exact,
    /// Region-independent row of the lookup.
    Global,
    /// Degraded join on land-cover code alone.
    LandCoverCode,
    /// Forced to zero as a non-vegetated class.
    NonVegetated,
    Unmatched,
}

impl LookupSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupSource::Exact => "exact",
            LookupSource::Global => "global",
            LookupSource::LandCoverCode => "land_cover_code",
            LookupSource::NonVegetated => "non_vegetated",
            LookupSource::Unmatched => "unmatched",
        }
    }
}

/// One (land-cover code, zone) combination with its resolved coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub land_cover_code: LandCoverCode,
    pub zone_id: ZoneId,
    pub pixel_count: u64,
    /// Empty when the zone id has no attributes.
    pub region: String,
    pub ecological_zone: String,
    pub frontier: u8,
    pub raw_code: String,
    pub label: String,
    pub classification_code: Option<String>,
    pub raw_carbon_value: Option<f64>,
    pub adjusted_carbon_value: Option<f64>,
    pub rule_applied: String,
    pub lookup_source: LookupSource,
}

impl CoefficientRow {
    /// The value aggregation and painting use: adjusted, else raw.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        self.adjusted_carbon_value.or(self.raw_carbon_value)
    }

    /// pixel_count × value × pixel area; 0 when the value is absent.
    pub fn total_carbon_mass(&self, pixel_area_ha: f64) -> f64 {
        self.value()
            .map_or(0.0, |v| self.pixel_count as f64 * v * pixel_area_ha)
    }
}

/// Knobs of the resolution stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOptions {
    /// Force value 0 for urban and water regardless of lookup outcome.
    pub zero_non_vegetated: bool,
    /// Classifications filled from the global region when still absent.
    pub global_classifications: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            zero_non_vegetated: true,
            global_classifications: default_global_classifications(),
        }
    }
}

pub fn default_global_classifications() -> Vec<String> {
    vec![
        "16: Cultivated and managed land".to_string(),
        "19: Bare areas".to_string(),
        "20 - 23: Water, snow and ice;artificial surfaces".to_string(),
    ]
}

/// Resolve a coefficient for every cross-tab row.
///
/// Join order:
///   1. zone id → region, ecological zone, frontier
///   2. land-cover code → classification (crosswalk)
///   3. 4-part key → carbon value; if this matches no row at all, every row
///      is instead joined on land-cover code alone
///   4. still-absent rows of a region-independent classification take the
///      global value
///   5. non-vegetated codes are forced to 0 when enabled
///
/// Output keeps the cross-tab order; `adjusted_carbon_value` starts equal to
/// `raw_carbon_value`.
pub fn resolve_coefficients(
    crosstab: &[CrossTabRow],
    zones: &ClippedZoneSet,
    tables: &LookupTables,
    options: &ResolveOptions,
) -> Vec<CoefficientRow> {
    let mut rows: Vec<CoefficientRow> = crosstab
        .iter()
        .map(|ct| {
            let attrs = zones.attributes(ct.zone_id);
            if attrs.is_none() {
                debug!(zone_id = ct.zone_id, "zone id has no attributes");
            }
            let cw = tables.crosswalk.get(ct.land_cover_code);
            CoefficientRow {
                land_cover_code: ct.land_cover_code,
                zone_id: ct.zone_id,
                pixel_count: ct.pixel_count,
                region: attrs.map(|a| a.region.clone()).unwrap_or_default(),
                ecological_zone: attrs.map(|a| a.ecological_zone.clone()).unwrap_or_default(),
                frontier: attrs.map_or(0, |a| a.frontier),
                raw_code: attrs.map(|a| a.raw_code.clone()).unwrap_or_default(),
                label: cw
                    .map(|e| e.label.clone())
                    .filter(|l| !l.is_empty())
                    .or_else(|| igbp_label(ct.land_cover_code).map(str::to_string))
                    .unwrap_or_default(),
                classification_code: cw.map(|e| e.classification.clone()),
                raw_carbon_value: None,
                adjusted_carbon_value: None,
                rule_applied: NO_RULE.to_string(),
                lookup_source: LookupSource::Unmatched,
            }
        })
        .collect();

    // ── Primary 4-part join ───────────────────────────────────────────────────
    let mut matched = 0usize;
    for row in rows.iter_mut() {
        let Some(classification) = row.classification_code.as_deref() else {
            continue;
        };
        if zones.attributes(row.zone_id).is_none() {
            continue;
        }
        let key = LookupKey::new(classification, &row.region, &row.ecological_zone, row.frontier);
        if let Some(v) = tables.coefficients.get(&key) {
            row.raw_carbon_value = Some(v);
            row.lookup_source = LookupSource::Exact;
            matched += 1;
        }
    }
    info!(matched, rows = rows.len(), "joined coefficient lookup");

    // ── Degraded join, only on total primary failure ──────────────────────────
    if matched == 0 && !rows.is_empty() && tables.coefficients.has_code_column() {
        warn!("coefficient lookup matched no rows on the 4-part key; joining on land-cover code");
        for row in rows.iter_mut() {
            if let Some(v) = tables.coefficients.get_by_code(row.land_cover_code) {
                row.raw_carbon_value = Some(v);
                row.lookup_source = LookupSource::LandCoverCode;
            }
        }
    }

    // ── Region-independent fill ───────────────────────────────────────────────
    let global: Vec<String> = options
        .global_classifications
        .iter()
        .map(|c| normalize_key(c))
        .collect();
    let mut global_filled = 0usize;
    for row in rows.iter_mut().filter(|r| r.raw_carbon_value.is_none()) {
        let Some(classification) = row.classification_code.as_deref() else {
            continue;
        };
        if !global.contains(&normalize_key(classification)) {
            continue;
        }
        if let Some(v) = tables.coefficients.get_global(classification) {
            row.raw_carbon_value = Some(v);
            row.lookup_source = LookupSource::Global;
            global_filled += 1;
        }
    }
    if global_filled > 0 {
        debug!(global_filled, "filled region-independent coefficients");
    }

    // ── Non-vegetated zero rule ───────────────────────────────────────────────
    if options.zero_non_vegetated {
        for row in rows
            .iter_mut()
            .filter(|r| ClassGroup::NonVegetated.contains(r.land_cover_code))
        {
            row.raw_carbon_value = Some(0.0);
            row.lookup_source = LookupSource::NonVegetated;
        }
    }

    for row in rows.iter_mut() {
        row.adjusted_carbon_value = row.raw_carbon_value;
    }
    rows
}
