//! CSV codecs for the reference tables, the expert overrides and the two
//! coefficient outputs.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::AggregatedRow;
use crate::classes::LandCoverCode;
use crate::error::{CarbonError, Result, Stage};
use crate::lookup::{parse_frontier, CoefficientLookup, Crosswalk, CrosswalkEntry, LookupEntry, LookupKey};
use crate::overrides::OverrideRow;
use crate::resolve::CoefficientRow;

fn reader(path: &Path, stage: Stage) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| CarbonError::input(stage, path, e.to_string()))?;
    Ok(ReaderBuilder::new().trim(Trim::All).flexible(true).from_reader(file))
}

fn writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| CarbonError::input(Stage::WriteOutputs, dir, e.to_string()))?;
    }
    let file = File::create(path).map_err(|e| CarbonError::input(Stage::WriteOutputs, path, e.to_string()))?;
    Ok(WriterBuilder::new().from_writer(file))
}

// ── Crosswalk ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CrosswalkRecord {
    #[serde(rename = "LULC")]
    lulc: LandCoverCode,
    #[serde(rename = "LULC_CLASS", default)]
    label: String,
    #[serde(rename = "GLC2000 Class")]
    classification: String,
}

/// Crosswalk CSV: `LULC, LULC_CLASS, GLC2000 Class`.
pub fn read_crosswalk(path: &Path) -> Result<Crosswalk> {
    let mut rdr = reader(path, Stage::ReadTables)?;
    let mut entries = Vec::new();
    for record in rdr.deserialize::<CrosswalkRecord>() {
        let r = record?;
        entries.push(CrosswalkEntry {
            land_cover_code: r.lulc,
            label: r.label,
            classification: r.classification,
        });
    }
    if entries.is_empty() {
        return Err(CarbonError::input(Stage::ReadTables, path, "crosswalk has no rows"));
    }
    debug!(rows = entries.len(), "read crosswalk");
    Ok(Crosswalk::new(entries))
}

// ── Coefficient lookup ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LookupRecord {
    #[serde(rename = "GLC2000")]
    classification: String,
    #[serde(rename = "REGION")]
    region: String,
    #[serde(rename = "GEZ_TERM")]
    ecological_zone: String,
    #[serde(rename = "FRONTIER")]
    frontier: String,
    #[serde(rename = "CARBON_VALUE")]
    carbon_value: Option<f64>,
    #[serde(rename = "LULC", default)]
    lulc: Option<LandCoverCode>,
}

/// Coefficient CSV: `GLC2000, REGION, GEZ_TERM, FRONTIER, CARBON_VALUE[, LULC]`.
///
/// Rows with an empty value or an unreadable frontier are skipped with a
/// warning; the table itself must not be empty.
pub fn read_coefficient_lookup(path: &Path, global_region: &str) -> Result<CoefficientLookup> {
    let mut rdr = reader(path, Stage::ReadTables)?;
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.deserialize::<LookupRecord>() {
        let r = record?;
        let (Some(carbon_value), Some(frontier)) = (r.carbon_value, parse_frontier(&r.frontier)) else {
            skipped += 1;
            continue;
        };
        entries.push(LookupEntry {
            key: LookupKey::new(&r.classification, &r.region, &r.ecological_zone, frontier),
            carbon_value,
            land_cover_code: r.lulc,
        });
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped lookup rows without a value or frontier flag");
    }
    if entries.is_empty() {
        return Err(CarbonError::input(Stage::ReadTables, path, "coefficient lookup has no usable rows"));
    }
    debug!(rows = entries.len(), "read coefficient lookup");
    Ok(CoefficientLookup::new(entries, global_region))
}

// ── Expert overrides ─────────────────────────────────────────────────────────

pub const OVERRIDE_CODE_COLUMN: &str = "lucode";
pub const OVERRIDE_VALUE_COLUMN: &str = "c_above_override";

#[derive(Debug, Deserialize)]
struct OverrideRecord {
    /// Spreadsheet exports write codes as `3.0`.
    lucode: f64,
    c_above_override: Option<f64>,
}

fn whole_code(v: f64) -> Option<LandCoverCode> {
    (v.fract() == 0.0 && v >= 0.0 && v <= f64::from(LandCoverCode::MAX)).then_some(v as LandCoverCode)
}

/// Overrides CSV: `lucode, c_above_override`.
///
/// A file without both columns is a configuration warning: logged, `None`
/// returned, and the run continues without overrides. Rows with an empty
/// value are ignored; rows whose code or value cannot be read are skipped
/// with a warning.
pub fn read_overrides(path: &Path) -> Result<Option<Vec<OverrideRow>>> {
    let mut rdr = reader(path, Stage::ReadTables)?;
    let headers = rdr.headers()?.clone();
    let missing: Vec<&str> = [OVERRIDE_CODE_COLUMN, OVERRIDE_VALUE_COLUMN]
        .into_iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        warn!(path = %path.display(), ?missing, "override table lacks required columns; overrides skipped");
        return Ok(None);
    }
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.deserialize::<OverrideRecord>() {
        let r = match record {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Deserialize { .. }) => {
                debug!(error = %e, "unreadable override row");
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let Some(land_cover_code) = whole_code(r.lucode) else {
            skipped += 1;
            continue;
        };
        if let Some(override_value) = r.c_above_override {
            rows.push(OverrideRow { land_cover_code, override_value });
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped override rows with an unreadable code or value");
    }
    debug!(rows = rows.len(), "read expert overrides");
    Ok(Some(rows))
}

// ── Outputs ──────────────────────────────────────────────────────────────────

/// One line of the per-(class, zone) coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRecord {
    pub lucode: LandCoverCode,
    pub label: String,
    pub classification_code: String,
    pub region: String,
    pub ecological_zone: String,
    pub frontier: u8,
    pub zone_id: u32,
    pub pixel_count: u64,
    pub raw_carbon_value: Option<f64>,
    pub carbon_value: Option<f64>,
    pub rule_applied: String,
    pub lookup_source: String,
    pub total_carbon_mass: f64,
}

impl CoefficientRecord {
    pub fn from_row(row: &CoefficientRow, pixel_area_ha: f64) -> Self {
        Self {
            lucode: row.land_cover_code,
            label: row.label.clone(),
            classification_code: row.classification_code.clone().unwrap_or_default(),
            region: row.region.clone(),
            ecological_zone: row.ecological_zone.clone(),
            frontier: row.frontier,
            zone_id: row.zone_id,
            pixel_count: row.pixel_count,
            raw_carbon_value: row.raw_carbon_value,
            carbon_value: row.value(),
            rule_applied: row.rule_applied.clone(),
            lookup_source: row.lookup_source.as_str().to_string(),
            total_carbon_mass: row.total_carbon_mass(pixel_area_ha),
        }
    }
}

/// Write the coefficient table sorted by (code, region, ecological zone,
/// frontier, zone id).
pub fn write_coefficient_table(path: &Path, rows: &[CoefficientRow], pixel_area_ha: f64) -> Result<usize> {
    let mut records: Vec<CoefficientRecord> =
        rows.iter().map(|r| CoefficientRecord::from_row(r, pixel_area_ha)).collect();
    records.sort_by(|a, b| {
        (a.lucode, &a.region, &a.ecological_zone, a.frontier, a.zone_id)
            .cmp(&(b.lucode, &b.region, &b.ecological_zone, b.frontier, b.zone_id))
    });
    let mut wtr = writer(path)?;
    for r in &records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(records.len())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassRecord {
    pub lucode: LandCoverCode,
    pub carbon_value: f64,
}

/// Write the fixed per-class table `{lucode, carbon_value}`.
pub fn write_class_table(path: &Path, rows: &[AggregatedRow]) -> Result<()> {
    let mut wtr = writer(path)?;
    for r in rows {
        wtr.serialize(ClassRecord { lucode: r.land_cover_code, carbon_value: r.carbon_value })?;
    }
    wtr.flush()?;
    Ok(())
}
