//! Pre-flight checks on the three spatial inputs.

use std::path::Path;

use carbon_core::crs::Crs;
use carbon_core::error::Stage;
use carbon_core::io::{self, REQUIRED_ZONE_FIELDS};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

/// Per-check results, printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub lulc: Check,
    pub zones: Check,
    pub boundary: Check,
    /// Absent when a file check already failed.
    pub crs: Option<Check>,
    pub fields: Option<Check>,
}

impl ValidationReport {
    /// True when every input file is present and non-empty. CRS and field
    /// problems are warnings only.
    pub fn files_ok(&self) -> bool {
        self.lulc.ok && self.zones.ok && self.boundary.ok
    }
}

fn check_file(path: &Path, label: &str, stage: Stage) -> Check {
    match carbon_core::pipeline::require_input(path, stage) {
        Ok(()) => {
            debug!(path = %path.display(), "{label} OK");
            Check::pass(format!("{label} OK: {}", path.display()))
        }
        Err(e) => Check::fail(format!("{label} not usable: {e}")),
    }
}

fn check_crs(lulc: &Path, zones: &Path, boundary: &Path) -> Check {
    let read = || -> carbon_core::Result<(Crs, Crs, Crs)> {
        Ok((
            io::read_raster_crs(lulc)?,
            io::read_feature_collection(zones, Stage::ReadZones)?.crs,
            io::read_feature_collection(boundary, Stage::ReadBoundary)?.crs,
        ))
    };
    let (grid, z, b) = match read() {
        Ok(v) => v,
        Err(e) => return Check::fail(format!("cannot read CRS: {e}")),
    };
    let mut mismatched = Vec::new();
    if z != grid {
        mismatched.push(format!("carbon_zones ({z}) != LULC ({grid})"));
    }
    if b != grid {
        mismatched.push(format!("boundary ({b}) != LULC ({grid})"));
    }
    if mismatched.is_empty() {
        Check::pass("All CRS match.")
    } else {
        let msg = format!("CRS mismatch: {}", mismatched.join("; "));
        warn!("{msg}");
        Check::fail(msg)
    }
}

fn check_fields(zones: &Path) -> Check {
    let fc = match io::read_feature_collection(zones, Stage::ReadZones) {
        Ok(fc) => fc,
        Err(e) => return Check::fail(e.to_string()),
    };
    let Some(first) = fc.features.first() else {
        return Check::fail("carbon_zones has no polygon features");
    };
    let missing: Vec<&str> = REQUIRED_ZONE_FIELDS
        .into_iter()
        .filter(|f| first.property(f).is_none())
        .collect();
    if missing.is_empty() {
        Check::pass("All required fields present.")
    } else {
        let msg = format!("Missing required fields in carbon_zones: {}", missing.join(", "));
        warn!("{msg}");
        Check::fail(msg)
    }
}

pub fn run_validation(lulc: &Path, zones: &Path, boundary: &Path) -> ValidationReport {
    let mut report = ValidationReport {
        lulc: check_file(lulc, "LULC raster", Stage::ReadGrid),
        zones: check_file(zones, "carbon_zones", Stage::ReadZones),
        boundary: check_file(boundary, "boundary", Stage::ReadBoundary),
        crs: None,
        fields: None,
    };
    if report.files_ok() {
        report.crs = Some(check_crs(lulc, zones, boundary));
        report.fields = Some(check_fields(zones));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::grid::{GeoTransform, LandCoverGrid};

    const ZONES: &str = r#"{"type":"FeatureCollection",
      "crs":{"type":"name","properties":{"name":"EPSG:32636"}},
      "features":[{"type":"Feature",
        "properties":{"CODE":"A","GEZ_TERM":"Boreal","FRONTIER":0,"REGION":"Asia"},
        "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;

    const BOUNDARY_WGS84: &str = r#"{"type":"FeatureCollection",
      "features":[{"type":"Feature","properties":{"NAME":"X"},
        "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;

    fn write_grid(path: &Path) {
        let grid = LandCoverGrid::new(1, 1, vec![1], GeoTransform::new(0.0, 1.0, 1.0, -1.0), Crs::Epsg(32636));
        io::write_land_cover(path, &grid).unwrap();
    }

    #[test]
    fn missing_file_fails_and_skips_later_checks() {
        let dir = tempfile::tempdir().unwrap();
        let zones = dir.path().join("zones.geojson");
        std::fs::write(&zones, ZONES).unwrap();
        let report = run_validation(&dir.path().join("lulc.tif"), &zones, &zones);
        assert!(!report.lulc.ok);
        assert!(report.zones.ok);
        assert!(!report.files_ok());
        assert!(report.crs.is_none());
    }

    #[test]
    fn crs_mismatch_is_reported_but_files_pass() {
        let dir = tempfile::tempdir().unwrap();
        let lulc = dir.path().join("lulc.tif");
        let zones = dir.path().join("zones.geojson");
        let boundary = dir.path().join("boundary.geojson");
        write_grid(&lulc);
        std::fs::write(&zones, ZONES).unwrap();
        std::fs::write(&boundary, BOUNDARY_WGS84).unwrap();

        let report = run_validation(&lulc, &zones, &boundary);
        assert!(report.files_ok());
        let crs = report.crs.unwrap();
        assert!(!crs.ok);
        assert!(crs.message.contains("boundary (EPSG:4326)"), "{}", crs.message);
        assert!(report.fields.unwrap().ok);
    }

    #[test]
    fn missing_zone_fields_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let lulc = dir.path().join("lulc.tif");
        let zones = dir.path().join("zones.geojson");
        write_grid(&lulc);
        std::fs::write(&zones, ZONES.replace("\"GEZ_TERM\":\"Boreal\",", "")).unwrap();
        let report = run_validation(&lulc, &zones, &zones);
        let fields = report.fields.unwrap();
        assert!(!fields.ok);
        assert!(fields.message.ends_with("GEZ_TERM"));
    }
}
