//! Pipeline orchestrator: runs every stage in order for one grid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::{total_carbon_mass, AggregatedRow, AggregationMethod};
use crate::classes::{LandCoverCode, CLASS_COUNT};
use crate::density::paint_density;
use crate::error::{CarbonError, Result, Stage};
use crate::grid::{CodeRange, DensityGrid, LandCoverGrid};
use crate::io;
use crate::lookup::LookupTables;
use crate::overlay::{run_overlay, Overlay};
use crate::overrides::{apply_overrides, OverrideRow};
use crate::resolve::{default_global_classifications, resolve_coefficients, CoefficientRow, ResolveOptions};
use crate::rules::{apply_fallback_rules, RuleConfig};
use crate::zones::{BoundaryLayer, ZoneLayer};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Run-wide settings. Built once, passed by reference to every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregation: AggregationMethod,
    pub rules: RuleConfig,
    /// Force urban (13) and water (17) to zero carbon.
    pub zero_non_vegetated: bool,
    /// Grid codes at or above this value are invalid.
    pub invalid_code_threshold: i32,
    /// Highest land-cover code counted; larger grid values are skipped.
    pub max_class_code: LandCoverCode,
    pub density_nodata: f32,
    /// Region name of the region-independent lookup rows.
    pub global_region: String,
    pub global_classifications: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationMethod::Dominant,
            rules: RuleConfig::default(),
            zero_non_vegetated: true,
            invalid_code_threshold: 255,
            max_class_code: CLASS_COUNT,
            density_nodata: -9999.0,
            global_region: "Global".to_string(),
            global_classifications: default_global_classifications(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        if self.invalid_code_threshold < 2 {
            return Err(CarbonError::Config(format!(
                "invalid_code_threshold must be at least 2, got {}",
                self.invalid_code_threshold
            )));
        }
        if self.max_class_code < 1 {
            return Err(CarbonError::Config("max_class_code must be at least 1".into()));
        }
        if self.density_nodata.is_nan() {
            return Err(CarbonError::Config("density_nodata must be a number".into()));
        }
        Ok(())
    }

    pub fn code_range(&self) -> CodeRange {
        CodeRange {
            max_code: self.max_class_code,
            invalid_threshold: self.invalid_code_threshold,
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            zero_non_vegetated: self.zero_non_vegetated,
            global_classifications: self.global_classifications.clone(),
        }
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Input file locations. `expert_overrides` is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPaths {
    pub land_cover: PathBuf,
    pub zones: PathBuf,
    pub boundary: PathBuf,
    pub crosswalk: PathBuf,
    pub coefficient_lookup: PathBuf,
    pub expert_overrides: Option<PathBuf>,
}

/// Everything one run reads, held in memory.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub grid: LandCoverGrid,
    pub zones: ZoneLayer,
    pub boundary: BoundaryLayer,
    pub tables: LookupTables,
    pub overrides: Option<Vec<OverrideRow>>,
}

impl PipelineInputs {
    pub fn load(paths: &InputPaths, config: &PipelineConfig) -> Result<Self> {
        let grid = io::read_land_cover(&paths.land_cover)?;
        info!(width = grid.width, height = grid.height, crs = %grid.crs, "loaded land-cover grid");
        let zones = io::read_zones(&paths.zones)?;
        let boundary = io::read_boundary(&paths.boundary)?;
        let tables = LookupTables {
            crosswalk: io::read_crosswalk(&paths.crosswalk)?,
            coefficients: io::read_coefficient_lookup(&paths.coefficient_lookup, &config.global_region)?,
        };
        info!(
            zones = zones.zones.len(),
            crosswalk = tables.crosswalk.len(),
            lookup = tables.coefficients.len(),
            "loaded zones and lookup tables"
        );
        let overrides = match &paths.expert_overrides {
            Some(p) if p.exists() => io::read_overrides(p)?,
            Some(p) => {
                warn!(path = %p.display(), "expert overrides file not found; overrides skipped");
                None
            }
            None => None,
        };
        Ok(Self { grid, zones, boundary, tables, overrides })
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Full output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub overlay: Overlay,
    /// Post-fallback rows, in cross-tab order.
    pub coefficients: Vec<CoefficientRow>,
    /// Exactly 17 rows, overrides applied.
    pub classes: Vec<AggregatedRow>,
    pub density: DensityGrid,
    pub total_carbon_mass: f64,
    pub overrides_applied: usize,
}

/// Output file locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub coefficient_table: PathBuf,
    pub class_table: PathBuf,
    pub density_raster: PathBuf,
    /// Zones left after the boundary clip, in the grid's reference.
    pub clipped_zones: PathBuf,
    pub run_summary: PathBuf,
}

impl OutputPaths {
    /// Conventional names under `dir`, prefixed with the lowercase identifier.
    pub fn in_dir(dir: &Path, identifier: &str) -> Self {
        let stem = identifier.trim().to_lowercase();
        Self {
            coefficient_table: dir.join(format!("{stem}_overlay_counts.csv")),
            class_table: dir.join(format!("{stem}_carbon_coefficients.csv")),
            density_raster: dir.join(format!("{stem}_carbon_density.tif")),
            clipped_zones: dir.join(format!("{stem}_carbon_zones_clipped.geojson")),
            run_summary: dir.join("run_info.json"),
        }
    }

    pub fn existing(&self) -> Vec<&Path> {
        [
            &self.coefficient_table,
            &self.class_table,
            &self.density_raster,
            &self.clipped_zones,
            &self.run_summary,
        ]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|p| p.exists())
            .collect()
    }
}

/// Metadata record written next to the outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub identifier: String,
    pub record_count: usize,
    pub aggregation_method: AggregationMethod,
    pub rules: RuleConfig,
    pub zero_non_vegetated: bool,
    pub clipped_zones: usize,
    pub pixel_area_ha: f64,
    pub total_carbon_mass: f64,
    pub defaulted_classes: usize,
    pub overrides_applied: usize,
    pub outputs: OutputPaths,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct CarbonPipeline {
    config: PipelineConfig,
}

impl CarbonPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on in-memory inputs.
    ///
    /// Pipeline order:
    ///   1. Spatial overlay
    ///   2. Attribute resolution
    ///   3. Fallback rules
    ///   4. Aggregation, then expert overrides
    ///   5. Density painting (from step 3, independent of step 4)
    pub fn run(&self, inputs: PipelineInputs) -> Result<PipelineResult> {
        let cfg = &self.config;

        // ── 1. Overlay ──────────────────────────────────────────────────────
        let overlay = run_overlay(&inputs.grid, inputs.zones, &inputs.boundary, cfg.code_range())?;

        // ── 2. Resolution ───────────────────────────────────────────────────
        let mut coefficients =
            resolve_coefficients(&overlay.crosstab, &overlay.zones, &inputs.tables, &cfg.resolve_options());

        // ── 3. Fallback rules ───────────────────────────────────────────────
        apply_fallback_rules(&mut coefficients, &cfg.rules);

        // ── 4. Aggregation + overrides ──────────────────────────────────────
        let mut classes = cfg.aggregation.aggregate(&coefficients);
        let overrides_applied = match &inputs.overrides {
            Some(o) => apply_overrides(&mut classes, o),
            None => 0,
        };
        info!(
            method = %cfg.aggregation,
            defaulted = classes.iter().filter(|c| c.defaulted).count(),
            overrides_applied,
            "aggregated per-class coefficients"
        );

        // ── 5. Density ──────────────────────────────────────────────────────
        let density = paint_density(
            &inputs.grid,
            &overlay.zone_grid,
            &coefficients,
            cfg.code_range(),
            cfg.density_nodata,
        );

        let total_carbon_mass = total_carbon_mass(&coefficients, overlay.pixel_area_ha);
        Ok(PipelineResult {
            overlay,
            coefficients,
            classes,
            density,
            total_carbon_mass,
            overrides_applied,
        })
    }

    pub fn summarize(&self, identifier: &str, result: &PipelineResult, outputs: &OutputPaths) -> RunSummary {
        RunSummary {
            identifier: identifier.to_string(),
            record_count: result.coefficients.len(),
            aggregation_method: self.config.aggregation,
            rules: self.config.rules.clone(),
            zero_non_vegetated: self.config.zero_non_vegetated,
            clipped_zones: result.overlay.zones.len(),
            pixel_area_ha: result.overlay.pixel_area_ha,
            total_carbon_mass: result.total_carbon_mass,
            defaulted_classes: result.classes.iter().filter(|c| c.defaulted).count(),
            overrides_applied: result.overrides_applied,
            outputs: outputs.clone(),
        }
    }

    /// Write the coefficient and class tables, the density raster, the
    /// clipped zones and the run summary.
    pub fn write_outputs(
        &self,
        identifier: &str,
        grid: &LandCoverGrid,
        result: &PipelineResult,
        outputs: &OutputPaths,
    ) -> Result<RunSummary> {
        let n = io::write_coefficient_table(&outputs.coefficient_table, &result.coefficients, result.overlay.pixel_area_ha)?;
        io::write_class_table(&outputs.class_table, &result.classes)?;
        io::write_density(&outputs.density_raster, &result.density, &grid.transform, &grid.crs)?;
        io::write_zones_geojson(&outputs.clipped_zones, &result.overlay.zones, &grid.crs)?;
        let summary = self.summarize(identifier, result, outputs);
        io::write_json(&outputs.run_summary, &summary)?;
        info!(rows = n, dir = %outputs.run_summary.parent().unwrap_or(Path::new(".")).display(), "wrote outputs");
        Ok(summary)
    }

    /// Load, run and write in one call.
    pub fn run_files(&self, identifier: &str, inputs: &InputPaths, outputs: &OutputPaths) -> Result<RunSummary> {
        let loaded = PipelineInputs::load(inputs, &self.config)?;
        let grid = loaded.grid.clone();
        let result = self.run(loaded)?;
        if result.overlay.zones.is_empty() {
            warn!("no carbon zones intersect the boundary; every class is defaulted");
        }
        self.write_outputs(identifier, &grid, &result, outputs)
    }
}

/// Input error naming `stage` when `path` is missing or empty.
pub fn require_input(path: &Path, stage: Stage) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| CarbonError::input(stage, path, e.to_string()))?;
    if meta.len() == 0 {
        return Err(CarbonError::input(stage, path, "file is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.aggregation, AggregationMethod::Dominant);
        assert_eq!(cfg.invalid_code_threshold, 255);
        assert_eq!(cfg.code_range(), CodeRange { max_code: 17, invalid_threshold: 255 });
        assert_eq!(cfg.global_classifications.len(), 3);
    }

    #[test]
    fn config_deserializes_partial_json_with_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"aggregation":"weighted","rules":{"savanna_fraction_of_forest":0.5}}"#).unwrap();
        assert_eq!(cfg.aggregation, AggregationMethod::Weighted);
        assert_eq!(cfg.rules.savanna_fraction_of_forest, 0.5);
        assert!(cfg.rules.wetland_equals_forest);
        assert_eq!(cfg.density_nodata, -9999.0);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let cfg = PipelineConfig { invalid_code_threshold: 1, ..PipelineConfig::default() };
        assert!(matches!(CarbonPipeline::new(cfg), Err(CarbonError::Config(_))));
    }

    #[test]
    fn zero_max_class_code_is_rejected() {
        let cfg = PipelineConfig { max_class_code: 0, ..PipelineConfig::default() };
        assert!(matches!(cfg.validate(), Err(CarbonError::Config(_))));
    }

    #[test]
    fn output_paths_follow_identifier() {
        let p = OutputPaths::in_dir(Path::new("out"), "Kenya");
        assert_eq!(p.class_table, Path::new("out/kenya_carbon_coefficients.csv"));
        assert_eq!(p.clipped_zones, Path::new("out/kenya_carbon_zones_clipped.geojson"));
        assert_eq!(p.run_summary, Path::new("out/run_info.json"));
    }

    #[test]
    fn require_input_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        assert!(require_input(&empty, Stage::ReadTables).is_err());
        assert!(require_input(&dir.path().join("nope.tif"), Stage::ReadGrid).is_err());
        let full = dir.path().join("full.csv");
        std::fs::write(&full, "a\n").unwrap();
        assert!(require_input(&full, Stage::ReadTables).is_ok());
    }
}
