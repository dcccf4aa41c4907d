//! YAML run configuration merged with command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use carbon_core::{InputPaths, OutputPaths, PipelineConfig};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub identifier: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputsSection {
    pub lulc: Option<String>,
    pub zones: Option<String>,
    pub boundary: Option<String>,
    pub crosswalk: Option<String>,
    pub coeff_lookup: Option<String>,
    pub expert_overrides: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputsSection {
    pub dir: Option<String>,
    pub coefficient_table: Option<String>,
    pub class_table: Option<String>,
    pub density_raster: Option<String>,
    pub clipped_zones: Option<String>,
}

/// On-disk configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub project: ProjectSection,
    pub inputs: InputsSection,
    pub outputs: OutputsSection,
    pub pipeline: PipelineConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references. Unset variables
/// are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut s = raw.trim().to_string();
    if s == "~" || s.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            s = format!("{home}{}", &s[1..]);
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    PathBuf::from(out)
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub identifier: Option<String>,
    pub lulc: Option<String>,
    pub zones: Option<String>,
    pub boundary: Option<String>,
    pub crosswalk: Option<String>,
    pub coeff_lookup: Option<String>,
    pub expert_overrides: Option<String>,
    pub out_dir: Option<String>,
    pub aggregation: Option<carbon_core::AggregationMethod>,
    pub savanna_fraction: Option<f64>,
    pub overwrite: bool,
}

/// Fully merged run settings.
#[derive(Debug)]
pub struct RunSettings {
    pub identifier: String,
    pub overwrite: bool,
    pub inputs: InputPaths,
    pub outputs: OutputPaths,
    pub pipeline: PipelineConfig,
}

fn pick(cli: Option<String>, file: Option<String>, what: &str) -> Result<PathBuf> {
    match cli.or(file).filter(|s| !s.trim().is_empty()) {
        Some(s) => Ok(expand_path(&s)),
        None => bail!("Missing required input: {what} (set it in the config file or on the command line)"),
    }
}

impl RunSettings {
    pub fn merge(file: FileConfig, cli: Overrides) -> Result<Self> {
        let identifier = cli
            .identifier
            .or(file.project.identifier)
            .unwrap_or_else(|| "run".to_string());

        let inputs = InputPaths {
            land_cover: pick(cli.lulc, file.inputs.lulc, "lulc")?,
            zones: pick(cli.zones, file.inputs.zones, "zones")?,
            boundary: pick(cli.boundary, file.inputs.boundary, "boundary")?,
            crosswalk: pick(cli.crosswalk, file.inputs.crosswalk, "crosswalk")?,
            coefficient_lookup: pick(cli.coeff_lookup, file.inputs.coeff_lookup, "coeff_lookup")?,
            expert_overrides: cli
                .expert_overrides
                .or(file.inputs.expert_overrides)
                .filter(|s| !s.trim().is_empty())
                .map(|s| expand_path(&s)),
        };

        let dir = cli
            .out_dir
            .or(file.outputs.dir)
            .map(|s| expand_path(&s))
            .unwrap_or_else(|| PathBuf::from("out"));
        let mut outputs = OutputPaths::in_dir(&dir, &identifier);
        if let Some(p) = file.outputs.coefficient_table {
            outputs.coefficient_table = expand_path(&p);
        }
        if let Some(p) = file.outputs.class_table {
            outputs.class_table = expand_path(&p);
        }
        if let Some(p) = file.outputs.density_raster {
            outputs.density_raster = expand_path(&p);
        }
        if let Some(p) = file.outputs.clipped_zones {
            outputs.clipped_zones = expand_path(&p);
        }

        let mut pipeline = file.pipeline;
        if let Some(a) = cli.aggregation {
            pipeline.aggregation = a;
        }
        if let Some(f) = cli.savanna_fraction {
            pipeline.rules.savanna_fraction_of_forest = f;
        }

        Ok(Self {
            identifier,
            overwrite: cli.overwrite || file.project.overwrite,
            inputs,
            outputs,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::AggregationMethod;

    const YAML: &str = r#"
project:
  identifier: UGA
inputs:
  lulc: data/uga_lulc.tif
  zones: data/carbon_zones.geojson
  boundary: data/uga_boundary.geojson
  crosswalk: data/crosswalk.csv
  coeff_lookup: data/lookup_exploded.csv
outputs:
  dir: out/uga
  clipped_zones: out/shared/uga_zones.geojson
pipeline:
  aggregation: weighted
  rules:
    savanna_fraction_of_forest: 0.3
"#;

    #[test]
    fn file_values_fill_unset_cli_options() {
        let file = FileConfig::parse(YAML).unwrap();
        let s = RunSettings::merge(file, Overrides::default()).unwrap();
        assert_eq!(s.identifier, "UGA");
        assert_eq!(s.inputs.land_cover, PathBuf::from("data/uga_lulc.tif"));
        assert_eq!(s.outputs.class_table, PathBuf::from("out/uga/uga_carbon_coefficients.csv"));
        assert_eq!(s.outputs.clipped_zones, PathBuf::from("out/shared/uga_zones.geojson"));
        assert_eq!(s.pipeline.aggregation, AggregationMethod::Weighted);
        assert_eq!(s.pipeline.rules.savanna_fraction_of_forest, 0.3);
        assert!(s.pipeline.rules.marsh_equals_shrub);
        assert!(s.inputs.expert_overrides.is_none());
    }

    #[test]
    fn cli_overrides_win() {
        let file = FileConfig::parse(YAML).unwrap();
        let cli = Overrides {
            identifier: Some("KEN".into()),
            lulc: Some("other.tif".into()),
            aggregation: Some(AggregationMethod::Dominant),
            overwrite: true,
            ..Overrides::default()
        };
        let s = RunSettings::merge(file, cli).unwrap();
        assert_eq!(s.identifier, "KEN");
        assert_eq!(s.inputs.land_cover, PathBuf::from("other.tif"));
        assert_eq!(s.pipeline.aggregation, AggregationMethod::Dominant);
        assert!(s.overwrite);
    }

    #[test]
    fn missing_required_input_is_reported() {
        let err = RunSettings::merge(FileConfig::default(), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("lulc"));
    }

    #[test]
    fn expands_home_and_variables() {
        std::env::set_var("CARBON_ZONES_TEST_ROOT", "/data/carbon");
        assert_eq!(expand_path("$CARBON_ZONES_TEST_ROOT/lulc.tif"), PathBuf::from("/data/carbon/lulc.tif"));
        assert_eq!(expand_path("${CARBON_ZONES_TEST_ROOT}/x"), PathBuf::from("/data/carbon/x"));
        assert_eq!(expand_path("$CARBON_ZONES_TEST_UNSET/x"), PathBuf::from("$CARBON_ZONES_TEST_UNSET/x"));
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("~/maps"), PathBuf::from(format!("{home}/maps")));
        }
        assert_eq!(expand_path("plain/path"), PathBuf::from("plain/path"));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file = FileConfig::parse("   ").unwrap();
        assert!(file.inputs.lulc.is_none());
        assert_eq!(file.pipeline, PipelineConfig::default());
    }
}
