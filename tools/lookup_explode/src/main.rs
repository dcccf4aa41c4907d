/// Expand a multi-valued carbon coefficient table into one row per atomic
/// (classification, region, ecological zone, frontier) key.
///
/// Usage:
///   lookup_explode --input rg_to_explode.csv --output rg_lookup_exploded.csv
///
/// Input columns (case-insensitive): GLC2000, REGION, GEZ_TERM, FRONTIER,
/// CARBON_VALUE and optionally LULC. REGION, GEZ_TERM and FRONTIER cells may
/// hold `;`-separated lists.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use carbon_core::lookup::{parse_frontier, LookupKey};
use clap::Parser;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "lookup_explode", about = "Explode a multi-valued coefficient lookup table")]
struct Args {
    /// Raw lookup CSV.
    #[arg(short, long)]
    input: PathBuf,

    /// Exploded lookup CSV.
    #[arg(short, long)]
    output: PathBuf,

    /// Region name written for region-independent classes.
    #[arg(long, default_value = "Global")]
    global_region: String,
}

/// Region aliases of the source table and the zone-layer regions they cover.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("N and S America", "North America;South America"),
    ("N America", "North America"),
    ("S America", "South America"),
    ("Continental Asia", "Asia"),
    ("Insular Asia", "Asia (insular)"),
    ("Asia and Europe", "Asia;Europe"),
    ("Australia and New Zealand", "Australia;New Zealand"),
    (
        "Global",
        "Africa;Asia;Asia (insular);Europe;North America;South America;Australia;New Zealand;\
         Antarctica;Pacific Ocean;Atlantic Ocean;Indian Ocean;Arctic Ocean",
    ),
];

/// Ecological zones substituted for an empty GEZ_TERM cell.
const ALL_ECOLOGICAL_ZONES: &[&str] = &[
    "Boreal coniferous forest",
    "Boreal mountain system",
    "Boreal tundra woodland",
    "Polar",
    "Subtropical desert",
    "Subtropical dry forest",
    "Subtropical humid forest",
    "Subtropical mountain system",
    "Subtropical steppe",
    "Temperate continental forest",
    "Temperate desert",
    "Temperate mountain system",
    "Temperate oceanic forest",
    "Temperate steppe",
    "Tropical desert",
    "Tropical dry forest",
    "Tropical moist deciduous forest",
    "Tropical mountain system",
    "Tropical rainforest",
    "Tropical shrubland",
    "Water",
    "No data",
];

/// Classification prefixes whose coefficient does not depend on region.
const GLOBAL_PREFIXES: &[&str] = &["16:", "19:", "20 - 23:"];

#[derive(Debug, Clone, PartialEq)]
struct RawRow {
    classification: String,
    region: String,
    ecological_zone: String,
    frontier: String,
    carbon_value: String,
    lulc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ExplodedRow {
    #[serde(rename = "GLC2000")]
    classification: String,
    #[serde(rename = "REGION")]
    region: String,
    #[serde(rename = "GEZ_TERM")]
    ecological_zone: String,
    #[serde(rename = "FRONTIER")]
    frontier: u8,
    #[serde(rename = "CARBON_VALUE")]
    carbon_value: String,
    #[serde(rename = "LULC")]
    lulc: String,
}

fn split_list(cell: &str) -> Vec<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn map_region(cell: &str) -> String {
    let t = cell.trim();
    REGION_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(t))
        .map(|(_, regions)| regions.to_string())
        .unwrap_or_else(|| t.to_string())
}

/// Frontier words and numeric flags to a list of 0/1 values.
fn map_frontier(cell: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for part in split_list(cell) {
        let flags: &[u8] = match part.to_ascii_lowercase().as_str() {
            "either" => &[0, 1],
            "non-frontier" => &[0],
            "frontier" => &[1],
            other => match parse_frontier(other) {
                Some(0) => &[0],
                Some(_) => &[1],
                None => &[],
            },
        };
        for &f in flags {
            if !out.contains(&f) {
                out.push(f);
            }
        }
    }
    if out.is_empty() {
        out.push(0);
    }
    out
}

fn is_global(classification: &str) -> bool {
    let c = classification.trim();
    GLOBAL_PREFIXES.iter().any(|p| c.starts_with(p))
}

fn explode(row: &RawRow, global_region: &str) -> Vec<ExplodedRow> {
    let make = |region: &str, gez: &str, frontier: u8| ExplodedRow {
        classification: row.classification.trim().to_string(),
        region: region.to_string(),
        ecological_zone: gez.to_string(),
        frontier,
        carbon_value: row.carbon_value.trim().to_string(),
        lulc: row.lulc.trim().to_string(),
    };

    if is_global(&row.classification) {
        return [0, 1].into_iter().map(|f| make(global_region, global_region, f)).collect();
    }

    let regions = split_list(&map_region(&row.region));
    let zones = if row.ecological_zone.trim().is_empty() {
        ALL_ECOLOGICAL_ZONES.iter().map(|s| s.to_string()).collect()
    } else {
        split_list(&row.ecological_zone)
    };
    let frontiers = map_frontier(&row.frontier);

    let mut out = Vec::with_capacity(regions.len() * zones.len() * frontiers.len());
    for region in &regions {
        for &frontier in &frontiers {
            for gez in &zones {
                out.push(make(region, gez, frontier));
            }
        }
    }
    out
}

/// Rows whose normalized key was already seen, as "row index: key" text.
fn duplicate_keys(rows: &[ExplodedRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for (i, r) in rows.iter().enumerate() {
        let key = LookupKey::new(&r.classification, &r.region, &r.ecological_zone, r.frontier);
        if !seen.insert(key) {
            dups.push(format!(
                "{i}: {} | {} | {} | {}",
                r.classification, r.region, r.ecological_zone, r.frontier
            ));
        }
    }
    dups
}

fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Cannot open input: {}", path.display()))?;
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_uppercase())
        .collect();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(c_class), Some(c_region), Some(c_gez), Some(c_frontier), Some(c_value)) = (
        col("GLC2000"),
        col("REGION"),
        col("GEZ_TERM"),
        col("FRONTIER"),
        col("CARBON_VALUE"),
    ) else {
        bail!("{}: expected columns GLC2000, REGION, GEZ_TERM, FRONTIER, CARBON_VALUE", path.display());
    };
    let c_lulc = col("LULC");

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("Bad row in {}", path.display()))?;
        let get = |i: usize| record.get(i).unwrap_or("").to_string();
        rows.push(RawRow {
            classification: get(c_class),
            region: get(c_region),
            ecological_zone: get(c_gez),
            frontier: get(c_frontier),
            carbon_value: get(c_value),
            lulc: c_lulc.map(get).unwrap_or_default(),
        });
    }
    Ok(rows)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = read_rows(&args.input)?;
    eprintln!("Read {} rows from {}", raw.len(), args.input.display());

    let exploded: Vec<ExplodedRow> = raw.iter().flat_map(|r| explode(r, &args.global_region)).collect();

    let dups = duplicate_keys(&exploded);
    if !dups.is_empty() {
        eprintln!("  [warn] {} duplicate keys (the pipeline keeps the first):", dups.len());
        for d in dups.iter().take(20) {
            eprintln!("    {d}");
        }
    }

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    let mut wtr = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Cannot create output: {}", args.output.display()))?;
    for row in &exploded {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    eprintln!("Exploded lookup written to: {}", args.output.display());
    println!("{}", exploded.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class: &str, region: &str, gez: &str, frontier: &str) -> RawRow {
        RawRow {
            classification: class.into(),
            region: region.into(),
            ecological_zone: gez.into(),
            frontier: frontier.into(),
            carbon_value: "100".into(),
            lulc: String::new(),
        }
    }

    #[test]
    fn aliases_and_lists_explode_to_cartesian_product() {
        let rows = explode(
            &raw("1: Tree Cover", "N and S America", "Tropical rainforest; Tropical dry forest", "Either"),
            "Global",
        );
        assert_eq!(rows.len(), 2 * 2 * 2);
        assert!(rows.iter().any(|r| r.region == "South America" && r.frontier == 1));
        assert!(rows.iter().all(|r| r.carbon_value == "100"));
        assert!(duplicate_keys(&rows).is_empty());
    }

    #[test]
    fn empty_ecological_zone_expands_to_full_list() {
        let rows = explode(&raw("11: Shrub", "Africa", "", "Non-frontier"), "Global");
        assert_eq!(rows.len(), ALL_ECOLOGICAL_ZONES.len());
        assert!(rows.iter().all(|r| r.frontier == 0 && r.region == "Africa"));
    }

    #[test]
    fn region_independent_classes_collapse_to_global() {
        let rows = explode(&raw("19: Bare areas", "Africa;Europe", "Polar", "Frontier"), "Global");
        let keys: Vec<(&str, &str, u8)> = rows
            .iter()
            .map(|r| (r.region.as_str(), r.ecological_zone.as_str(), r.frontier))
            .collect();
        assert_eq!(keys, vec![("Global", "Global", 0), ("Global", "Global", 1)]);
    }

    #[test]
    fn global_region_on_region_dependent_class_expands_to_every_region() {
        let rows = explode(&raw("1: Tree Cover", "Global", "Polar", "0"), "Global");
        assert_eq!(rows.len(), 13);
        assert!(rows.iter().any(|r| r.region == "Asia (insular)"));
        assert!(rows.iter().any(|r| r.region == "Arctic Ocean"));
        assert!(rows.iter().all(|r| r.region != "Global"));
        assert!(duplicate_keys(&rows).is_empty());
    }

    #[test]
    fn frontier_words_and_numbers() {
        assert_eq!(map_frontier("Either"), vec![0, 1]);
        assert_eq!(map_frontier("Frontier"), vec![1]);
        assert_eq!(map_frontier("non-frontier"), vec![0]);
        assert_eq!(map_frontier("1.0;0"), vec![1, 0]);
        assert_eq!(map_frontier(""), vec![0]);
    }

    #[test]
    fn duplicates_are_detected_after_normalization() {
        let mut rows = explode(&raw("1: Tree Cover", "Africa", "Polar", "0"), "Global");
        rows.extend(explode(&raw("1: tree  cover", " africa", "POLAR", "0.0"), "Global"));
        assert_eq!(duplicate_keys(&rows).len(), 1);
    }
}
