//! File codecs: GeoTIFF grids, GeoJSON layers, CSV tables and the JSON run
//! summary.

pub mod raster;
pub mod table;
pub mod vector;

use std::path::Path;

use serde::Serialize;

use crate::error::{CarbonError, Result, Stage};

pub use raster::{read_land_cover, read_raster_crs, write_density, write_land_cover};
pub use table::{
    read_coefficient_lookup, read_crosswalk, read_overrides, write_class_table, write_coefficient_table,
};
pub use vector::{
    read_boundary, read_feature_collection, read_zones, write_zones_geojson, FeatureCollection, REQUIRED_ZONE_FIELDS,
};

/// Pretty-printed JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| CarbonError::input(Stage::WriteOutputs, dir, e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| CarbonError::input(Stage::WriteOutputs, path, e.to_string()))
}
