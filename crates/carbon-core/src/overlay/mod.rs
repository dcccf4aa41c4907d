//! Spatial overlay: align zones to the grid, clip to the boundary, burn zone
//! ids, and cross-tabulate land cover against zone.

pub mod crosstab;
pub mod rasterize;

use tracing::{debug, info};

use crate::error::{CarbonError, Result, Stage};
use crate::grid::{CodeRange, LandCoverGrid, ZoneIdGrid};
use crate::zones::{clip_zones, dissolve, reproject_zones, BoundaryLayer, ClippedZoneSet, ZoneLayer};

pub use crosstab::{cross_tabulate, CrossTabRow};
pub use rasterize::rasterize_zones;

/// Everything downstream stages need from the overlay.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub zones: ClippedZoneSet,
    pub zone_grid: ZoneIdGrid,
    pub crosstab: Vec<CrossTabRow>,
    pub pixel_area_ha: f64,
}

/// Run the overlay for one grid.
///
/// Steps:
///   1. Reproject zones and boundary to the grid's reference
///   2. Clip zones to the dissolved boundary
///   3. Rasterize clipped zones (id = position + 1, last wins)
///   4. Cross-tabulate valid, zoned cells
pub fn run_overlay(
    grid: &LandCoverGrid,
    zones: ZoneLayer,
    boundary: &BoundaryLayer,
    range: CodeRange,
) -> Result<Overlay> {
    if grid.is_empty() {
        return Err(CarbonError::input(Stage::Overlay, "land-cover grid", "grid has no cells"));
    }
    if boundary.parts.is_empty() {
        return Err(CarbonError::input(Stage::Overlay, "boundary", "boundary has no polygons"));
    }

    // ── 1. Alignment ────────────────────────────────────────────────────────
    let aligned = reproject_zones(zones.zones, &zones.crs, &grid.crs)?;
    let boundary_parts = boundary
        .parts
        .iter()
        .map(|p| crate::crs::reproject(p, &boundary.crs, &grid.crs))
        .collect::<Result<Vec<_>>>()?;
    let clip_geom = dissolve(&boundary_parts);
    if clip_geom.0.is_empty() {
        return Err(CarbonError::input(Stage::Overlay, "boundary", "boundary geometry is empty"));
    }

    // ── 2. Clip ─────────────────────────────────────────────────────────────
    let clipped = clip_zones(&aligned, &clip_geom);
    info!(zones = aligned.len(), clipped = clipped.len(), "clipped carbon zones to boundary");

    // ── 3. Rasterize ────────────────────────────────────────────────────────
    let zone_grid = rasterize_zones(&clipped, grid.width, grid.height, &grid.transform);
    debug!(zoned_cells = zone_grid.zoned_cells(), "rasterized carbon zones");

    // ── 4. Cross-tabulate ───────────────────────────────────────────────────
    let crosstab = cross_tabulate(grid, &zone_grid, range);
    info!(rows = crosstab.len(), "built land-cover × zone cross-tabulation");

    Ok(Overlay {
        zones: clipped,
        zone_grid,
        crosstab,
        pixel_area_ha: grid.transform.pixel_area_ha(),
    })
}
