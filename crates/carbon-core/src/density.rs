//! Paint per-(class, zone) coefficients back onto the land-cover grid.

use std::collections::HashMap;

use crate::classes::LandCoverCode;
use crate::grid::{CodeRange, DensityGrid, LandCoverGrid, ZoneIdGrid};
use crate::resolve::CoefficientRow;
use crate::zones::ZoneId;

/// Each cell takes the value of the row matching its (code, zone) pair.
/// Cells outside every zone, with an invalid code, or whose row has no value
/// hold `nodata`.
pub fn paint_density(
    grid: &LandCoverGrid,
    zones: &ZoneIdGrid,
    rows: &[CoefficientRow],
    range: CodeRange,
    nodata: f32,
) -> DensityGrid {
    let values: HashMap<(LandCoverCode, ZoneId), f32> = rows
        .iter()
        .filter_map(|r| r.value().map(|v| ((r.land_cover_code, r.zone_id), v as f32)))
        .collect();

    let mut out = DensityGrid::filled(grid.width, grid.height, nodata);
    for ((cell, &value), &zone_id) in out.data.iter_mut().zip(&grid.data).zip(&zones.data) {
        if zone_id == 0 {
            continue;
        }
        let Some(code) = grid.valid_code(value, range) else {
            continue;
        };
        if let Some(&v) = values.get(&(code, zone_id)) {
            *cell = v;
        }
    }
    out
}
