use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classes::LandCoverCode;
use crate::grid::{CodeRange, LandCoverGrid, ZoneIdGrid};
use crate::zones::ZoneId;

/// Pixel count of one (land-cover code, zone) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTabRow {
    pub land_cover_code: LandCoverCode,
    pub zone_id: ZoneId,
    pub pixel_count: u64,
}

/// Count valid, zoned cells per (code, zone). Rows come out sorted by code
/// then zone id; every count is positive.
pub fn cross_tabulate(
    grid: &LandCoverGrid,
    zones: &ZoneIdGrid,
    range: CodeRange,
) -> Vec<CrossTabRow> {
    debug_assert_eq!(grid.data.len(), zones.data.len());
    let mut counts: BTreeMap<(LandCoverCode, ZoneId), u64> = BTreeMap::new();
    for (&value, &zone_id) in grid.data.iter().zip(zones.data.iter()) {
        if zone_id == 0 {
            continue;
        }
        let Some(code) = grid.valid_code(value, range) else {
            continue;
        };
        *counts.entry((code, zone_id)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((land_cover_code, zone_id), pixel_count)| CrossTabRow {
            land_cover_code,
            zone_id,
            pixel_count,
        })
        .collect()
}
