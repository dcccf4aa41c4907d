//! IGBP land-cover legend (codes 1–17) and the class groups the fallback
//! rules reason about.

use serde::{Deserialize, Serialize};

/// Land-cover class code as stored in the grid.
pub type LandCoverCode = u16;

/// Number of classes in the output coefficient table.
pub const CLASS_COUNT: LandCoverCode = 17;

/// Every code of the fixed output table, in order.
pub fn output_codes() -> impl Iterator<Item = LandCoverCode> {
    1..=CLASS_COUNT
}

pub const URBAN: LandCoverCode = 13;
pub const WATER: LandCoverCode = 17;
pub const PERMANENT_WETLAND: LandCoverCode = 11;

/// Groups of classes sharing a fallback rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassGroup {
    /// Evergreen/deciduous needleleaf and broadleaf forest (1–4).
    Forest,
    /// Closed and open shrubland (6–7).
    Shrub,
    /// Woody savanna and savanna (8–9).
    Savanna,
    /// Permanent wetland (11).
    Wetland,
    /// Urban and water (13, 17); carbon forced to zero when enabled.
    NonVegetated,
}

impl ClassGroup {
    pub fn codes(self) -> &'static [LandCoverCode] {
        match self {
            ClassGroup::Forest => &[1, 2, 3, 4],
            ClassGroup::Shrub => &[6, 7],
            ClassGroup::Savanna => &[8, 9],
            ClassGroup::Wetland => &[PERMANENT_WETLAND],
            ClassGroup::NonVegetated => &[URBAN, WATER],
        }
    }

    #[inline]
    pub fn contains(self, code: LandCoverCode) -> bool {
        self.codes().contains(&code)
    }
}

/// Human label for an IGBP code, used when the crosswalk carries none.
pub fn igbp_label(code: LandCoverCode) -> Option<&'static str> {
    let label = match code {
        1 => "Evergreen Needleleaf Forests",
        2 => "Evergreen Broadleaf Forests",
        3 => "Deciduous Needleleaf Forests",
        4 => "Deciduous Broadleaf Forests",
        5 => "Mixed Forests",
        6 => "Closed Shrublands",
        7 => "Open Shrublands",
        8 => "Woody Savannas",
        9 => "Savannas",
        10 => "Grasslands",
        11 => "Permanent Wetlands",
        12 => "Croplands",
        13 => "Urban and Built-up Lands",
        14 => "Cropland/Natural Vegetation Mosaics",
        15 => "Permanent Snow and Ice",
        16 => "Barren",
        17 => "Water Bodies",
        _ => return None,
    };
    Some(label)
}
