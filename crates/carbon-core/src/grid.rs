use serde::{Deserialize, Serialize};

use crate::classes::{LandCoverCode, CLASS_COUNT};
use crate::crs::Crs;

/// North-up affine geotransform. Rotation terms are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X of the upper-left corner of pixel (0, 0).
    pub origin_x: f64,
    /// Y of the upper-left corner of pixel (0, 0).
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the centre of pixel (row, col).
    #[inline]
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional column of map x (pixel edges at integers).
    #[inline]
    pub fn col_of(&self, x: f64) -> f64 {
        (x - self.origin_x) / self.pixel_width
    }

    /// Fractional row of map y (pixel edges at integers).
    #[inline]
    pub fn row_of(&self, y: f64) -> f64 {
        (y - self.origin_y) / self.pixel_height
    }

    /// Pixel area in hectares, assuming the grid units are metres.
    pub fn pixel_area_ha(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs() / 10_000.0
    }
}

/// Cell values counted as land-cover classes: `1..=max_code` and below
/// `invalid_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    pub max_code: LandCoverCode,
    /// Sentinel at or above which a value is treated as invalid.
    pub invalid_threshold: i32,
}

impl Default for CodeRange {
    fn default() -> Self {
        Self {
            max_code: CLASS_COUNT,
            invalid_threshold: 255,
        }
    }
}

impl CodeRange {
    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        value >= 1 && value < self.invalid_threshold && value <= i32::from(self.max_code)
    }
}

/// A categorical land-cover raster, row-major, row 0 = north edge.
#[derive(Debug, Clone)]
pub struct LandCoverGrid {
    pub data: Vec<i32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<i32>,
}

impl LandCoverGrid {
    pub fn new(width: usize, height: usize, data: Vec<i32>, transform: GeoTransform, crs: Crs) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
            transform,
            crs,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<i32>) -> Self {
        self.nodata = nodata;
        self
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.data[row * self.width + col]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// The class code of a raw cell value, or `None` for no-data and codes
    /// outside `range`.
    #[inline]
    pub fn valid_code(&self, value: i32, range: CodeRange) -> Option<LandCoverCode> {
        if Some(value) == self.nodata || !range.contains(value) {
            return None;
        }
        LandCoverCode::try_from(value).ok()
    }
}

/// Zone id burned per cell. 0 = outside every zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneIdGrid {
    pub data: Vec<u32>,
    pub width: usize,
    pub height: usize,
}

impl ZoneIdGrid {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.data[row * self.width + col]
    }

    pub fn zoned_cells(&self) -> usize {
        self.data.iter().filter(|&&z| z > 0).count()
    }
}

/// Carbon density per cell (Mg C / ha), aligned with the land-cover grid.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub nodata: f32,
}

impl DensityGrid {
    pub fn filled(width: usize, height: usize, nodata: f32) -> Self {
        Self {
            data: vec![nodata; width * height],
            width,
            height,
            nodata,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn valid_cells(&self) -> usize {
        self.data.iter().filter(|&&v| v != self.nodata).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pixel_center_is_half_a_pixel_in() {
        let t = GeoTransform::new(100.0, 500.0, 30.0, -30.0);
        assert_eq!(t.pixel_center(0, 0), (115.0, 485.0));
        assert_eq!(t.pixel_center(2, 1), (145.0, 425.0));
        assert_abs_diff_eq!(t.row_of(485.0), 0.5);
        assert_abs_diff_eq!(t.col_of(145.0), 1.5);
    }

    #[test]
    fn pixel_area_converts_square_metres_to_hectares() {
        let t = GeoTransform::new(0.0, 0.0, 463.3127, -463.3127);
        assert_abs_diff_eq!(t.pixel_area_ha(), 21.4658, epsilon = 1e-3);
        assert_abs_diff_eq!(GeoTransform::new(0.0, 0.0, 100.0, -100.0).pixel_area_ha(), 1.0);
    }

    #[test]
    fn valid_code_rejects_nodata_and_threshold() {
        let g = LandCoverGrid::new(1, 1, vec![1], GeoTransform::new(0.0, 0.0, 1.0, -1.0), Crs::Unknown)
            .with_nodata(Some(0));
        let r = CodeRange::default();
        assert_eq!(g.valid_code(0, r), None);
        assert_eq!(g.valid_code(255, r), None);
        assert_eq!(g.valid_code(-3, r), None);
        assert_eq!(g.valid_code(1, r), Some(1));
        assert_eq!(g.valid_code(17, r), Some(17));
    }

    #[test]
    fn codes_above_the_class_range_are_invalid() {
        let g = LandCoverGrid::new(1, 1, vec![1], GeoTransform::new(0.0, 0.0, 1.0, -1.0), Crs::Unknown);
        let r = CodeRange::default();
        assert_eq!(g.valid_code(18, r), None);
        assert_eq!(g.valid_code(200, r), None);
        assert_eq!(g.valid_code(254, r), None);

        let wide = CodeRange { max_code: 254, invalid_threshold: 255 };
        assert_eq!(g.valid_code(200, wide), Some(200));
        assert_eq!(g.valid_code(255, wide), None);
    }
}
