//! Scanline rasterization of zone polygons onto the land-cover grid.
//!
//! A pixel is burned when its centre lies inside the polygon (even-odd rule
//! over all rings). Zones are drawn in id order, so the last zone covering a
//! pixel wins.

use geo::{BoundingRect, LineString, MultiPolygon};

use crate::grid::{GeoTransform, ZoneIdGrid};
use crate::zones::{ClippedZoneSet, ZoneId};

/// Edges of one zone plus its vertical extent, for fast row rejection.
struct EdgeTable {
    id: ZoneId,
    /// (x0, y0, x1, y1) with y0 != y1.
    edges: Vec<(f64, f64, f64, f64)>,
    min_y: f64,
    max_y: f64,
}

impl EdgeTable {
    fn build(id: ZoneId, geom: &MultiPolygon<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        let mut edges = Vec::new();
        let mut push_ring = |ring: &LineString<f64>| {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if a.y != b.y {
                    edges.push((a.x, a.y, b.x, b.y));
                }
            }
        };
        for poly in &geom.0 {
            push_ring(poly.exterior());
            for hole in poly.interiors() {
                push_ring(hole);
            }
        }
        if edges.is_empty() {
            return None;
        }
        Some(Self {
            id,
            edges,
            min_y: rect.min().y,
            max_y: rect.max().y,
        })
    }

    /// X positions where the horizontal line at `y` crosses the zone boundary,
    /// sorted. Half-open in y so shared vertices are counted once.
    fn crossings(&self, y: f64, out: &mut Vec<f64>) {
        out.clear();
        for &(x0, y0, x1, y1) in &self.edges {
            if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                out.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        out.sort_by(|a, b| a.total_cmp(b));
    }
}

fn burn_row(row: &mut [u32], r: usize, transform: &GeoTransform, tables: &[EdgeTable]) {
    let width = row.len();
    let (_, y) = transform.pixel_center(r, 0);
    let mut xs = Vec::new();
    for table in tables {
        if y < table.min_y || y > table.max_y {
            continue;
        }
        table.crossings(y, &mut xs);
        for pair in xs.chunks_exact(2) {
            let (ca, cb) = (transform.col_of(pair[0]), transform.col_of(pair[1]));
            let (lo, hi) = (ca.min(cb), ca.max(cb));
            // Pixel c is inside when lo <= c + 0.5 < hi.
            let start = (lo - 0.5).ceil().max(0.0) as usize;
            let end = ((hi - 0.5).ceil().max(0.0) as usize).min(width);
            for cell in row.iter_mut().take(end).skip(start) {
                *cell = table.id;
            }
        }
    }
}

/// Burn zone ids onto a grid of `width` × `height` cells sharing `transform`.
/// Cells outside every zone hold 0.
pub fn rasterize_zones(
    zones: &ClippedZoneSet,
    width: usize,
    height: usize,
    transform: &GeoTransform,
) -> ZoneIdGrid {
    let mut grid = ZoneIdGrid::empty(width, height);
    if width == 0 || height == 0 {
        return grid;
    }
    let tables: Vec<EdgeTable> = zones
        .iter()
        .filter_map(|(id, z)| EdgeTable::build(id, &z.geometry))
        .collect();
    if tables.is_empty() {
        return grid;
    }

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        grid.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(r, row)| burn_row(row, r, transform, &tables));
    }
    #[cfg(not(feature = "threading"))]
    {
        for (r, row) in grid.data.chunks_mut(width).enumerate() {
            burn_row(row, r, transform, &tables);
        }
    }
    grid
}
