//! Carbon-zone polygons and the clipped, id-assigned zone collection.

use geo::{Area, BooleanOps, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crs::{Crs, Reprojection};
use crate::error::Result;

/// Zone id. 0 is reserved for "no zone".
pub type ZoneId = u32;

/// Categorical attributes a zone contributes to the coefficient lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneAttributes {
    pub region: String,
    pub ecological_zone: String,
    /// 1 = frontier forest, 0 = non-frontier.
    pub frontier: u8,
    pub raw_code: String,
}

impl ZoneAttributes {
    pub fn new(region: &str, ecological_zone: &str, frontier: u8, raw_code: &str) -> Self {
        Self {
            region: region.trim().to_string(),
            ecological_zone: ecological_zone.trim().to_string(),
            frontier: frontier.min(1),
            raw_code: raw_code.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZonePolygon {
    pub geometry: MultiPolygon<f64>,
    pub attributes: ZoneAttributes,
}

/// Zone features as read from disk, with the layer's reference.
#[derive(Debug, Clone)]
pub struct ZoneLayer {
    pub zones: Vec<ZonePolygon>,
    pub crs: Crs,
}

/// Boundary features; dissolved into one clip geometry by the overlay.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    pub parts: Vec<MultiPolygon<f64>>,
    pub crs: Crs,
}

/// Zones surviving the boundary clip, in their original relative order.
///
/// Member `i` carries zone id `i + 1`; later members win overlapping pixels
/// when rasterized.
#[derive(Debug, Clone, Default)]
pub struct ClippedZoneSet {
    zones: Vec<ZonePolygon>,
}

impl ClippedZoneSet {
    pub fn new(zones: Vec<ZonePolygon>) -> Self {
        Self { zones }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zones paired with their ids, in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &ZonePolygon)> {
        self.zones
            .iter()
            .enumerate()
            .map(|(i, z)| (i as ZoneId + 1, z))
    }

    pub fn attributes(&self, id: ZoneId) -> Option<&ZoneAttributes> {
        if id == 0 {
            return None;
        }
        self.zones.get(id as usize - 1).map(|z| &z.attributes)
    }
}

/// Dissolve boundary features into one multipolygon.
pub fn dissolve(parts: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    let mut iter = parts.iter();
    let Some(first) = iter.next() else {
        return MultiPolygon::new(Vec::new());
    };
    iter.fold(first.clone(), |acc, p| acc.union(p))
}

/// Keep the part of each zone inside `boundary`; zones entirely outside are
/// dropped. Surviving zones keep their input order.
pub fn clip_zones(zones: &[ZonePolygon], boundary: &MultiPolygon<f64>) -> ClippedZoneSet {
    let clipped: Vec<ZonePolygon> = zones
        .iter()
        .filter_map(|z| {
            let geometry = z.geometry.intersection(boundary);
            if geometry.0.is_empty() || geometry.unsigned_area() <= 0.0 {
                return None;
            }
            Some(ZonePolygon {
                geometry,
                attributes: z.attributes.clone(),
            })
        })
        .collect();
    debug!(input = zones.len(), kept = clipped.len(), "clipped zones to boundary");
    ClippedZoneSet::new(clipped)
}

/// Move zone geometries into `target`, keeping attributes and order.
pub fn reproject_zones(zones: Vec<ZonePolygon>, from: &Crs, target: &Crs) -> Result<Vec<ZonePolygon>> {
    let strategy = Reprojection::between(from, target)?;
    if strategy.is_identity() {
        return Ok(zones);
    }
    debug!(%from, %target, "reprojecting zones");
    zones
        .into_iter()
        .map(|z| {
            Ok(ZonePolygon {
                geometry: strategy.apply(&z.geometry)?,
                attributes: z.attributes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{polygon, Polygon};

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        let p: Polygon<f64> = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ];
        MultiPolygon::new(vec![p])
    }

    fn zone(geometry: MultiPolygon<f64>, code: &str) -> ZonePolygon {
        ZonePolygon {
            geometry,
            attributes: ZoneAttributes::new("Africa", "Tropical rainforest", 0, code),
        }
    }

    #[test]
    fn clip_drops_outside_zones_and_keeps_order() {
        let boundary = square(0.0, 0.0, 10.0);
        let zones = vec![
            zone(square(-5.0, -5.0, 10.0), "a"),
            zone(square(50.0, 50.0, 5.0), "outside"),
            zone(square(8.0, 8.0, 4.0), "b"),
        ];
        let clipped = clip_zones(&zones, &boundary);
        let codes: Vec<(ZoneId, &str)> = clipped
            .iter()
            .map(|(id, z)| (id, z.attributes.raw_code.as_str()))
            .collect();
        assert_eq!(codes, vec![(1, "a"), (2, "b")]);

        let (_, first) = clipped.iter().next().unwrap();
        assert_abs_diff_eq!(first.geometry.unsigned_area(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn zone_id_zero_has_no_attributes() {
        let set = ClippedZoneSet::new(vec![zone(square(0.0, 0.0, 1.0), "a")]);
        assert!(set.attributes(0).is_none());
        assert_eq!(set.attributes(1).unwrap().raw_code, "a");
        assert!(set.attributes(2).is_none());
    }

    #[test]
    fn dissolve_merges_adjacent_parts() {
        let merged = dissolve(&[square(0.0, 0.0, 1.0), square(1.0, 0.0, 1.0)]);
        assert_abs_diff_eq!(merged.unsigned_area(), 2.0, epsilon = 1e-9);
        assert!(dissolve(&[]).0.is_empty());
    }

    #[test]
    fn reprojected_zones_keep_attributes_and_order() {
        let zones = vec![zone(square(32.5, 0.5, 1.0), "a"), zone(square(33.0, -1.0, 0.5), "b")];
        let out = reproject_zones(zones, &Crs::Epsg(4326), &Crs::Epsg(32636)).unwrap();
        let codes: Vec<&str> = out.iter().map(|z| z.attributes.raw_code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b"]);
        // A 1° cell near the equator is roughly 111 km on a side.
        let area = out[0].geometry.unsigned_area();
        assert!(area > 1.1e10 && area < 1.3e10, "area {area}");
    }

    #[test]
    fn attributes_are_trimmed_and_frontier_clamped() {
        let a = ZoneAttributes::new("  Africa ", "Tropical rainforest\t", 3, " 42 ");
        assert_eq!(a.region, "Africa");
        assert_eq!(a.ecological_zone, "Tropical rainforest");
        assert_eq!(a.frontier, 1);
        assert_eq!(a.raw_code, "42");
    }
}
