//! GeoJSON FeatureCollection reader for zone and boundary layers, and the
//! clipped-zone writer.

use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::crs::{Crs, EPSG_WGS84};
use crate::error::{CarbonError, Result, Stage};
use crate::lookup::parse_frontier;
use crate::zones::{BoundaryLayer, ClippedZoneSet, ZoneAttributes, ZoneLayer, ZonePolygon};

/// Zone attribute fields every zone feature must carry.
pub const REQUIRED_ZONE_FIELDS: [&str; 4] = ["CODE", "GEZ_TERM", "FRONTIER", "REGION"];

/// One areal feature: geometry plus raw properties.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Property lookup ignoring key case.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).or_else(|| {
            self.properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Property rendered as text; numbers are formatted, null is absent.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.property(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// A parsed FeatureCollection.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Crs,
}

fn position(v: &Value) -> Option<Coord<f64>> {
    let p = v.as_array()?;
    if p.len() < 2 {
        return None;
    }
    Some(Coord { x: p[0].as_f64()?, y: p[1].as_f64()? })
}

fn ring(v: &Value) -> Option<LineString<f64>> {
    let coords: Option<Vec<Coord<f64>>> = v.as_array()?.iter().map(position).collect();
    let coords = coords?;
    (coords.len() >= 3).then(|| LineString::from(coords))
}

fn polygon(v: &Value) -> Option<Polygon<f64>> {
    let rings = v.as_array()?;
    let exterior = ring(rings.first()?)?;
    let interiors = rings[1..].iter().filter_map(ring).collect();
    Some(Polygon::new(exterior, interiors))
}

/// Polygon or MultiPolygon geometry; anything else is `None`.
fn parse_geometry(geom: &Value) -> Option<MultiPolygon<f64>> {
    let coords = geom.get("coordinates")?;
    match geom.get("type").and_then(Value::as_str)? {
        "Polygon" => polygon(coords).map(|p| MultiPolygon::new(vec![p])),
        "MultiPolygon" => {
            let polys: Vec<Polygon<f64>> = coords.as_array()?.iter().filter_map(polygon).collect();
            (!polys.is_empty()).then(|| MultiPolygon::new(polys))
        }
        _ => None,
    }
}

/// The legacy `crs` member, or WGS84 when absent.
fn parse_crs(root: &Value) -> Crs {
    root.get("crs")
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(Crs::parse)
        .unwrap_or(Crs::Epsg(EPSG_WGS84))
}

/// Parse GeoJSON text. Features without areal geometry are skipped.
pub fn parse_feature_collection(text: &str, stage: Stage, path: &Path) -> Result<FeatureCollection> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| CarbonError::input(stage, path, format!("invalid GeoJSON: {e}")))?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(CarbonError::input(stage, path, "GeoJSON must be a FeatureCollection"));
    }
    let raw = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| CarbonError::input(stage, path, "FeatureCollection has no 'features' array"))?;

    let mut features = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for feat in raw {
        let Some(geometry) = feat.get("geometry").and_then(parse_geometry) else {
            skipped += 1;
            continue;
        };
        let properties = feat
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        features.push(Feature { geometry, properties });
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped features without polygon geometry");
    }
    Ok(FeatureCollection { features, crs: parse_crs(&root) })
}

pub fn read_feature_collection(path: &Path, stage: Stage) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CarbonError::input(stage, path, e.to_string()))?;
    parse_feature_collection(&text, stage, path)
}

/// Read carbon zones. Missing attribute values become empty strings and an
/// unparseable frontier becomes 0; such zones simply miss the lookup.
pub fn read_zones(path: &Path) -> Result<ZoneLayer> {
    let fc = read_feature_collection(path, Stage::ReadZones)?;
    if fc.features.is_empty() {
        return Err(CarbonError::input(Stage::ReadZones, path, "no polygon features"));
    }
    let mut bad_frontier = 0usize;
    let zones: Vec<ZonePolygon> = fc
        .features
        .into_iter()
        .map(|f| {
            let frontier = f.text("FRONTIER").and_then(|s| parse_frontier(&s)).unwrap_or_else(|| {
                bad_frontier += 1;
                0
            });
            let attributes = ZoneAttributes::new(
                &f.text("REGION").unwrap_or_default(),
                &f.text("GEZ_TERM").unwrap_or_default(),
                frontier,
                &f.text("CODE").unwrap_or_default(),
            );
            ZonePolygon { geometry: f.geometry, attributes }
        })
        .collect();
    if bad_frontier > 0 {
        warn!(path = %path.display(), zones = bad_frontier, "unreadable FRONTIER values treated as 0");
    }
    debug!(zones = zones.len(), crs = %fc.crs, "read carbon zones");
    Ok(ZoneLayer { zones, crs: fc.crs })
}

/// Read the boundary layer. An empty collection is an input error.
pub fn read_boundary(path: &Path) -> Result<BoundaryLayer> {
    let fc = read_feature_collection(path, Stage::ReadBoundary)?;
    if fc.features.is_empty() {
        return Err(CarbonError::input(Stage::ReadBoundary, path, "no polygon features"));
    }
    Ok(BoundaryLayer {
        parts: fc.features.into_iter().map(|f| f.geometry).collect(),
        crs: fc.crs,
    })
}

// ── Writer ────────────────────────────────────────────────────────────────────

fn ring_coords(ls: &LineString<f64>) -> Value {
    Value::Array(ls.coords().map(|c| json!([c.x, c.y])).collect())
}

fn multipolygon_value(mp: &MultiPolygon<f64>) -> Value {
    let polys: Vec<Value> = mp
        .iter()
        .map(|p| {
            let mut rings = vec![ring_coords(p.exterior())];
            rings.extend(p.interiors().iter().map(ring_coords));
            Value::Array(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polys })
}

/// Clipped zones as a FeatureCollection. Each feature carries its zone id and
/// the attributes read from the source layer.
pub fn zones_to_geojson(zones: &ClippedZoneSet, crs: &Crs) -> Value {
    let features: Vec<Value> = zones
        .iter()
        .map(|(id, z)| {
            json!({
                "type": "Feature",
                "properties": {
                    "zone_id": id,
                    "REGION": z.attributes.region,
                    "GEZ_TERM": z.attributes.ecological_zone,
                    "FRONTIER": z.attributes.frontier,
                    "CODE": z.attributes.raw_code,
                },
                "geometry": multipolygon_value(&z.geometry),
            })
        })
        .collect();
    let mut root = json!({ "type": "FeatureCollection", "features": features });
    if let Some(epsg) = crs.epsg() {
        root["crs"] = json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{epsg}") },
        });
    }
    root
}

/// Write the clipped zones, creating parent directories as needed.
pub fn write_zones_geojson(path: &Path, zones: &ClippedZoneSet, crs: &Crs) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| CarbonError::input(Stage::WriteOutputs, dir, e.to_string()))?;
    }
    let text = serde_json::to_string(&zones_to_geojson(zones, crs))?;
    std::fs::write(path, text).map_err(|e| CarbonError::input(Stage::WriteOutputs, path, e.to_string()))?;
    debug!(path = %path.display(), zones = zones.len(), "wrote clipped zones");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    const ZONES: &str = r#"{
      "type": "FeatureCollection",
      "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32636"}},
      "features": [
        {"type": "Feature",
         "properties": {"region": " Africa", "GEZ_TERM": "Tropical rainforest", "FRONTIER": 1, "CODE": 11},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
        {"type": "Feature",
         "properties": {"REGION": "Asia", "GEZ_TERM": "Boreal", "FRONTIER": "0.0", "CODE": "B"},
         "geometry": {"type": "MultiPolygon", "coordinates": [
            [[[0,0],[1,0],[1,1],[0,1],[0,0]]],
            [[[5,5],[6,5],[6,6],[5,6],[5,5]]]]}},
        {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1,1]}}
      ]
    }"#;

    #[test]
    fn parses_polygons_multipolygons_and_crs() {
        let fc = parse_feature_collection(ZONES, Stage::ReadZones, Path::new("zones.geojson")).unwrap();
        assert_eq!(fc.crs, Crs::Epsg(32636));
        assert_eq!(fc.features.len(), 2);
        assert_eq!(fc.features[0].geometry.unsigned_area(), 4.0);
        assert_eq!(fc.features[1].geometry.0.len(), 2);
        assert_eq!(fc.features[0].text("REGION").as_deref(), Some(" Africa"));
        assert_eq!(fc.features[0].text("code").as_deref(), Some("11"));
    }

    #[test]
    fn zone_attributes_are_trimmed_and_frontier_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.geojson");
        std::fs::write(&path, ZONES).unwrap();
        let layer = read_zones(&path).unwrap();
        let a: Vec<&ZoneAttributes> = layer.zones.iter().map(|z| &z.attributes).collect();
        assert_eq!(a[0].region, "Africa");
        assert_eq!(a[0].frontier, 1);
        assert_eq!(a[1].frontier, 0);
        assert_eq!(a[1].raw_code, "B");
    }

    #[test]
    fn missing_crs_defaults_to_wgs84() {
        let text = r#"{"type":"FeatureCollection","features":[]}"#;
        let fc = parse_feature_collection(text, Stage::ReadBoundary, Path::new("b")).unwrap();
        assert_eq!(fc.crs, Crs::Epsg(4326));
    }

    #[test]
    fn empty_boundary_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.geojson");
        std::fs::write(&path, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
        let err = read_boundary(&path).unwrap_err();
        assert!(matches!(err, CarbonError::Input { stage: Stage::ReadBoundary, .. }));
    }

    #[test]
    fn written_zones_read_back_with_ids_and_crs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("zones.geojson");
        std::fs::write(&src, ZONES).unwrap();
        let layer = read_zones(&src).unwrap();
        let set = ClippedZoneSet::new(layer.zones);

        let out = dir.path().join("out/clipped.geojson");
        write_zones_geojson(&out, &set, &Crs::Epsg(32636)).unwrap();

        let fc = read_feature_collection(&out, Stage::ReadZones).unwrap();
        assert_eq!(fc.crs, Crs::Epsg(32636));
        let ids: Vec<Option<u64>> = fc.features.iter().map(|f| f.property("zone_id").and_then(Value::as_u64)).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
        assert_eq!(fc.features[1].geometry.0.len(), 2);

        let back = read_zones(&out).unwrap();
        assert_eq!(back.zones[0].attributes, set.attributes(1).cloned().unwrap());
        assert_eq!(back.zones[0].geometry.unsigned_area(), 4.0);
    }

    #[test]
    fn non_collection_is_rejected() {
        let err = parse_feature_collection(r#"{"type":"Feature"}"#, Stage::ReadZones, Path::new("z")).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
    }
}
