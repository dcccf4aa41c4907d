/// Coordinate reference handling and the reprojection primitive.
/// All coordinate math uses f64.
use std::fmt;

use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::{CarbonError, Result};

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;
/// EASE-Grid 2.0 global, cylindrical equal-area on WGS84.
pub const EPSG_EASE2_GLOBAL: u32 = 6933;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Latitude of true scale of EPSG:6933.
const EASE2_STANDARD_PARALLEL_DEG: f64 = 30.0;

/// Coordinate reference of a grid or vector layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    Epsg(u32),
    /// The source did not declare a reference we can read.
    Unknown,
}

impl Crs {
    /// Parse `EPSG:n`, `urn:ogc:def:crs:EPSG::n` or the CRS84 URN.
    pub fn parse(s: &str) -> Crs {
        let t = s.trim();
        let upper = t.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Crs::Epsg(EPSG_WGS84);
        }
        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))
            .and_then(|n| n.parse::<u32>().ok());
        match code {
            Some(n) => Crs::Epsg(n),
            None => Crs::Unknown,
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(n) => Some(*n),
            Crs::Unknown => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(n) => write!(f, "EPSG:{n}"),
            Crs::Unknown => f.write_str("unknown"),
        }
    }
}

/// PROJ definition for the EPSG codes the pipeline can move between.
///
/// Covers WGS84 lon/lat, Web Mercator, EASE-Grid 2.0 global, ETRS89-LAEA
/// Europe and the WGS84 UTM zones.
pub fn proj_string(epsg: u32) -> Option<String> {
    let s = match epsg {
        EPSG_WGS84 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        EPSG_WEB_MERCATOR => {
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
                .to_string()
        }
        EPSG_EASE2_GLOBAL => {
            "+proj=cea +lat_ts=30 +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs".to_string()
        }
        3035 => "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 +units=m +no_defs"
            .to_string(),
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", epsg - 32600),
        32701..=32760 => format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", epsg - 32700),
        _ => return None,
    };
    Some(s)
}

fn is_geographic(epsg: u32) -> bool {
    epsg == EPSG_WGS84
}

/// A proj4rs source/target pair for one EPSG → EPSG move.
pub struct ProjTransform {
    from: u32,
    to: u32,
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl fmt::Debug for ProjTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjTransform(EPSG:{} -> EPSG:{})", self.from, self.to)
    }
}

impl ProjTransform {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let unsupported = || CarbonError::UnsupportedProjection {
            from: Crs::Epsg(from).to_string(),
            to: Crs::Epsg(to).to_string(),
        };
        let src = proj_string(from).ok_or_else(unsupported)?;
        let dst = proj_string(to).ok_or_else(unsupported)?;
        let build = |def: &str| {
            Proj::from_proj_string(def).map_err(|e| CarbonError::Reprojection {
                from: Crs::Epsg(from).to_string(),
                to: Crs::Epsg(to).to_string(),
                reason: format!("{def}: {e:?}"),
            })
        };
        Ok(ProjTransform {
            from,
            to,
            source: build(&src)?,
            target: build(&dst)?,
            source_is_geographic: is_geographic(from),
            target_is_geographic: is_geographic(to),
        })
    }

    /// proj4rs works in radians for geographic references.
    pub fn transform(&self, c: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = if self.source_is_geographic {
            (c.x.to_radians(), c.y.to_radians())
        } else {
            (c.x, c.y)
        };
        let mut point = (x, y, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            CarbonError::Reprojection {
                from: Crs::Epsg(self.from).to_string(),
                to: Crs::Epsg(self.to).to_string(),
                reason: format!("({}, {}): {e:?}", c.x, c.y),
            }
        })?;
        let (x, y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        Ok(Coord { x, y })
    }
}

/// How coordinates move from one reference to another.
#[derive(Debug)]
pub enum Reprojection {
    Identity,
    /// Lon/lat degrees on WGS84 to EPSG:6933 metres, in closed form.
    GeographicToEqualArea,
    Proj(Box<ProjTransform>),
}

impl Reprojection {
    /// Pick the strategy for `from` → `to`.
    ///
    /// An unknown reference on either side is taken to already match: layers
    /// without CRS metadata are assumed to share the grid's.
    pub fn between(from: &Crs, to: &Crs) -> Result<Self> {
        match (from, to) {
            (Crs::Unknown, _) | (_, Crs::Unknown) => Ok(Reprojection::Identity),
            (a, b) if a == b => Ok(Reprojection::Identity),
            (Crs::Epsg(EPSG_WGS84), Crs::Epsg(EPSG_EASE2_GLOBAL)) => {
                Ok(Reprojection::GeographicToEqualArea)
            }
            (Crs::Epsg(a), Crs::Epsg(b)) => Ok(Reprojection::Proj(Box::new(ProjTransform::new(*a, *b)?))),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Reprojection::Identity)
    }

    #[inline]
    pub fn transform(&self, c: Coord<f64>) -> Result<Coord<f64>> {
        match self {
            Reprojection::Identity => Ok(c),
            Reprojection::GeographicToEqualArea => {
                let (x, y) = ease2_forward(c.x, c.y);
                Ok(Coord { x, y })
            }
            Reprojection::Proj(t) => t.transform(c),
        }
    }

    pub fn apply(&self, geom: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        match self {
            Reprojection::Identity => Ok(geom.clone()),
            _ => geom.try_map_coords(|c| self.transform(c)),
        }
    }
}

/// Reproject a geometry between two references.
pub fn reproject(geom: &MultiPolygon<f64>, from: &Crs, to: &Crs) -> Result<MultiPolygon<f64>> {
    Reprojection::between(from, to)?.apply(geom)
}

/// Forward cylindrical equal-area projection on the WGS84 ellipsoid with a
/// 30° standard parallel (EPSG:6933). Latitude is clamped to ±90°.
pub fn ease2_forward(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let e = e2.sqrt();
    let sin1 = EASE2_STANDARD_PARALLEL_DEG.to_radians().sin();
    let k0 = EASE2_STANDARD_PARALLEL_DEG.to_radians().cos() / (1.0 - e2 * sin1 * sin1).sqrt();

    let phi = lat_deg.clamp(-90.0, 90.0).to_radians();
    let s = phi.sin();
    let q = (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln());

    let x = WGS84_A * k0 * lon_deg.to_radians();
    let y = WGS84_A * q / (2.0 * k0);
    (x, y)
}
