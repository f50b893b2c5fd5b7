use crate::error::SafetyError;
use crate::geo::Coordinate;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single polygon vertex, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeofencePoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeofencePoint {
    pub const fn new(lat: f64, lon: f64) -> Self { Self { lat, lon } }
}

impl From<&Coordinate> for GeofencePoint {
    fn from(c: &Coordinate) -> Self { Self::new(c.lat(), c.lon()) }
}

/// A closed polygon operating region, either allowed (include) or forbidden
/// (exclude). Vertices are ordered; the closing edge from the last vertex
/// back to the first is implicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceRegion {
    vertices: Vec<GeofencePoint>,
    include: bool,
}

impl GeofenceRegion {
    pub fn new(vertices: Vec<GeofencePoint>, include: bool) -> Self {
        Self { vertices, include }
    }

    pub fn include(&self) -> bool { self.include }

    pub fn vertices(&self) -> &[GeofencePoint] { &self.vertices }

    /// Ray-casting containment: a point is inside iff a horizontal ray
    /// from it crosses the boundary an odd number of times.
    ///
    /// Points exactly on a boundary edge have unspecified parity; callers
    /// must not rely on either answer for them.
    pub fn contains(&self, point: &GeofencePoint) -> bool {
        let n = self.vertices.len();
        if n == 0 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (lon_i, lat_i) = (self.vertices[i].lon, self.vertices[i].lat);
            let (lon_j, lat_j) = (self.vertices[j].lon, self.vertices[j].lat);
            if ((lat_i > point.lat) != (lat_j > point.lat))
                && (point.lon < (lon_j - lon_i) * (point.lat - lat_i) / (lat_j - lat_i) + lon_i)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn contains_coordinate(&self, c: &Coordinate) -> bool {
        self.contains(&GeofencePoint::from(c))
    }

    /// Whether the travel segment from `from` to `to` crosses any boundary
    /// edge of this region.
    pub fn crossed_by(&self, from: &GeofencePoint, to: &GeofencePoint) -> bool {
        self.vertices
            .iter()
            .circular_tuple_windows::<(_, _)>()
            .any(|(a, b)| segments_intersect(from, to, a, b))
    }
}

/// Orientation of the ordered triplet `(p, q, r)` in the lon/lat plane:
/// 0 collinear, 1 clockwise, 2 counterclockwise.
fn orientation(p: &GeofencePoint, q: &GeofencePoint, r: &GeofencePoint) -> u8 {
    let val = (q.lat - p.lat) * (r.lon - q.lon) - (q.lon - p.lon) * (r.lat - q.lat);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        2
    } else {
        0
    }
}

/// Whether `q` lies on the segment `pr`, assuming the three are collinear.
fn lies_on_segment(p: &GeofencePoint, q: &GeofencePoint, r: &GeofencePoint) -> bool {
    q.lon <= p.lon.max(r.lon)
        && q.lon >= p.lon.min(r.lon)
        && q.lat <= p.lat.max(r.lat)
        && q.lat >= p.lat.min(r.lat)
}

/// Whether segment `pq` intersects segment `rs`, including the four
/// collinear special cases.
pub fn segments_intersect(
    p: &GeofencePoint,
    q: &GeofencePoint,
    r: &GeofencePoint,
    s: &GeofencePoint,
) -> bool {
    let o1 = orientation(p, q, r);
    let o2 = orientation(p, q, s);
    let o3 = orientation(r, s, p);
    let o4 = orientation(r, s, q);
    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && lies_on_segment(p, r, q))
        || (o2 == 0 && lies_on_segment(p, s, q))
        || (o3 == 0 && lies_on_segment(r, p, s))
        || (o4 == 0 && lies_on_segment(r, q, s))
}

/// Checks a proposed travel segment against every region in `regions`,
/// failing on the first boundary crossing.
pub fn check_path(
    regions: &[GeofenceRegion],
    from: &Coordinate,
    to: &Coordinate,
) -> Result<(), SafetyError> {
    let a = GeofencePoint::from(from);
    let b = GeofencePoint::from(to);
    if regions.iter().any(|region| region.crossed_by(&a, &b)) {
        return Err(SafetyError::GeofenceViolation { target: *to });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum GeofenceParseError {
    #[error("could not read geofence file")]
    Io(#[from] std::io::Error),
    #[error("no <coordinates> block found")]
    MissingCoordinates,
    #[error("malformed vertex {0:?}")]
    MalformedVertex(String),
}

/// Parses a KML polygon file into an ordered vertex list. Only the first
/// `<coordinates>` block is read; entries are `lon,lat[,alt]` tuples.
pub fn read_geofence_kml(path: &str) -> Result<Vec<GeofencePoint>, GeofenceParseError> {
    let body = std::fs::read_to_string(path)?;
    let re = Regex::new(r"<coordinates>([\s\S]*?)</coordinates>").unwrap();
    let captures = re.captures(&body).ok_or(GeofenceParseError::MissingCoordinates)?;
    let mut polygon = Vec::new();
    for entry in captures[1].split_whitespace() {
        let mut parts = entry.split(',');
        let lon = parts.next().and_then(|v| v.parse::<f64>().ok());
        let lat = parts.next().and_then(|v| v.parse::<f64>().ok());
        match (lat, lon) {
            (Some(lat_deg), Some(lon_deg)) => polygon.push(GeofencePoint::new(lat_deg, lon_deg)),
            _ => return Err(GeofenceParseError::MalformedVertex(entry.to_string())),
        }
    }
    Ok(polygon)
}
