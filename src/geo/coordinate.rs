use super::VectorNED;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// WGS84 equatorial radius in kilometers, used by the haversine distance.
const EARTH_RADIUS_KM: f64 = 6378.137;
/// WGS84 equatorial radius in meters, used for displacement arithmetic.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// An absolute point in WGS84 space.
///
/// Latitude and longitude are degrees; altitude is meters relative to the
/// home position. The type is an immutable value: adding a [`VectorNED`]
/// produces a new `Coordinate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, in `[-90, 90]`.
    lat: f64,
    /// Longitude in degrees, in `[-180, 180]`.
    lon: f64,
    /// Altitude in meters relative to home.
    alt: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    ///
    /// # Arguments
    /// * `lat` - Latitude in degrees.
    /// * `lon` - Longitude in degrees.
    /// * `alt` - Altitude in meters relative to home.
    ///
    /// # Returns
    /// A new `Coordinate` object.
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self { Self { lat, lon, alt } }

    /// Returns the latitude in degrees.
    pub const fn lat(&self) -> f64 { self.lat }

    /// Returns the longitude in degrees.
    pub const fn lon(&self) -> f64 { self.lon }

    /// Returns the altitude in meters.
    pub const fn alt(&self) -> f64 { self.alt }

    /// Returns the same point with a different altitude.
    pub const fn with_alt(&self, alt: f64) -> Self { Self::new(self.lat, self.lon, alt) }

    /// Computes the horizontal (ground) distance to another coordinate,
    /// ignoring any altitude difference.
    ///
    /// # Arguments
    /// * `other` - The other coordinate.
    ///
    /// # Returns
    /// The ground distance in meters.
    pub fn ground_distance(&self, other: &Coordinate) -> f64 {
        self.distance(&other.with_alt(self.alt))
    }

    /// Computes the 3D distance to another coordinate: haversine over the
    /// ground combined with the altitude difference.
    ///
    /// # Arguments
    /// * `other` - The other coordinate.
    ///
    /// # Returns
    /// The distance in meters.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        let d_ground = EARTH_RADIUS_KM * c * 1000.0;
        d_ground.hypot(other.alt - self.alt)
    }

    /// Computes the bearing from this coordinate to another.
    ///
    /// # Arguments
    /// * `other` - The target coordinate.
    ///
    /// # Returns
    /// The bearing in degrees, wrapped to `[0, 360)`. Coincident points
    /// yield `0.0`.
    pub fn bearing(&self, other: &Coordinate) -> f64 {
        let d_lat = other.lat - self.lat;
        let d_lon = other.lon - self.lon;
        if d_lat.abs() < 1e-10 && d_lon.abs() < 1e-10 {
            return 0.0;
        }
        let bearing = 90.0 + (-d_lat).atan2(d_lon).to_degrees();
        bearing.rem_euclid(360.0)
    }
}

impl Add<VectorNED> for Coordinate {
    type Output = Coordinate;

    /// Displaces the coordinate by a NED vector, producing a new coordinate.
    /// A positive down component lowers the altitude.
    fn add(self, rhs: VectorNED) -> Self::Output {
        let d_lat = rhs.north() / EARTH_RADIUS_M;
        let d_lon = rhs.east() / (EARTH_RADIUS_M * (self.lat.to_radians()).cos());
        Coordinate::new(
            self.lat + d_lat.to_degrees(),
            self.lon + d_lon.to_degrees(),
            self.alt - rhs.down(),
        )
    }
}

impl Sub<VectorNED> for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: VectorNED) -> Self::Output { self + -rhs }
}

impl Sub for Coordinate {
    type Output = VectorNED;

    /// Computes the NED displacement from `rhs` to `self` using a
    /// latitude-dependent meters-per-degree series.
    fn sub(self, rhs: Coordinate) -> Self::Output {
        let lat_mid = (self.lat + rhs.lat).to_radians() / 2.0;
        let d_lat = self.lat - rhs.lat;
        let d_lon = self.lon - rhs.lon;
        VectorNED::new(
            d_lat * (111_132.954 - 559.822 * (2.0 * lat_mid).cos() + 1.175 * (4.0 * lat_mid).cos()),
            d_lon * (111_132.954 * lat_mid.cos()),
            rhs.alt - self.alt,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}) @ {:.1}m", self.lat, self.lon, self.alt)
    }
}
