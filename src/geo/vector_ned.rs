use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A displacement in the local North-East-Down tangent plane, in meters.
///
/// This struct represents a relative offset or a velocity and provides common
/// vector operations such as addition, scaling, rotation and normalization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorNED {
    /// Northward component in meters.
    north: f64,
    /// Eastward component in meters.
    east: f64,
    /// Downward component in meters (negative is up).
    down: f64,
}

impl VectorNED {
    /// Creates a new vector from north, east and down components.
    ///
    /// # Arguments
    /// * `north` - Northward component in meters.
    /// * `east` - Eastward component in meters.
    /// * `down` - Downward component in meters.
    ///
    /// # Returns
    /// A new `VectorNED` object.
    pub const fn new(north: f64, east: f64, down: f64) -> Self {
        Self { north, east, down }
    }

    /// Returns the northward component in meters.
    pub const fn north(&self) -> f64 { self.north }

    /// Returns the eastward component in meters.
    pub const fn east(&self) -> f64 { self.east }

    /// Returns the downward component in meters.
    pub const fn down(&self) -> f64 { self.down }

    /// Creates a zero vector.
    pub const fn zero() -> Self { Self::new(0.0, 0.0, 0.0) }

    /// Rotates the vector about the down axis by an angle in degrees
    /// (counterclockwise when viewed from above). The down component is
    /// unchanged.
    ///
    /// # Arguments
    /// * `angle_deg` - The rotation angle in degrees.
    ///
    /// # Returns
    /// The rotated vector.
    pub fn rotate_by_angle(&self, angle_deg: f64) -> Self {
        let rads = angle_deg.to_radians();
        let east = self.east * rads.cos() - self.north * rads.sin();
        let north = self.east * rads.sin() + self.north * rads.cos();
        Self::new(north, east, self.down)
    }

    /// Computes the magnitude of the vector in meters.
    ///
    /// # Arguments
    /// * `ignore_down` - If `true`, only the horizontal (north/east)
    ///   components contribute.
    ///
    /// # Returns
    /// The magnitude as an `f64`.
    pub fn hypot(&self, ignore_down: bool) -> f64 {
        if ignore_down {
            self.north.hypot(self.east)
        } else {
            (self.north.powi(2) + self.east.powi(2) + self.down.powi(2)).sqrt()
        }
    }

    /// Normalizes the vector to unit magnitude. A zero vector is returned
    /// unmodified.
    ///
    /// # Returns
    /// A unit vector in the same direction.
    pub fn norm(&self) -> Self {
        let h = self.hypot(false);
        if h == 0.0 {
            *self
        } else {
            Self::new(self.north / h, self.east / h, self.down / h)
        }
    }

    /// Computes the cross product of this vector with another.
    ///
    /// # Arguments
    /// * `other` - The right-hand operand.
    ///
    /// # Returns
    /// A new vector perpendicular to both operands.
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.east * other.down - self.down * other.east,
            self.down * other.north - self.north * other.down,
            self.north * other.east - self.east * other.north,
        )
    }

    /// Computes the dot product of this vector with another.
    pub fn dot(&self, other: &Self) -> f64 {
        self.north * other.north + self.east * other.east + self.down * other.down
    }
}

impl Add for VectorNED {
    type Output = VectorNED;

    fn add(self, rhs: VectorNED) -> Self::Output {
        Self::new(self.north + rhs.north, self.east + rhs.east, self.down + rhs.down)
    }
}

impl Sub for VectorNED {
    type Output = VectorNED;

    fn sub(self, rhs: VectorNED) -> Self::Output {
        Self::new(self.north - rhs.north, self.east - rhs.east, self.down - rhs.down)
    }
}

impl Mul<f64> for VectorNED {
    type Output = VectorNED;

    /// Scales the vector by a scalar.
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.north * rhs, self.east * rhs, self.down * rhs)
    }
}

impl Neg for VectorNED {
    type Output = VectorNED;

    fn neg(self) -> Self::Output { Self::new(-self.north, -self.east, -self.down) }
}

impl From<(f64, f64, f64)> for VectorNED {
    fn from(tuple: (f64, f64, f64)) -> Self { Self::new(tuple.0, tuple.1, tuple.2) }
}

impl fmt::Display for VectorNED {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}N, {:.2}E, {:.2}D]", self.north, self.east, self.down)
    }
}
