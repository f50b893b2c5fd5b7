//! Coordinate and vector arithmetic on WGS84 and the local NED frame.

mod coordinate;
mod vector_ned;

pub use coordinate::Coordinate;
pub use vector_ned::VectorNED;

#[cfg(test)]
mod tests;
