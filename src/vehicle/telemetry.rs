use crate::geo::{Coordinate, VectorNED};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Attitude in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Battery telemetry. `percent` is `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Battery {
    pub voltage: f64,
    pub current: f64,
    pub percent: f64,
}

/// GPS telemetry. Fix types: 0-1 no fix, 2 is 2D, 3 is 3D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GpsInfo {
    pub fix_type: u8,
    pub satellites_visible: u8,
}

/// Health flags relevant to arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub global_position_ok: bool,
    pub home_position_ok: bool,
    pub is_armable: bool,
}

/// Autopilot flight mode tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    #[default]
    Unknown,
    Manual,
    Hold,
    Takeoff,
    Land,
    ReturnToLaunch,
    Offboard,
    Mission,
    Guided,
}

/// Reference frame for velocity commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityFrame {
    /// North/east components are world-aligned.
    Global,
    /// North/east components are relative to the current heading.
    Body,
}

/// One record from the flight stack's telemetry stream. Each variant updates
/// a disjoint part of [`super::VehicleState`].
#[derive(Debug, Clone)]
pub enum TelemetryUpdate {
    /// Position with altitude relative to home, plus AMSL altitude.
    Position { coordinate: Coordinate, amsl_alt: f64 },
    Attitude(Attitude),
    Velocity(VectorNED),
    Gps(GpsInfo),
    Battery(Battery),
    FlightMode(FlightMode),
    Armed(bool),
    Health(HealthReport),
    Home { coordinate: Coordinate, amsl_alt: f64 },
}
