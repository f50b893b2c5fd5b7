//! Safety validation: geofence geometry, numeric limits, preflight gates and
//! a stateful monitor that reports violations without enforcing them.

pub(crate) mod geofence;
mod limits;
mod monitor;
mod preflight;
pub(crate) mod validation;

pub use geofence::{
    GeofenceParseError, GeofencePoint, GeofenceRegion, read_geofence_kml, segments_intersect,
};
pub use limits::SafetyLimits;
pub use monitor::{SafetyMonitor, SafetyViolation, ViolationCallback};
pub use preflight::{DEFAULT_MIN_PREFLIGHT_BATTERY_PERCENT, PreflightChecks};
pub use validation::{heading_difference, normalize_heading};

#[cfg(test)]
mod tests;
