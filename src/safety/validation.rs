use crate::error::SafetyError;

/// Bounds for command parameters. Violations are raised synchronously,
/// before any command reaches the flight stack.
pub(crate) const MIN_POSITION_TOLERANCE_M: f64 = 0.5;
pub(crate) const MAX_POSITION_TOLERANCE_M: f64 = 100.0;
pub(crate) const MIN_COMMAND_ALTITUDE_M: f64 = 1.0;
pub(crate) const MAX_COMMAND_ALTITUDE_M: f64 = 120.0;
pub(crate) const MIN_COMMAND_SPEED_M_S: f64 = 0.1;
pub(crate) const MAX_COMMAND_SPEED_M_S: f64 = 20.0;
pub(crate) const MIN_TAKEOFF_TOLERANCE_FRACTION: f64 = 0.1;
pub(crate) const MAX_TAKEOFF_TOLERANCE_FRACTION: f64 = 1.0;

pub(crate) fn validate_tolerance(value: f64) -> Result<f64, SafetyError> {
    validate_range("tolerance", value, MIN_POSITION_TOLERANCE_M, MAX_POSITION_TOLERANCE_M)
}

pub(crate) fn validate_altitude(value: f64) -> Result<f64, SafetyError> {
    validate_range("altitude", value, MIN_COMMAND_ALTITUDE_M, MAX_COMMAND_ALTITUDE_M)
}

pub(crate) fn validate_speed(value: f64) -> Result<f64, SafetyError> {
    validate_range("speed", value, MIN_COMMAND_SPEED_M_S, MAX_COMMAND_SPEED_M_S)
}

pub(crate) fn validate_tolerance_fraction(value: f64) -> Result<f64, SafetyError> {
    validate_range(
        "altitude tolerance fraction",
        value,
        MIN_TAKEOFF_TOLERANCE_FRACTION,
        MAX_TAKEOFF_TOLERANCE_FRACTION,
    )
}

fn validate_range(
    parameter: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, SafetyError> {
    if !value.is_finite() || value < min || value > max {
        return Err(SafetyError::Parameter { parameter, value, min, max });
    }
    Ok(value)
}

/// Wraps a heading into `[0, 360)`.
pub fn normalize_heading(heading_deg: f64) -> f64 {
    heading_deg.rem_euclid(360.0)
}

/// Minimal angular difference between two headings, in `[0, 180]`.
pub fn heading_difference(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).rem_euclid(360.0);
    diff.min(360.0 - diff)
}
