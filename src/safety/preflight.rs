use crate::error::PreflightError;
use crate::vehicle::VehicleState;

/// Minimum battery charge required to begin a mission.
pub const DEFAULT_MIN_PREFLIGHT_BATTERY_PERCENT: f64 = 10.0;

/// Checks run before arming. These gate arming at the mission level; the
/// autopilot's own arming checks still apply underneath.
pub struct PreflightChecks;

impl PreflightChecks {
    /// Requires a 3D GPS fix.
    pub fn check_gps(state: &VehicleState) -> Result<(), PreflightError> {
        let gps = state.gps();
        if gps.fix_type >= 3 {
            return Ok(());
        }
        Err(PreflightError::Gps { fix_type: gps.fix_type, satellites: gps.satellites_visible })
    }

    pub fn check_battery(state: &VehicleState, min_percent: f64) -> Result<(), PreflightError> {
        let percent = state.battery().percent;
        if percent >= min_percent {
            return Ok(());
        }
        Err(PreflightError::Battery { percent, min_percent })
    }

    pub fn check_armable(state: &VehicleState) -> Result<(), PreflightError> {
        if state.armable() {
            return Ok(());
        }
        Err(PreflightError::NotArmable { summary: state.health_summary() })
    }

    /// Runs every preflight check, failing on the first violation.
    pub fn run_all(state: &VehicleState, min_battery_percent: f64) -> Result<(), PreflightError> {
        Self::check_gps(state)?;
        Self::check_battery(state, min_battery_percent)?;
        Self::check_armable(state)
    }
}
