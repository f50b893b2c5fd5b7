use super::geofence::{self, GeofenceRegion};
use crate::error::SafetyError;
use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};

/// Operating bounds supplied at construction. Every bound is optional; an
/// unset bound is never violated. Regions are split into allowed (include)
/// and forbidden (exclude) polygons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_altitude_m: Option<f64>,
    pub min_altitude_m: Option<f64>,
    pub max_speed_m_s: Option<f64>,
    pub min_speed_m_s: Option<f64>,
    pub min_battery_percent: Option<f64>,
    pub include_regions: Vec<GeofenceRegion>,
    pub exclude_regions: Vec<GeofenceRegion>,
}

impl SafetyLimits {
    pub fn check_altitude(&self, altitude_m: f64) -> Result<(), SafetyError> {
        let above = self.max_altitude_m.is_some_and(|max| altitude_m > max);
        let below = self.min_altitude_m.is_some_and(|min| altitude_m < min);
        if above || below {
            return Err(SafetyError::Altitude { altitude_m });
        }
        Ok(())
    }

    pub fn check_speed(&self, speed_m_s: f64) -> Result<(), SafetyError> {
        let above = self.max_speed_m_s.is_some_and(|max| speed_m_s > max);
        let below = self.min_speed_m_s.is_some_and(|min| speed_m_s < min);
        if above || below {
            return Err(SafetyError::Speed { speed_m_s });
        }
        Ok(())
    }

    pub fn check_battery(&self, percent: f64) -> Result<(), SafetyError> {
        if let Some(min_percent) = self.min_battery_percent {
            if percent < min_percent {
                return Err(SafetyError::Battery { percent, min_percent });
            }
        }
        Ok(())
    }

    /// A position is acceptable when it lies inside every include region and
    /// outside every exclude region.
    pub fn check_position(&self, position: &Coordinate) -> Result<(), SafetyError> {
        let outside_include =
            self.include_regions.iter().any(|r| !r.contains_coordinate(position));
        let inside_exclude =
            self.exclude_regions.iter().any(|r| r.contains_coordinate(position));
        if outside_include || inside_exclude {
            return Err(SafetyError::GeofenceViolation { target: *position });
        }
        Ok(())
    }

    /// A travel segment is acceptable when it crosses no region boundary in
    /// either list.
    pub fn check_path(&self, from: &Coordinate, to: &Coordinate) -> Result<(), SafetyError> {
        geofence::check_path(&self.include_regions, from, to)?;
        geofence::check_path(&self.exclude_regions, from, to)
    }
}
