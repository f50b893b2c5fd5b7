use super::telemetry::{Attitude, Battery, FlightMode, GpsInfo, HealthReport, TelemetryUpdate};
use crate::geo::{Coordinate, VectorNED};
use tokio::time::Instant;

/// The authoritative snapshot of vehicle telemetry.
///
/// Exactly one ingestion task mutates this through [`VehicleState::apply`];
/// every other component reads it through a shared lock. Each update touches
/// a disjoint set of fields, so readers never observe a torn record.
#[derive(Debug, Default)]
pub struct VehicleState {
    position: Option<Coordinate>,
    amsl_alt: f64,
    velocity: VectorNED,
    attitude: Attitude,
    heading_deg: f64,
    battery: Battery,
    gps: GpsInfo,
    home: Option<Coordinate>,
    home_amsl: f64,
    armed: bool,
    armable: bool,
    mode: FlightMode,
    last_arm_time: Option<Instant>,
    mission_start: Option<Instant>,
}

impl VehicleState {
    /// Applies one telemetry record. An arming edge (false to true) stamps
    /// the last arm time used to enforce the arm-to-takeoff delay.
    pub(crate) fn apply(&mut self, update: TelemetryUpdate) {
        match update {
            TelemetryUpdate::Position { coordinate, amsl_alt } => {
                self.position = Some(coordinate);
                self.amsl_alt = amsl_alt;
            }
            TelemetryUpdate::Attitude(attitude) => {
                self.attitude = attitude;
                self.heading_deg = attitude.yaw.to_degrees().rem_euclid(360.0);
            }
            TelemetryUpdate::Velocity(velocity) => self.velocity = velocity,
            TelemetryUpdate::Gps(gps) => self.gps = gps,
            TelemetryUpdate::Battery(battery) => self.battery = battery,
            TelemetryUpdate::FlightMode(mode) => self.mode = mode,
            TelemetryUpdate::Armed(armed) => {
                if armed && !self.armed {
                    self.last_arm_time = Some(Instant::now());
                }
                self.armed = armed;
            }
            TelemetryUpdate::Health(health) => {
                self.armable = health.global_position_ok
                    && health.home_position_ok
                    && health.is_armable;
            }
            TelemetryUpdate::Home { coordinate, amsl_alt } => {
                self.home = Some(coordinate);
                self.home_amsl = amsl_alt;
            }
        }
    }

    pub(crate) fn stamp_mission_start(&mut self) {
        if self.mission_start.is_none() {
            self.mission_start = Some(Instant::now());
        }
    }

    /// Current position; origin with zero altitude until the first fix.
    pub fn position(&self) -> Coordinate {
        self.position.unwrap_or(Coordinate::new(0.0, 0.0, 0.0))
    }

    pub fn has_position(&self) -> bool { self.position.is_some() }

    pub fn amsl_alt(&self) -> f64 { self.amsl_alt }

    pub fn velocity(&self) -> VectorNED { self.velocity }

    pub fn attitude(&self) -> Attitude { self.attitude }

    /// Heading in degrees, `[0, 360)`.
    pub fn heading(&self) -> f64 { self.heading_deg }

    pub fn battery(&self) -> Battery { self.battery }

    pub fn gps(&self) -> GpsInfo { self.gps }

    pub fn home(&self) -> Option<Coordinate> { self.home }

    pub fn home_amsl(&self) -> f64 { self.home_amsl }

    pub fn armed(&self) -> bool { self.armed }

    pub fn armable(&self) -> bool { self.armable }

    pub fn mode(&self) -> FlightMode { self.mode }

    pub fn last_arm_time(&self) -> Option<Instant> { self.last_arm_time }

    pub fn mission_start(&self) -> Option<Instant> { self.mission_start }

    pub fn health_summary(&self) -> String {
        format!(
            "GPS fix: {}, sats: {}, armable: {}",
            self.gps.fix_type, self.gps.satellites_visible, self.armable
        )
    }
}

#[cfg(test)]
impl VehicleState {
    pub(crate) fn test_snapshot(position: Coordinate, battery: Battery, gps: GpsInfo) -> Self {
        let mut state = Self::default();
        state.apply(TelemetryUpdate::Position { coordinate: position, amsl_alt: position.alt() });
        state.apply(TelemetryUpdate::Battery(battery));
        state.apply(TelemetryUpdate::Gps(gps));
        state.apply(TelemetryUpdate::Health(HealthReport {
            global_position_ok: true,
            home_position_ok: true,
            is_armable: true,
        }));
        state
    }
}
