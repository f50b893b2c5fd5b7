use super::SafetyLimits;
use crate::error::SafetyError;
use crate::vehicle::VehicleState;
use crate::warn;
use futures::future::BoxFuture;
use strum_macros::Display;

/// Violation classes reported by [`SafetyMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyViolation {
    AltitudeExceeded,
    AltitudeBelowMin,
    SpeedExceeded,
    SpeedBelowMin,
    LowBattery,
    GeofenceBreach,
}

pub type ViolationCallback =
    Box<dyn Fn(SafetyViolation, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Evaluates [`SafetyLimits`] against each telemetry tick and reports
/// violations to registered async callbacks. The monitor only observes;
/// enforcement, if any, belongs to the mission script or the autopilot's
/// own envelope protection.
pub struct SafetyMonitor {
    limits: SafetyLimits,
    callbacks: Vec<ViolationCallback>,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits) -> Self {
        Self { limits, callbacks: Vec::new() }
    }

    pub fn limits(&self) -> &SafetyLimits { &self.limits }

    /// Registers an async `(violation, message)` callback. Callbacks are
    /// awaited in registration order on every finding.
    pub fn on_violation(&mut self, cb: ViolationCallback) {
        self.callbacks.push(cb);
    }

    /// Evaluates every limit against the given snapshot. Call once per
    /// telemetry tick.
    pub async fn check(&self, state: &VehicleState) {
        let position = state.position();
        if let Err(e) = self.limits.check_altitude(position.alt()) {
            let kind = match e {
                SafetyError::Altitude { altitude_m }
                    if self.limits.max_altitude_m.is_some_and(|max| altitude_m > max) =>
                {
                    SafetyViolation::AltitudeExceeded
                }
                _ => SafetyViolation::AltitudeBelowMin,
            };
            self.emit(kind, e.to_string()).await;
        }
        let speed = state.velocity().hypot(false);
        if let Err(e) = self.limits.check_speed(speed) {
            let kind = if self.limits.max_speed_m_s.is_some_and(|max| speed > max) {
                SafetyViolation::SpeedExceeded
            } else {
                SafetyViolation::SpeedBelowMin
            };
            self.emit(kind, e.to_string()).await;
        }
        if let Err(e) = self.limits.check_battery(state.battery().percent) {
            self.emit(SafetyViolation::LowBattery, e.to_string()).await;
        }
        if let Err(e) = self.limits.check_position(&position) {
            self.emit(SafetyViolation::GeofenceBreach, e.to_string()).await;
        }
    }

    async fn emit(&self, kind: SafetyViolation, message: String) {
        warn!("[SafetyMonitor] {kind}: {message}");
        for cb in &self.callbacks {
            cb(kind, message.clone()).await;
        }
    }
}
