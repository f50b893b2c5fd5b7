use super::telemetry::TelemetryUpdate;
use crate::error::AutopilotError;
use crate::geo::VectorNED;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Seam to the concrete autopilot transport. The runtime never speaks the
/// wire protocol itself; it issues discrete commands here and consumes the
/// telemetry stream. Implementations must be cheap to call concurrently.
#[async_trait]
pub trait FlightStack: Send + Sync + 'static {
    /// Resolves once the transport reports a live link. The connection
    /// timeout itself is enforced by the caller.
    async fn wait_connected(&self) -> Result<(), AutopilotError>;

    /// Subscribes to the telemetry stream. Every subscriber sees every
    /// record; the stream ends when the transport closes.
    fn telemetry(&self) -> broadcast::Receiver<TelemetryUpdate>;

    async fn arm(&self) -> Result<(), AutopilotError>;

    async fn disarm(&self) -> Result<(), AutopilotError>;

    async fn takeoff(&self, altitude_m: f64) -> Result<(), AutopilotError>;

    async fn land(&self) -> Result<(), AutopilotError>;

    async fn return_to_launch(&self) -> Result<(), AutopilotError>;

    /// Commands absolute navigation. Altitude is AMSL; heading is the yaw to
    /// hold while moving.
    async fn goto(
        &self,
        lat: f64,
        lon: f64,
        amsl_alt: f64,
        heading_deg: f64,
    ) -> Result<(), AutopilotError>;

    /// Commands a world-frame velocity with a yaw to hold. Remains in effect
    /// until [`FlightStack::stop_velocity`] reverts control.
    async fn set_velocity(&self, ned: VectorNED, yaw_deg: f64) -> Result<(), AutopilotError>;

    /// Reverts any velocity command, returning control to the autopilot.
    async fn stop_velocity(&self) -> Result<(), AutopilotError>;

    /// Turns in place to the given heading.
    async fn turn_to(&self, heading_deg: f64) -> Result<(), AutopilotError>;

    /// Engages position hold.
    async fn hold(&self) -> Result<(), AutopilotError>;

    async fn set_max_speed(&self, speed_m_s: f64) -> Result<(), AutopilotError>;
}
