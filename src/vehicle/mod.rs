//! Vehicle command/telemetry layer: the live state snapshot, the flight
//! stack seam, sequential command execution and cancellable command handles.

mod core;
mod drone;
mod flight_stack;
mod handle;
mod rover;
mod state;
mod telemetry;

pub use self::core::{Vehicle, VehicleKind};
pub use flight_stack::FlightStack;
pub use handle::{CommandHandle, CommandStatus};
pub use state::VehicleState;
pub use telemetry::{
    Attitude, Battery, FlightMode, GpsInfo, HealthReport, TelemetryUpdate, VelocityFrame,
};

#[cfg(test)]
mod tests;
