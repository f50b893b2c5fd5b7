//! Error taxonomy for the mission runtime.
//!
//! Every failure class carries its original cause where one exists, so a
//! script can match on the category while logs still show the autopilot's
//! rejection reason. Parameter validation errors are raised synchronously
//! before any command reaches the flight stack.

use crate::geo::Coordinate;
use thiserror::Error;

/// Rejection reported by the flight-stack collaborator for a single command.
#[derive(Debug, Clone, Error)]
#[error("autopilot rejected {command}: {reason}")]
pub struct AutopilotError {
    pub command: &'static str,
    pub reason: String,
}

impl AutopilotError {
    pub fn new(command: &'static str, reason: impl Into<String>) -> Self {
        Self { command, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no connection to {address} within {timeout_s}s")]
    Timeout { address: String, timeout_s: f64 },
    /// Critical: the caller should attempt an RTL if the vehicle is airborne.
    #[error("heartbeat lost, {age_s:.1}s since last telemetry")]
    HeartbeatLost { age_s: f64 },
    #[error("reconnect to {address} failed after {attempts} attempts")]
    ReconnectionFailed { address: String, attempts: u32 },
}

/// Per-operation timeout, distinct from [`ConnectionError::Timeout`].
#[derive(Debug, Error)]
#[error("{operation} did not complete within {timeout_s}s")]
pub struct TimeoutError {
    pub operation: &'static str,
    pub timeout_s: f64,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to arm")]
    Arm(#[source] AutopilotError),
    #[error("failed to disarm")]
    Disarm(#[source] AutopilotError),
    #[error("takeoff to {target_alt}m failed")]
    Takeoff {
        target_alt: f64,
        #[source]
        source: AutopilotError,
    },
    #[error("landing failed")]
    Landing(#[source] AutopilotError),
    #[error("return to launch failed")]
    Rtl(#[source] AutopilotError),
    #[error("navigation to {target} failed")]
    Navigation {
        target: Coordinate,
        #[source]
        source: AutopilotError,
    },
    #[error("velocity command failed")]
    Velocity(#[source] AutopilotError),
    #[error("heading change to {heading_deg}\u{b0} failed")]
    Heading {
        heading_deg: f64,
        #[source]
        source: AutopilotError,
    },
    #[error("mode change to {mode} failed")]
    ModeChange {
        mode: String,
        #[source]
        source: AutopilotError,
    },
    /// Parameter rejected before anything reached the flight stack.
    #[error(transparent)]
    InvalidParameter(#[from] SafetyError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("command cancelled")]
    Cancelled,
}

/// Safety findings are warnings by default; nothing in the runtime acts on
/// them unless the mission script chooses to.
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("{parameter} out of range: {value} not in [{min}, {max}]")]
    Parameter {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("path to {target} crosses a geofence boundary")]
    GeofenceViolation { target: Coordinate },
    #[error("altitude {altitude_m}m outside allowed band")]
    Altitude { altitude_m: f64 },
    #[error("speed {speed_m_s} m/s outside allowed band")]
    Speed { speed_m_s: f64 },
    #[error("battery at {percent}% below minimum {min_percent}%")]
    Battery { percent: f64, min_percent: f64 },
}

/// Failures that block arming.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("GPS fix type {fix_type} below required 3D fix ({satellites} sats visible)")]
    Gps { fix_type: u8, satellites: u8 },
    #[error("battery at {percent}%, minimum {min_percent}%")]
    Battery { percent: f64, min_percent: f64 },
    #[error("vehicle not armable: {summary}")]
    NotArmable { summary: String },
}

/// Construction- or loop-time state machine faults. All fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("no state marked initial")]
    NoInitialState,
    #[error("multiple states marked initial: {0:?}")]
    MultipleInitialStates(Vec<String>),
    #[error("invalid state name {0:?}: must be unique and non-empty")]
    InvalidStateName(String),
    #[error("unknown state {target:?}, available: {available:?}")]
    InvalidState {
        target: String,
        available: Vec<String>,
    },
    #[error("no entrypoint registered")]
    NoEntrypoint,
    #[error("multiple entrypoints registered")]
    MultipleEntrypoints,
}

/// User- or safety-triggered cancellation. Recoverable at process level.
#[derive(Debug, Error)]
pub enum AbortError {
    #[error("aborted by user: {0}")]
    User(String),
    #[error("aborted by safety monitor: {0}")]
    Safety(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus i/o failed")]
    Io(#[from] std::io::Error),
    #[error("bus frame decode failed")]
    Decode(#[from] prost::DecodeError),
    #[error("bus payload was not valid JSON")]
    Payload(#[from] serde_json::Error),
    #[error("relay connection closed")]
    RelayClosed,
    #[error("field query to {target} timed out")]
    QueryTimeout { target: String },
}

/// Umbrella error surfaced by mission runners.
#[derive(Debug, Error)]
pub enum MissionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
    #[error(transparent)]
    Abort(#[from] AbortError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("{0}")]
    Script(String),
}

impl MissionError {
    /// Process exit code distinguishing "connection lost" from "mission
    /// error"; clean completion is expected to exit 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            MissionError::Connection(_) => 2,
            _ => 1,
        }
    }
}
