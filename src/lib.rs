#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
//! Asynchronous mission scripting runtime for autonomous vehicles.
//!
//! A mission is either a single entrypoint or a table of named states driven
//! by a supervised execution loop. Around the script, the runtime maintains a
//! live telemetry snapshot, enforces one-command-at-a-time sequencing against
//! the autopilot, watches connection health and safety limits, and lets
//! missions running in separate processes coordinate over a relay bus.

pub mod connection;
pub mod coordination;
pub mod error;
pub mod geo;
mod logger;
pub mod mission;
pub mod runner;
pub mod safety;
pub mod testing;
pub mod vehicle;

pub use crate::connection::{ConnectionConfig, ConnectionSupervisor};
pub use crate::coordination::{BusClient, BusRelay};
pub use crate::error::MissionError;
pub use crate::geo::{Coordinate, VectorNED};
pub use crate::runner::{EntryMissionBuilder, Runner, StateMachineBuilder};
pub use crate::safety::{SafetyLimits, SafetyMonitor};
pub use crate::vehicle::{CommandHandle, FlightStack, Vehicle, VehicleKind};
