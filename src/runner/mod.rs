//! Mission runners: a single-entrypoint flavor and a named-state machine
//! with timed states, supervised background tasks and externally forced
//! transitions.
//!
//! Missions share state through `Arc<M>`; anything a handler mutates lives
//! behind the mission's own interior mutability. Handlers receive the
//! vehicle alongside the mission and return the next state by name (state
//! machine) or unit (entrypoint). Returning no next state ends the mission.

mod basic;
mod descriptor;
mod state_machine;

pub use basic::{EntryMission, EntryMissionBuilder};
pub use descriptor::{BackgroundHandler, EntryHandler, StateHandler, StateKind};
pub use state_machine::{StateMachine, StateMachineBuilder};

use crate::error::MissionError;
use crate::vehicle::Vehicle;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Wraps a plain async function as a [`StateHandler`].
pub fn state_fn<M, F, Fut>(f: F) -> StateHandler<M>
where
    F: Fn(Arc<M>, Arc<Vehicle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, MissionError>> + Send + 'static,
{
    Box::new(move |mission, vehicle| Box::pin(f(mission, vehicle)))
}

/// Wraps a plain async function as an [`EntryHandler`].
pub fn entry_fn<M, F, Fut>(f: F) -> EntryHandler<M>
where
    F: Fn(Arc<M>, Arc<Vehicle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MissionError>> + Send + 'static,
{
    Box::new(move |mission, vehicle| Box::pin(f(mission, vehicle)))
}

/// Wraps a plain async function as a [`BackgroundHandler`].
pub fn background_fn<M, F, Fut>(f: F) -> BackgroundHandler<M>
where
    F: Fn(Arc<M>, Arc<Vehicle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MissionError>> + Send + 'static,
{
    Arc::new(move |mission, vehicle| Box::pin(f(mission, vehicle)))
}

/// Common surface of every runner flavor.
#[async_trait]
pub trait Runner<M: Send + Sync + 'static>: Send {
    /// Drives the mission to completion. Consumes the runner's one-shot
    /// resources (forced-transition queue, background supervision).
    async fn run(&mut self, mission: Arc<M>, vehicle: Arc<Vehicle>) -> Result<(), MissionError>;
}

#[cfg(test)]
mod tests;
