use crate::error::MissionError;
use crate::vehicle::Vehicle;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::Duration;

/// How the execution loop drives a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Run once; the handler's return names the next state.
    Standard,
    /// Hold the state for `duration`. With `looped` the handler is invoked
    /// repeatedly until the duration elapses (an in-flight invocation always
    /// completes); otherwise it runs once and the remainder is slept away.
    /// The transition comes from the final invocation.
    Timed { duration: Duration, looped: bool },
}

/// A state body. Returns the next state's name, or `None` to end the
/// mission.
pub type StateHandler<M> = Box<
    dyn Fn(Arc<M>, Arc<Vehicle>) -> BoxFuture<'static, Result<Option<String>, MissionError>>
        + Send
        + Sync,
>;

/// A background task body. Re-run for the lifetime of the mission; errors
/// are logged and the task restarted after a backoff.
pub type BackgroundHandler<M> = Arc<
    dyn Fn(Arc<M>, Arc<Vehicle>) -> BoxFuture<'static, Result<(), MissionError>> + Send + Sync,
>;

/// A single-shot body: the entrypoint of a basic mission, or an init hook
/// run before the execution loop starts.
pub type EntryHandler<M> = Box<
    dyn Fn(Arc<M>, Arc<Vehicle>) -> BoxFuture<'static, Result<(), MissionError>> + Send + Sync,
>;

pub(crate) struct StateEntry<M> {
    pub name: String,
    pub kind: StateKind,
    pub initial: bool,
    pub handler: StateHandler<M>,
}
