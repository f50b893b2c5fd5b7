use super::Runner;
use super::descriptor::EntryHandler;
use crate::connection::ConnectionSupervisor;
use crate::error::{MissionError, StateMachineError};
use crate::vehicle::Vehicle;
use crate::{error, info, warn};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Builder for the single-entrypoint mission flavor: one async body, run
/// once, with the same init hook and heartbeat pre-emption as the state
/// machine.
pub struct EntryMissionBuilder<M> {
    entrypoints: Vec<EntryHandler<M>>,
    init: Option<EntryHandler<M>>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
}

impl<M: Send + Sync + 'static> EntryMissionBuilder<M> {
    pub fn new() -> Self {
        Self { entrypoints: Vec::new(), init: None, supervisor: None }
    }

    pub fn entrypoint(mut self, handler: EntryHandler<M>) -> Self {
        self.entrypoints.push(handler);
        self
    }

    pub fn at_init(mut self, handler: EntryHandler<M>) -> Self {
        self.init = Some(handler);
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<ConnectionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn build(mut self) -> Result<EntryMission<M>, StateMachineError> {
        match self.entrypoints.len() {
            0 => Err(StateMachineError::NoEntrypoint),
            1 => Ok(EntryMission {
                entry: self.entrypoints.remove(0),
                init: self.init,
                supervisor: self.supervisor,
            }),
            _ => Err(StateMachineError::MultipleEntrypoints),
        }
    }
}

impl<M: Send + Sync + 'static> Default for EntryMissionBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EntryMission<M> {
    entry: EntryHandler<M>,
    init: Option<EntryHandler<M>>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
}

impl<M> fmt::Debug for EntryMission<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryMission")
            .field("has_init", &self.init.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: Send + Sync + 'static> Runner<M> for EntryMission<M> {
    async fn run(&mut self, mission: Arc<M>, vehicle: Arc<Vehicle>) -> Result<(), MissionError> {
        if let Some(init) = &self.init {
            init(Arc::clone(&mission), Arc::clone(&vehicle)).await?;
        }
        info!("Starting mission entrypoint");
        let body = (self.entry)(Arc::clone(&mission), Arc::clone(&vehicle));
        let result = match &self.supervisor {
            Some(supervisor) => {
                tokio::select! {
                    res = body => res,
                    err = supervisor.heartbeat_lost() => {
                        error!("{err}");
                        if vehicle.armed().await {
                            warn!("Attempting return to launch after heartbeat loss");
                            if let Err(e) = vehicle.stack().return_to_launch().await {
                                error!("Return to launch failed: {e}");
                            }
                        }
                        Err(err.into())
                    }
                }
            }
            None => body.await,
        };
        if result.is_ok() {
            info!("Mission entrypoint finished");
        }
        result
    }
}
