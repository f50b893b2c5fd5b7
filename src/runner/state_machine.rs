use super::Runner;
use super::descriptor::{BackgroundHandler, EntryHandler, StateEntry, StateHandler, StateKind};
use crate::connection::ConnectionSupervisor;
use crate::error::{MissionError, StateMachineError};
use crate::vehicle::Vehicle;
use crate::{error, info, warn};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Breather between state iterations so background tasks and telemetry
/// ingestion are never starved.
const STATE_DELAY: Duration = Duration::from_millis(10);
const BACKGROUND_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Declarative construction of a [`StateMachine`]. States are registered by
/// name; exactly one must be marked initial. Validation happens in
/// [`StateMachineBuilder::build`], before anything runs.
pub struct StateMachineBuilder<M> {
    states: Vec<StateEntry<M>>,
    background: Vec<BackgroundHandler<M>>,
    init: Option<EntryHandler<M>>,
    cleanup: Option<EntryHandler<M>>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    forced: Option<mpsc::UnboundedReceiver<String>>,
}

impl<M: Send + Sync + 'static> StateMachineBuilder<M> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            background: Vec::new(),
            init: None,
            cleanup: None,
            supervisor: None,
            forced: None,
        }
    }

    pub fn state(self, name: impl Into<String>, handler: StateHandler<M>) -> Self {
        self.push(name.into(), StateKind::Standard, false, handler)
    }

    pub fn initial_state(self, name: impl Into<String>, handler: StateHandler<M>) -> Self {
        self.push(name.into(), StateKind::Standard, true, handler)
    }

    pub fn timed_state(
        self,
        name: impl Into<String>,
        duration: Duration,
        looped: bool,
        handler: StateHandler<M>,
    ) -> Self {
        self.push(name.into(), StateKind::Timed { duration, looped }, false, handler)
    }

    pub fn initial_timed_state(
        self,
        name: impl Into<String>,
        duration: Duration,
        looped: bool,
        handler: StateHandler<M>,
    ) -> Self {
        self.push(name.into(), StateKind::Timed { duration, looped }, true, handler)
    }

    /// Registers a task run concurrently with the state loop for the whole
    /// mission. Completed or failed tasks are restarted until the mission
    /// ends.
    pub fn background(mut self, handler: BackgroundHandler<M>) -> Self {
        self.background.push(handler);
        self
    }

    /// Registers a hook run once before the state loop starts.
    pub fn at_init(mut self, handler: EntryHandler<M>) -> Self {
        self.init = Some(handler);
        self
    }

    /// Registers a hook run after the state loop ends, whether the mission
    /// completed or failed. Its own error is reported only when the mission
    /// would otherwise have succeeded.
    pub fn at_cleanup(mut self, handler: EntryHandler<M>) -> Self {
        self.cleanup = Some(handler);
        self
    }

    /// Attaches a connection supervisor; heartbeat loss then pre-empts the
    /// running state and fails the mission after an RTL attempt.
    pub fn with_supervisor(mut self, supervisor: Arc<ConnectionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Attaches a queue of externally forced transitions (normally fed by
    /// the coordination bus). A forced transition overrides the handler's
    /// own return at the next state boundary.
    pub fn with_forced_transitions(mut self, rx: mpsc::UnboundedReceiver<String>) -> Self {
        self.forced = Some(rx);
        self
    }

    fn push(mut self, name: String, kind: StateKind, initial: bool, handler: StateHandler<M>) -> Self {
        self.states.push(StateEntry { name, kind, initial, handler });
        self
    }

    pub fn build(self) -> Result<StateMachine<M>, StateMachineError> {
        for (i, entry) in self.states.iter().enumerate() {
            if entry.name.is_empty()
                || self.states[..i].iter().any(|other| other.name == entry.name)
            {
                return Err(StateMachineError::InvalidStateName(entry.name.clone()));
            }
        }
        let initial: Vec<String> = self
            .states
            .iter()
            .filter(|entry| entry.initial)
            .map(|entry| entry.name.clone())
            .collect();
        let initial = match initial.len() {
            0 => return Err(StateMachineError::NoInitialState),
            1 => initial.into_iter().next().unwrap(),
            _ => return Err(StateMachineError::MultipleInitialStates(initial)),
        };
        Ok(StateMachine {
            states: self.states,
            background: self.background,
            init: self.init,
            cleanup: self.cleanup,
            supervisor: self.supervisor,
            forced: self.forced,
            initial,
        })
    }
}

impl<M: Send + Sync + 'static> Default for StateMachineBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The named-state mission runner. Drives one state at a time, starting at
/// the initial state, until a handler returns no successor.
pub struct StateMachine<M> {
    states: Vec<StateEntry<M>>,
    background: Vec<BackgroundHandler<M>>,
    init: Option<EntryHandler<M>>,
    cleanup: Option<EntryHandler<M>>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    forced: Option<mpsc::UnboundedReceiver<String>>,
    initial: String,
}

impl<M: Send + Sync + 'static> StateMachine<M> {
    fn available(&self) -> Vec<String> {
        self.states.iter().map(|entry| entry.name.clone()).collect()
    }

    fn take_forced(&mut self) -> Option<String> {
        let rx = self.forced.as_mut()?;
        let mut last = None;
        while let Ok(name) = rx.try_recv() {
            last = Some(name);
        }
        last
    }

    async fn run_states(
        &mut self,
        mission: &Arc<M>,
        vehicle: &Arc<Vehicle>,
    ) -> Result<(), MissionError> {
        let mut current = self.initial.clone();
        loop {
            info!("Entering state {current:?}");
            let next = {
                let entry = self
                    .states
                    .iter()
                    .find(|entry| entry.name == current)
                    .expect("transition targets are validated before entry");
                match entry.kind {
                    StateKind::Standard => {
                        (entry.handler)(Arc::clone(mission), Arc::clone(vehicle)).await?
                    }
                    StateKind::Timed { duration, looped: false } => {
                        let deadline = Instant::now() + duration;
                        let next =
                            (entry.handler)(Arc::clone(mission), Arc::clone(vehicle)).await?;
                        sleep_until(deadline).await;
                        next
                    }
                    StateKind::Timed { duration, looped: true } => {
                        let deadline = Instant::now() + duration;
                        let mut last;
                        loop {
                            last = (entry.handler)(Arc::clone(mission), Arc::clone(vehicle))
                                .await?;
                            if Instant::now() >= deadline {
                                break;
                            }
                            sleep(STATE_DELAY).await;
                        }
                        last
                    }
                }
            };
            let next = match self.take_forced() {
                Some(forced) => {
                    warn!("Forced transition to {forced:?}");
                    Some(forced)
                }
                None => next,
            };
            match next {
                None => {
                    info!("Mission complete, no successor to {current:?}");
                    return Ok(());
                }
                Some(name) => {
                    if !self.states.iter().any(|entry| entry.name == name) {
                        return Err(StateMachineError::InvalidState {
                            target: name,
                            available: self.available(),
                        }
                        .into());
                    }
                    current = name;
                }
            }
            sleep(STATE_DELAY).await;
        }
    }

    fn spawn_background(
        &self,
        mission: &Arc<M>,
        vehicle: &Arc<Vehicle>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.background.len());
        for (index, handler) in self.background.iter().enumerate() {
            let handler = Arc::clone(handler);
            let mission = Arc::clone(mission);
            let vehicle = Arc::clone(vehicle);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let body = handler(Arc::clone(&mission), Arc::clone(&vehicle));
                    let backoff = tokio::select! {
                        () = cancel.cancelled() => return,
                        res = body => match res {
                            Ok(()) => STATE_DELAY,
                            Err(e) => {
                                warn!("Background task {index} failed: {e}");
                                BACKGROUND_ERROR_BACKOFF
                            }
                        }
                    };
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = sleep(backoff) => {}
                    }
                }
            }));
        }
        handles
    }

    async fn run_mission(
        &mut self,
        mission: Arc<M>,
        vehicle: Arc<Vehicle>,
    ) -> Result<(), MissionError> {
        if let Some(init) = &self.init {
            init(Arc::clone(&mission), Arc::clone(&vehicle)).await?;
        }
        let cancel = CancellationToken::new();
        let background = self.spawn_background(&mission, &vehicle, &cancel);
        let result = match self.supervisor.clone() {
            Some(supervisor) => {
                tokio::select! {
                    res = self.run_states(&mission, &vehicle) => res,
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
            None => self.run_states(&mission, &vehicle).await,
        };
        cancel.cancel();
        for handle in background {
            let _ = handle.await;
        }
        let cleanup_result = match &self.cleanup {
            Some(cleanup) => cleanup(Arc::clone(&mission), Arc::clone(&vehicle)).await,
            None => Ok(()),
        };
        if let Err(e) = &cleanup_result {
            warn!("Mission cleanup failed: {e}");
        }
        result.and(cleanup_result)
    }
}

impl<M> fmt::Debug for StateMachine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.states.iter().map(|e| e.name.as_str()).collect::<Vec<_>>())
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: Send + Sync + 'static> Runner<M> for StateMachine<M> {
    async fn run(&mut self, mission: Arc<M>, vehicle: Arc<Vehicle>) -> Result<(), MissionError> {
        self.run_mission(mission, vehicle).await
    }
}
