use super::flight_stack::FlightStack;
use super::handle::CommandHandle;
use super::state::VehicleState;
use crate::error::{AutopilotError, CommandError, TimeoutError};
use crate::geo::Coordinate;
use crate::safety::SafetyLimits;
use crate::{info, warn};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, broadcast, watch};
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Vehicle flavor. Rovers measure arrival with 2D ground distance; drones
/// use full 3D distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Drone,
    Rover,
}

/// Readiness predicate gating issuance of the next command. Replaced
/// atomically whenever a command is committed; exactly one is active.
pub(crate) type ReadyFn = Box<dyn Fn(&VehicleState) -> bool + Send + Sync>;

pub(crate) type ProgressFn = Box<dyn Fn(&VehicleState) -> f64 + Send + Sync>;

/// A connected vehicle: the telemetry snapshot plus the sequential command
/// executor.
///
/// Every command first awaits the readiness predicate installed by its
/// predecessor, then installs its own. At most one command is in flight per
/// vehicle at any time; overlapping autopilot commands are the one failure
/// mode this layer exists to prevent.
pub struct Vehicle {
    stack: Arc<dyn FlightStack>,
    kind: VehicleKind,
    state: Arc<RwLock<VehicleState>>,
    ready: RwLock<ReadyFn>,
    issue_lock: Mutex<()>,
    heartbeat_tx: watch::Sender<Instant>,
    locked_heading: StdMutex<Option<f64>>,
    velocity_hold: StdMutex<Option<CancellationToken>>,
    limits: Option<SafetyLimits>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Vehicle {
    /// Poll cadence for readiness checks; short enough to yield the loop to
    /// telemetry between polls.
    pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);
    /// Ceiling on any single blocking command wait.
    pub(crate) const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
    const ARM_TIMEOUT: Duration = Duration::from_secs(60);
    pub(crate) const MIN_ARM_TO_TAKEOFF_DELAY: Duration = Duration::from_secs(2);
    pub(crate) const POST_TAKEOFF_STABILIZATION: Duration = Duration::from_secs(5);
    pub(crate) const HEADING_TOLERANCE_DEG: f64 = 5.0;
    pub const DEFAULT_POSITION_TOLERANCE_M: f64 = 2.0;
    pub const DEFAULT_ROVER_POSITION_TOLERANCE_M: f64 = 2.1;
    pub const DEFAULT_TAKEOFF_ALTITUDE_TOLERANCE: f64 = 0.95;

    /// Wraps a connected flight stack and starts telemetry ingestion. The
    /// caller (normally [`crate::connection::ConnectionSupervisor`]) is
    /// responsible for having waited out the connection handshake.
    pub fn new(
        stack: Arc<dyn FlightStack>,
        kind: VehicleKind,
        limits: Option<SafetyLimits>,
    ) -> Arc<Self> {
        let (heartbeat_tx, _) = watch::channel(Instant::now());
        let vehicle = Arc::new(Self {
            stack,
            kind,
            state: Arc::new(RwLock::new(VehicleState::default())),
            ready: RwLock::new(Box::new(|_: &VehicleState| true) as ReadyFn),
            issue_lock: Mutex::new(()),
            heartbeat_tx,
            locked_heading: StdMutex::new(None),
            velocity_hold: StdMutex::new(None),
            limits,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        vehicle.spawn_ingestion();
        vehicle
    }

    pub fn kind(&self) -> VehicleKind { self.kind }

    pub(crate) fn stack(&self) -> &Arc<dyn FlightStack> { &self.stack }

    /// Subscribes to the heartbeat side-channel: the instant of the most
    /// recent telemetry arrival, regardless of payload.
    pub fn heartbeat(&self) -> watch::Receiver<Instant> { self.heartbeat_tx.subscribe() }

    /// Read access to the live telemetry snapshot.
    pub async fn state(&self) -> RwLockReadGuard<'_, VehicleState> { self.state.read().await }

    pub async fn position(&self) -> Coordinate { self.state.read().await.position() }

    pub async fn heading(&self) -> f64 { self.state.read().await.heading() }

    pub async fn armed(&self) -> bool { self.state.read().await.armed() }

    pub async fn home(&self) -> Option<Coordinate> { self.state.read().await.home() }

    /// Heading locked by a previous `set_heading(..., lock_in=true)`, if any.
    pub fn locked_heading(&self) -> Option<f64> { *self.locked_heading.lock().unwrap() }

    pub(crate) fn set_locked_heading(&self, heading: Option<f64>) {
        *self.locked_heading.lock().unwrap() = heading;
    }

    /// One task owns all writes to [`VehicleState`]; everything else reads.
    /// A closed telemetry stream ends ingestion silently: staleness is
    /// detected by the connection supervisor, not here.
    fn spawn_ingestion(self: &Arc<Self>) {
        let vehicle = Arc::clone(self);
        let mut rx = self.stack.telemetry();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = vehicle.cancel.cancelled() => return,
                    update = rx.recv() => match update {
                        Ok(update) => {
                            vehicle.state.write().await.apply(update);
                            let _ = vehicle.heartbeat_tx.send(Instant::now());
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });
    }

    /// True when the currently installed readiness predicate is satisfied.
    pub async fn done_moving(&self) -> bool {
        let snapshot = self.state.read().await;
        let ready = self.ready.read().await;
        (*ready)(&snapshot)
    }

    pub(crate) async fn install_ready(&self, predicate: ReadyFn) {
        *self.ready.write().await = predicate;
    }

    pub(crate) async fn release_ready(&self) {
        self.install_ready(Box::new(|_: &VehicleState| true)).await;
    }

    /// Blocks until the vehicle reports ready for the next command. Purely
    /// observational; commands themselves serialize through the issuance
    /// lock.
    pub async fn await_ready_to_move(&self) -> Result<(), CommandError> {
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "await_ready_to_move", None).await
    }

    /// Claims the exclusive right to issue the next command: waits out the
    /// predecessor's readiness predicate while holding the issuance lock.
    /// The guard must stay alive until the new predicate is installed, or
    /// two concurrent commands could both observe a ready vehicle and both
    /// reach the autopilot.
    pub(crate) async fn claim_issue_slot(&self) -> Result<MutexGuard<'_, ()>, CommandError> {
        let slot = self.issue_lock.lock().await;
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "await_ready_to_move", None).await?;
        Ok(slot)
    }

    pub(crate) async fn wait_ready(
        &self,
        timeout: Duration,
        operation: &'static str,
        progress: Option<(CommandHandle, ProgressFn)>,
    ) -> Result<(), CommandError> {
        let start = Instant::now();
        loop {
            {
                let snapshot = self.state.read().await;
                if let Some((handle, compute)) = &progress {
                    handle.set_progress(compute(&snapshot));
                }
                let ready = self.ready.read().await;
                if (*ready)(&snapshot) {
                    return Ok(());
                }
            }
            if start.elapsed() > timeout {
                return Err(TimeoutError { operation, timeout_s: timeout.as_secs_f64() }.into());
            }
            sleep(Self::POLL_INTERVAL).await;
        }
    }

    /// Plain state wait, outside the readiness machinery (arm/disarm).
    pub(crate) async fn wait_state(
        &self,
        predicate: impl Fn(&VehicleState) -> bool,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<(), CommandError> {
        let start = Instant::now();
        loop {
            if predicate(&*self.state.read().await) {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(TimeoutError { operation, timeout_s: timeout.as_secs_f64() }.into());
            }
            sleep(Self::POLL_INTERVAL).await;
        }
    }

    /// Arms or disarms, waiting until telemetry reflects the requested
    /// value. Arming requires the vehicle to report armable.
    pub async fn set_armed(&self, value: bool) -> Result<(), CommandError> {
        if value {
            let snapshot = self.state.read().await;
            if !snapshot.armable() {
                return Err(CommandError::Arm(AutopilotError::new(
                    "arm",
                    format!("vehicle not armable: {}", snapshot.health_summary()),
                )));
            }
        }
        let result = if value { self.stack.arm().await } else { self.stack.disarm().await };
        if let Err(e) = result {
            return Err(if value { CommandError::Arm(e) } else { CommandError::Disarm(e) });
        }
        self.wait_state(move |s| s.armed() == value, Self::ARM_TIMEOUT, "arm/disarm").await
    }

    /// Navigates to `target` and blocks until within `tolerance` meters.
    /// Drones measure full 3D distance and hold `target_heading` if given
    /// (or a locked heading, or the bearing to the target); rovers measure
    /// 2D ground distance and ignore heading.
    pub async fn goto(
        &self,
        target: Coordinate,
        tolerance: f64,
        target_heading: Option<f64>,
    ) -> Result<(), CommandError> {
        self.goto_tracked(target, tolerance, target_heading, None).await
    }

    pub(crate) async fn goto_tracked(
        &self,
        target: Coordinate,
        tolerance: f64,
        target_heading: Option<f64>,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        match self.kind {
            VehicleKind::Drone => {
                self.goto_drone(target, tolerance, target_heading, handle).await
            }
            VehicleKind::Rover => self.goto_rover(target, tolerance, handle).await,
        }
    }

    /// Non-blocking variant of [`Vehicle::goto`]; progress is the fraction
    /// of the initial distance already covered.
    pub fn goto_nonblocking(
        self: &Arc<Self>,
        target: Coordinate,
        tolerance: f64,
        target_heading: Option<f64>,
    ) -> CommandHandle {
        self.spawn_tracked(move |vehicle, handle| async move {
            vehicle.goto_tracked(target, tolerance, target_heading, Some(handle)).await
        })
    }

    /// Checks a proposed move against the configured safety limits. Findings
    /// are warnings: the command still proceeds (enforcement is the mission
    /// script's call).
    pub(crate) async fn consult_safety(&self, target: &Coordinate) {
        let Some(limits) = &self.limits else { return };
        let from = self.state.read().await.position();
        if let Err(e) = limits.check_position(target) {
            warn!("safety: {e}");
        }
        if let Err(e) = limits.check_path(&from, target) {
            warn!("safety: {e}");
        }
        if let Err(e) = limits.check_altitude(target.alt()) {
            warn!("safety: {e}");
        }
    }

    pub(crate) async fn stamp_mission_start(&self) {
        self.state.write().await.stamp_mission_start();
    }

    /// Replaces any running velocity-hold timer, cancelling the previous one.
    pub(crate) fn replace_velocity_hold(&self, token: Option<CancellationToken>) {
        let mut slot = self.velocity_hold.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = token;
    }

    /// Runs a command future under a [`CommandHandle`]: cancellation via the
    /// handle aborts the in-flight wait and releases the readiness slot.
    pub(crate) fn spawn_tracked<F, Fut>(self: &Arc<Self>, run: F) -> CommandHandle
    where
        F: FnOnce(Arc<Vehicle>, CommandHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        let handle = CommandHandle::new();
        let vehicle = Arc::clone(self);
        let tracked = handle.clone();
        tokio::spawn(async move {
            tracked.set_running();
            let token = tracked.cancelled_token();
            let fut = run(Arc::clone(&vehicle), tracked.clone());
            tokio::pin!(fut);
            let result = tokio::select! {
                () = token.cancelled() => {
                    vehicle.release_ready().await;
                    Err(CommandError::Cancelled)
                }
                res = &mut fut => res,
            };
            match result {
                Ok(()) => tracked.complete(),
                Err(CommandError::Cancelled) => tracked.mark_cancelled(),
                Err(e) => {
                    warn!("tracked command failed: {e}");
                    tracked.fail(e);
                }
            }
        });
        handle
    }

    /// Stops ingestion and any velocity hold. Idempotent; the snapshot
    /// simply stops updating afterwards.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.replace_velocity_hold(None);
        self.cancel.cancel();
        info!("Vehicle connection closed");
    }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}

impl Drop for Vehicle {
    fn drop(&mut self) { self.close(); }
}

impl fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vehicle")
            .field("kind", &self.kind)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
