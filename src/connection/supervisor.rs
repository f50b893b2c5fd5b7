use crate::error::ConnectionError;
use crate::safety::SafetyLimits;
use crate::vehicle::{FlightStack, Vehicle, VehicleKind};
use crate::{error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex};
use strum_macros::Display;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, interval, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Link establishment and heartbeat parameters.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Address of the flight stack, recorded for diagnostics only; the
    /// transport itself lives behind [`FlightStack`].
    pub address: String,
    /// Per-attempt ceiling on link establishment.
    pub connect_timeout: Duration,
    pub connect_attempts: u32,
    /// Startup window during which telemetry silence is tolerated; the
    /// stream needs time to start flowing after the link comes up.
    pub heartbeat_grace: Duration,
    /// Telemetry age past which the link counts as lost.
    pub heartbeat_timeout: Duration,
    pub check_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: String::from("udp://:14540"),
            connect_timeout: Duration::from_secs(30),
            connect_attempts: 3,
            heartbeat_grace: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            check_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Connected,
    HeartbeatLost,
    Closed,
}

/// Establishes the link to a flight stack and watches the telemetry
/// heartbeat afterwards.
///
/// Heartbeat loss is terminal for the supervisor: it reports once through
/// [`ConnectionSupervisor::heartbeat_lost`] and stops checking. Recovery
/// (typically an RTL attempt) is the mission layer's decision.
/// Callback invoked with the stale telemetry age in seconds.
pub type DisconnectCallback = Box<dyn Fn(f64) + Send + Sync>;

pub struct ConnectionSupervisor {
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    lost: CancellationToken,
    lost_age_s: Mutex<f64>,
    on_disconnect: Mutex<Vec<DisconnectCallback>>,
    stop: CancellationToken,
}

impl ConnectionSupervisor {
    /// Waits for the flight stack link, retrying up to the configured
    /// attempt count, then wraps it in a [`Vehicle`] and starts the
    /// heartbeat monitor.
    pub async fn connect(
        config: ConnectionConfig,
        stack: Arc<dyn FlightStack>,
        kind: VehicleKind,
        limits: Option<SafetyLimits>,
    ) -> Result<(Arc<Vehicle>, Arc<Self>), ConnectionError> {
        info!("Connecting to flight stack at {}", config.address);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match timeout(config.connect_timeout, stack.wait_connected()).await {
                Ok(Ok(())) => break,
                Ok(Err(e)) => warn!("Connection attempt {attempt} rejected: {e}"),
                Err(_) => warn!(
                    "Connection attempt {attempt} timed out after {}s",
                    config.connect_timeout.as_secs_f64()
                ),
            }
            if attempt >= config.connect_attempts {
                if attempt == 1 {
                    return Err(ConnectionError::Timeout {
                        address: config.address,
                        timeout_s: config.connect_timeout.as_secs_f64(),
                    });
                }
                return Err(ConnectionError::ReconnectionFailed {
                    address: config.address,
                    attempts: attempt,
                });
            }
        }
        info!("Connected to {}", config.address);

        let vehicle = Vehicle::new(stack, kind, limits);
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let supervisor = Arc::new(Self {
            config,
            state_tx,
            lost: CancellationToken::new(),
            lost_age_s: Mutex::new(0.0),
            on_disconnect: Mutex::new(Vec::new()),
            stop: CancellationToken::new(),
        });
        supervisor.spawn_monitor(vehicle.heartbeat());
        Ok((vehicle, supervisor))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Registers a callback invoked with the telemetry age when the
    /// heartbeat is declared lost.
    pub fn on_disconnect(&self, callback: DisconnectCallback) {
        self.on_disconnect.lock().unwrap().push(callback);
    }

    /// Resolves once (and only if) the heartbeat is declared lost.
    pub async fn heartbeat_lost(&self) -> ConnectionError {
        self.lost.cancelled().await;
        ConnectionError::HeartbeatLost { age_s: *self.lost_age_s.lock().unwrap() }
    }

    /// Stops monitoring. Idempotent; a loss already declared stays declared.
    pub fn stop(&self) {
        self.stop.cancel();
        self.state_tx.send_if_modified(|state| match *state {
            ConnectionState::HeartbeatLost | ConnectionState::Closed => false,
            _ => {
                *state = ConnectionState::Closed;
                true
            }
        });
    }

    fn spawn_monitor(self: &Arc<Self>, heartbeat: watch::Receiver<Instant>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = supervisor.stop.cancelled() => return,
                () = sleep(supervisor.config.heartbeat_grace) => {}
            }
            let mut ticker = interval(supervisor.config.check_interval);
            loop {
                tokio::select! {
                    () = supervisor.stop.cancelled() => return,
                    _ = ticker.tick() => {
                        let age = heartbeat.borrow().elapsed();
                        if age > supervisor.config.heartbeat_timeout {
                            let age_s = age.as_secs_f64();
                            error!(
                                "Heartbeat lost: {age_s:.1}s since last telemetry from {}",
                                supervisor.config.address
                            );
                            *supervisor.lost_age_s.lock().unwrap() = age_s;
                            supervisor.state_tx.send_replace(ConnectionState::HeartbeatLost);
                            for callback in supervisor.on_disconnect.lock().unwrap().iter() {
                                callback(age_s);
                            }
                            supervisor.lost.cancel();
                            return;
                        }
                    }
                }
            }
        });
    }
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
