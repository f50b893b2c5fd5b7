//! Deterministic simulated flight stack. Drives straight-line kinematics at
//! a fixed tick so missions can run end-to-end without an autopilot; used by
//! the crate's own tests and useful for rehearsing mission scripts.

use crate::error::AutopilotError;
use crate::geo::{Coordinate, VectorNED};
use crate::vehicle::{
    Attitude, Battery, FlightStack, GpsInfo, HealthReport, TelemetryUpdate,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(50);
const DEFAULT_MAX_SPEED_M_S: f64 = 10.0;
/// Within this of the setpoint the vehicle snaps to it.
const ARRIVAL_EPSILON_M: f64 = 0.25;
const BATTERY_DRAIN_PERCENT_PER_S: f64 = 0.02;

struct SimState {
    position: Coordinate,
    home: Coordinate,
    home_amsl: f64,
    heading_deg: f64,
    commanded_velocity: Option<VectorNED>,
    target: Option<Coordinate>,
    disarm_on_arrival: bool,
    armed: bool,
    max_speed_m_s: f64,
    battery_percent: f64,
}

/// Simulated [`FlightStack`]: accepts every command and moves the vehicle in
/// straight lines toward the active setpoint, publishing a full telemetry
/// snapshot every tick.
pub struct SimFlightStack {
    tx: broadcast::Sender<TelemetryUpdate>,
    sim: Arc<Mutex<SimState>>,
    link_up: AtomicBool,
    cancel: CancellationToken,
}

impl SimFlightStack {
    pub fn new(home: Coordinate, home_amsl: f64) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(512);
        let stack = Arc::new(Self {
            tx,
            sim: Arc::new(Mutex::new(SimState {
                position: home.with_alt(0.0),
                home: home.with_alt(0.0),
                home_amsl,
                heading_deg: 0.0,
                commanded_velocity: None,
                target: None,
                disarm_on_arrival: false,
                armed: false,
                max_speed_m_s: DEFAULT_MAX_SPEED_M_S,
                battery_percent: 100.0,
            })),
            link_up: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });
        stack.spawn_tick();
        stack
    }

    /// Current simulated position, for assertions.
    pub fn position(&self) -> Coordinate {
        self.sim.lock().unwrap().position
    }

    /// Fault injection: while the link is down the simulator keeps flying
    /// but stops publishing telemetry, as a dropped radio would.
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }

    /// The tick task holds only a weak reference so a dropped simulator
    /// stops ticking instead of being kept alive by its own task.
    fn spawn_tick(self: &Arc<Self>) {
        let stack = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(TICK);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let Some(stack) = stack.upgrade() else { return };
                stack.step(TICK.as_secs_f64());
            }
        });
    }

    fn step(&self, dt: f64) {
        let mut sim = self.sim.lock().unwrap();
        if sim.armed {
            sim.battery_percent =
                (sim.battery_percent - BATTERY_DRAIN_PERCENT_PER_S * dt).max(0.0);
            if let Some(velocity) = sim.commanded_velocity {
                sim.position = sim.position + velocity * dt;
            } else if let Some(target) = sim.target {
                let delta = target - sim.position;
                let distance = delta.hypot(false);
                let step = sim.max_speed_m_s * dt;
                if distance <= step.max(ARRIVAL_EPSILON_M) {
                    sim.position = target;
                    sim.target = None;
                    if sim.disarm_on_arrival {
                        sim.disarm_on_arrival = false;
                        sim.armed = false;
                    }
                } else {
                    sim.position = sim.position + delta.norm() * step;
                }
            }
        }
        if self.link_up.load(Ordering::SeqCst) {
            self.publish_snapshot(&sim);
        }
    }

    fn publish_snapshot(&self, sim: &SimState) {
        // Send failures just mean nobody is listening yet.
        let _ = self.tx.send(TelemetryUpdate::Position {
            coordinate: sim.position,
            amsl_alt: sim.home_amsl + sim.position.alt(),
        });
        let _ = self.tx.send(TelemetryUpdate::Attitude(Attitude {
            roll: 0.0,
            pitch: 0.0,
            yaw: sim.heading_deg.to_radians(),
        }));
        let _ = self.tx.send(TelemetryUpdate::Velocity(
            sim.commanded_velocity.unwrap_or(VectorNED::zero()),
        ));
        let _ = self.tx.send(TelemetryUpdate::Battery(Battery {
            voltage: 16.0,
            current: 2.0,
            percent: sim.battery_percent,
        }));
        let _ = self
            .tx
            .send(TelemetryUpdate::Gps(GpsInfo { fix_type: 3, satellites_visible: 16 }));
        let _ = self.tx.send(TelemetryUpdate::Health(HealthReport {
            global_position_ok: true,
            home_position_ok: true,
            is_armable: true,
        }));
        let _ = self.tx.send(TelemetryUpdate::Armed(sim.armed));
        let _ = self.tx.send(TelemetryUpdate::Home {
            coordinate: sim.home,
            amsl_alt: sim.home_amsl,
        });
    }
}

impl Drop for SimFlightStack {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl FlightStack for SimFlightStack {
    async fn wait_connected(&self) -> Result<(), AutopilotError> {
        Ok(())
    }

    fn telemetry(&self) -> broadcast::Receiver<TelemetryUpdate> {
        self.tx.subscribe()
    }

    async fn arm(&self) -> Result<(), AutopilotError> {
        self.sim.lock().unwrap().armed = true;
        Ok(())
    }

    async fn disarm(&self) -> Result<(), AutopilotError> {
        self.sim.lock().unwrap().armed = false;
        Ok(())
    }

    async fn takeoff(&self, altitude_m: f64) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        if !sim.armed {
            return Err(AutopilotError::new("takeoff", "not armed"));
        }
        sim.target = Some(sim.position.with_alt(altitude_m));
        Ok(())
    }

    async fn land(&self) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        sim.target = Some(sim.position.with_alt(0.0));
        sim.disarm_on_arrival = true;
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        sim.target = Some(sim.home.with_alt(0.0));
        sim.disarm_on_arrival = true;
        Ok(())
    }

    async fn goto(
        &self,
        lat: f64,
        lon: f64,
        amsl_alt: f64,
        heading_deg: f64,
    ) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        let rel_alt = amsl_alt - sim.home_amsl;
        sim.target = Some(Coordinate::new(lat, lon, rel_alt));
        sim.heading_deg = heading_deg;
        sim.commanded_velocity = None;
        Ok(())
    }

    async fn set_velocity(&self, ned: VectorNED, yaw_deg: f64) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        sim.commanded_velocity = Some(ned);
        sim.heading_deg = yaw_deg;
        sim.target = None;
        Ok(())
    }

    async fn stop_velocity(&self) -> Result<(), AutopilotError> {
        self.sim.lock().unwrap().commanded_velocity = None;
        Ok(())
    }

    async fn turn_to(&self, heading_deg: f64) -> Result<(), AutopilotError> {
        self.sim.lock().unwrap().heading_deg = heading_deg;
        Ok(())
    }

    async fn hold(&self) -> Result<(), AutopilotError> {
        let mut sim = self.sim.lock().unwrap();
        sim.target = None;
        sim.commanded_velocity = None;
        Ok(())
    }

    async fn set_max_speed(&self, speed_m_s: f64) -> Result<(), AutopilotError> {
        self.sim.lock().unwrap().max_speed_m_s = speed_m_s;
        Ok(())
    }
}
