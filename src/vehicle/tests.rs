use super::*;
use crate::error::{AutopilotError, CommandError};
use crate::geo::{Coordinate, VectorNED};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};

const HOME_LAT: f64 = 35.7274;
const HOME_LON: f64 = -78.6962;
const HOME_AMSL: f64 = 100.0;

/// Flight stack double that records every command and, when
/// `respond_position` is set, immediately echoes telemetry that satisfies
/// the command's readiness predicate.
struct ScriptedStack {
    tx: broadcast::Sender<TelemetryUpdate>,
    calls: Mutex<Vec<&'static str>>,
    last_velocity: Mutex<Option<(VectorNED, f64)>>,
    respond_position: bool,
}

impl ScriptedStack {
    fn new(respond_position: bool) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(64);
        Arc::new(Self {
            tx,
            calls: Mutex::new(Vec::new()),
            last_velocity: Mutex::new(None),
            respond_position,
        })
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn publish(&self, update: TelemetryUpdate) {
        let _ = self.tx.send(update);
    }

    fn publish_ready_state(&self) {
        self.publish(TelemetryUpdate::Health(HealthReport {
            global_position_ok: true,
            home_position_ok: true,
            is_armable: true,
        }));
        self.publish(TelemetryUpdate::Gps(GpsInfo { fix_type: 3, satellites_visible: 12 }));
        self.publish(TelemetryUpdate::Battery(Battery {
            voltage: 16.2,
            current: 1.1,
            percent: 90.0,
        }));
        self.publish(TelemetryUpdate::Position {
            coordinate: Coordinate::new(HOME_LAT, HOME_LON, 0.0),
            amsl_alt: HOME_AMSL,
        });
        self.publish(TelemetryUpdate::Home {
            coordinate: Coordinate::new(HOME_LAT, HOME_LON, 0.0),
            amsl_alt: HOME_AMSL,
        });
    }
}

#[async_trait]
impl FlightStack for ScriptedStack {
    async fn wait_connected(&self) -> Result<(), AutopilotError> {
        Ok(())
    }

    fn telemetry(&self) -> broadcast::Receiver<TelemetryUpdate> {
        self.tx.subscribe()
    }

    async fn arm(&self) -> Result<(), AutopilotError> {
        self.record("arm");
        self.publish(TelemetryUpdate::Armed(true));
        Ok(())
    }

    async fn disarm(&self) -> Result<(), AutopilotError> {
        self.record("disarm");
        self.publish(TelemetryUpdate::Armed(false));
        Ok(())
    }

    async fn takeoff(&self, altitude_m: f64) -> Result<(), AutopilotError> {
        self.record("takeoff");
        if self.respond_position {
            self.publish(TelemetryUpdate::Position {
                coordinate: Coordinate::new(HOME_LAT, HOME_LON, altitude_m),
                amsl_alt: HOME_AMSL + altitude_m,
            });
        }
        Ok(())
    }

    async fn land(&self) -> Result<(), AutopilotError> {
        self.record("land");
        if self.respond_position {
            self.publish(TelemetryUpdate::Position {
                coordinate: Coordinate::new(HOME_LAT, HOME_LON, 0.0),
                amsl_alt: HOME_AMSL,
            });
            self.publish(TelemetryUpdate::Armed(false));
        }
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), AutopilotError> {
        self.record("return_to_launch");
        if self.respond_position {
            self.publish(TelemetryUpdate::Position {
                coordinate: Coordinate::new(HOME_LAT, HOME_LON, 0.0),
                amsl_alt: HOME_AMSL,
            });
            self.publish(TelemetryUpdate::Armed(false));
        }
        Ok(())
    }

    async fn goto(
        &self,
        lat: f64,
        lon: f64,
        amsl_alt: f64,
        _heading_deg: f64,
    ) -> Result<(), AutopilotError> {
        self.record("goto");
        if self.respond_position {
            self.publish(TelemetryUpdate::Position {
                coordinate: Coordinate::new(lat, lon, amsl_alt - HOME_AMSL),
                amsl_alt,
            });
        }
        Ok(())
    }

    async fn set_velocity(&self, ned: VectorNED, yaw_deg: f64) -> Result<(), AutopilotError> {
        self.record("set_velocity");
        *self.last_velocity.lock().unwrap() = Some((ned, yaw_deg));
        Ok(())
    }

    async fn stop_velocity(&self) -> Result<(), AutopilotError> {
        self.record("stop_velocity");
        Ok(())
    }

    async fn turn_to(&self, heading_deg: f64) -> Result<(), AutopilotError> {
        self.record("turn_to");
        self.publish(TelemetryUpdate::Attitude(Attitude {
            roll: 0.0,
            pitch: 0.0,
            yaw: heading_deg.to_radians(),
        }));
        Ok(())
    }

    async fn hold(&self) -> Result<(), AutopilotError> {
        self.record("hold");
        Ok(())
    }

    async fn set_max_speed(&self, _speed_m_s: f64) -> Result<(), AutopilotError> {
        self.record("set_max_speed");
        Ok(())
    }
}

async fn ready_vehicle(stack: &Arc<ScriptedStack>, kind: VehicleKind) -> Arc<Vehicle> {
    let vehicle = Vehicle::new(Arc::clone(stack) as Arc<dyn FlightStack>, kind, None);
    stack.publish_ready_state();
    sleep(Duration::from_millis(20)).await;
    vehicle
}

#[tokio::test(start_paused = true)]
async fn full_sortie_issues_commands_in_order() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    vehicle.set_armed(true).await.unwrap();
    vehicle.takeoff(30.0).await.unwrap();
    vehicle
        .goto(Coordinate::new(35.7280, -78.6950, 30.0), 2.0, None)
        .await
        .unwrap();
    vehicle.land().await.unwrap();

    assert_eq!(stack.calls(), vec!["arm", "takeoff", "goto", "land"]);
    assert!(!vehicle.armed().await);
}

#[tokio::test(start_paused = true)]
async fn arming_refused_when_not_armable() {
    let stack = ScriptedStack::new(true);
    let vehicle = Vehicle::new(Arc::clone(&stack) as Arc<dyn FlightStack>, VehicleKind::Drone, None);
    sleep(Duration::from_millis(20)).await;

    let err = vehicle.set_armed(true).await.unwrap_err();
    assert!(matches!(err, CommandError::Arm(_)));
    assert!(stack.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn takeoff_validates_target_altitude() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    let err = vehicle.takeoff(500.0).await.unwrap_err();
    assert!(matches!(err, CommandError::InvalidParameter(_)));
    assert!(stack.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_releases_the_readiness_slot() {
    let stack = ScriptedStack::new(false);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    let handle =
        vehicle.goto_nonblocking(Coordinate::new(35.7280, -78.6950, 30.0), 2.0, None);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(stack.calls(), vec!["goto"]);
    assert_eq!(handle.status(), CommandStatus::Running);
    assert!(!vehicle.done_moving().await);

    handle.cancel();
    handle.wait_done().await.unwrap();
    assert_eq!(handle.status(), CommandStatus::Cancelled);
    sleep(Duration::from_millis(100)).await;
    assert!(vehicle.done_moving().await);
}

#[tokio::test(start_paused = true)]
async fn completed_handle_ignores_late_cancellation() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    let handle =
        vehicle.goto_nonblocking(Coordinate::new(35.7280, -78.6950, 30.0), 2.0, None);
    handle.wait_done().await.unwrap();
    assert_eq!(handle.status(), CommandStatus::Completed);
    assert!((handle.progress() - 1.0).abs() < f64::EPSILON);

    handle.cancel();
    assert_eq!(handle.status(), CommandStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn rover_arrival_ignores_altitude_and_holds() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Rover).await;

    // Target carries an altitude the rover will never reach; 2D arrival
    // still counts.
    vehicle
        .goto(Coordinate::new(35.7280, -78.6950, 50.0), 2.0, None)
        .await
        .unwrap();
    assert_eq!(stack.calls(), vec!["goto", "hold"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_commands_are_issued_one_at_a_time() {
    let stack = ScriptedStack::new(false);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    let first =
        vehicle.goto_nonblocking(Coordinate::new(35.7280, -78.6950, 30.0), 2.0, None);
    let second =
        vehicle.goto_nonblocking(Coordinate::new(35.7285, -78.6940, 30.0), 2.0, None);
    sleep(Duration::from_millis(300)).await;

    // The second command must not reach the autopilot while the first is
    // still in flight.
    assert_eq!(stack.calls(), vec!["goto"]);
    assert_eq!(second.status(), CommandStatus::Running);

    first.cancel();
    first.wait_done().await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(stack.calls(), vec!["goto", "goto"]);
    second.cancel();
}

#[tokio::test(start_paused = true)]
async fn heading_change_without_lock_leaves_navigation_free() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    vehicle.set_heading(Some(180.0), false).await.unwrap();
    assert_eq!(vehicle.locked_heading(), None);

    let handle = vehicle.set_heading_nonblocking(90.0, true);
    handle.wait_done().await.unwrap();
    assert_eq!(vehicle.locked_heading(), Some(90.0));
}

#[tokio::test(start_paused = true)]
async fn takeoff_tolerance_fraction_is_validated() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    let err = vehicle.takeoff_with_tolerance(30.0, 1.5).await.unwrap_err();
    assert!(matches!(err, CommandError::InvalidParameter(_)));
    assert!(stack.calls().is_empty());

    vehicle.takeoff_with_tolerance(30.0, 0.5).await.unwrap();
    assert_eq!(stack.calls(), vec!["arm", "takeoff"]);
}

#[tokio::test(start_paused = true)]
async fn heading_lock_set_and_cleared() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    vehicle.set_heading(Some(450.0), true).await.unwrap();
    assert_eq!(vehicle.locked_heading(), Some(90.0));
    assert_eq!(stack.calls(), vec!["turn_to"]);

    vehicle.set_heading(None, false).await.unwrap();
    assert_eq!(vehicle.locked_heading(), None);
    assert_eq!(stack.calls(), vec!["turn_to"]);
}

#[tokio::test(start_paused = true)]
async fn body_frame_velocity_rotates_into_world_frame() {
    let stack = ScriptedStack::new(true);
    let vehicle = ready_vehicle(&stack, VehicleKind::Drone).await;

    vehicle.set_heading(Some(90.0), true).await.unwrap();
    vehicle
        .set_velocity(VectorNED::new(1.0, 0.0, 0.0), VelocityFrame::Body, None, None)
        .await
        .unwrap();

    let (world, yaw) = stack.last_velocity.lock().unwrap().unwrap();
    assert!(world.north().abs() < 1e-9);
    assert!((world.east() - 1.0).abs() < 1e-9);
    assert!((yaw - 90.0).abs() < 1e-9);

    vehicle.stop_velocity().await.unwrap();
    assert!(stack.calls().contains(&"stop_velocity"));
}
