//! Drone-specific commands: takeoff, landing, return to launch, heading and
//! velocity control. All blocking commands pass through the readiness
//! predicate installed by their predecessor before committing.

use super::core::{ProgressFn, ReadyFn, Vehicle, VehicleKind};
use super::handle::CommandHandle;
use super::state::VehicleState;
use super::telemetry::VelocityFrame;
use crate::error::{AutopilotError, CommandError};
use crate::geo::{Coordinate, VectorNED};
use crate::safety::validation::{
    validate_altitude, validate_speed, validate_tolerance, validate_tolerance_fraction,
};
use crate::safety::{heading_difference, normalize_heading};
use crate::warn;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

const VELOCITY_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

impl Vehicle {
    /// Takes off to `target_alt_m` meters above home and blocks until the
    /// vehicle reports at least the default tolerance fraction of it, then
    /// holds briefly to stabilize. Arms first if necessary and enforces the
    /// minimum arm-to-takeoff delay.
    pub async fn takeoff(&self, target_alt_m: f64) -> Result<(), CommandError> {
        self.takeoff_tracked(target_alt_m, Self::DEFAULT_TAKEOFF_ALTITUDE_TOLERANCE, None)
            .await
    }

    /// [`Vehicle::takeoff`] with an explicit tolerance: the climb counts as
    /// complete once `tolerance_fraction * target_alt_m` is reached.
    pub async fn takeoff_with_tolerance(
        &self,
        target_alt_m: f64,
        tolerance_fraction: f64,
    ) -> Result<(), CommandError> {
        self.takeoff_tracked(target_alt_m, tolerance_fraction, None).await
    }

    pub fn takeoff_nonblocking(self: &Arc<Self>, target_alt_m: f64) -> CommandHandle {
        self.spawn_tracked(move |vehicle, handle| async move {
            vehicle
                .takeoff_tracked(
                    target_alt_m,
                    Self::DEFAULT_TAKEOFF_ALTITUDE_TOLERANCE,
                    Some(handle),
                )
                .await
        })
    }

    pub(crate) async fn takeoff_tracked(
        &self,
        target_alt_m: f64,
        tolerance_fraction: f64,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        if self.kind() == VehicleKind::Rover {
            return Err(CommandError::Takeoff {
                target_alt: target_alt_m,
                source: AutopilotError::new("takeoff", "not supported by this vehicle"),
            });
        }
        let target_alt = validate_altitude(target_alt_m)?;
        let tolerance_fraction = validate_tolerance_fraction(tolerance_fraction)?;
        let issue = self.claim_issue_slot().await?;
        if !self.armed().await {
            self.set_armed(true).await?;
        }
        // The autopilot may reject a takeoff issued immediately after arming.
        if let Some(arm_time) = self.state().await.last_arm_time() {
            let since_arm = arm_time.elapsed();
            if since_arm < Self::MIN_ARM_TO_TAKEOFF_DELAY {
                sleep(Self::MIN_ARM_TO_TAKEOFF_DELAY - since_arm).await;
            }
        }
        self.stamp_mission_start().await;
        self.stack()
            .takeoff(target_alt)
            .await
            .map_err(|source| CommandError::Takeoff { target_alt, source })?;
        let threshold = target_alt * tolerance_fraction;
        self.install_ready(Box::new(move |s: &VehicleState| s.position().alt() >= threshold))
            .await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn =
                Box::new(move |s: &VehicleState| s.position().alt() / target_alt);
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "takeoff", progress).await?;
        sleep(Self::POST_TAKEOFF_STABILIZATION).await;
        Ok(())
    }

    /// Lands at the current position and blocks until disarmed.
    pub async fn land(&self) -> Result<(), CommandError> {
        self.land_tracked(None).await
    }

    pub fn land_nonblocking(self: &Arc<Self>) -> CommandHandle {
        self.spawn_tracked(move |vehicle, handle| async move {
            vehicle.land_tracked(Some(handle)).await
        })
    }

    pub(crate) async fn land_tracked(
        &self,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        let issue = self.claim_issue_slot().await?;
        let initial_alt = self.position().await.alt().max(1.0);
        self.stack().land().await.map_err(CommandError::Landing)?;
        self.install_ready(Box::new(|s: &VehicleState| !s.armed()) as ReadyFn).await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn =
                Box::new(move |s: &VehicleState| 1.0 - s.position().alt() / initial_alt);
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "land", progress).await
    }

    /// Returns to the launch point, lands, and blocks until disarmed.
    pub async fn return_to_launch(&self) -> Result<(), CommandError> {
        self.rtl_tracked(None).await
    }

    pub fn return_to_launch_nonblocking(self: &Arc<Self>) -> CommandHandle {
        self.spawn_tracked(
            move |vehicle, handle| async move { vehicle.rtl_tracked(Some(handle)).await },
        )
    }

    pub(crate) async fn rtl_tracked(
        &self,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        let issue = self.claim_issue_slot().await?;
        let home = self.home().await;
        let initial_distance = match home {
            Some(home) => self.position().await.distance(&home).max(1.0),
            None => 1.0,
        };
        self.stack().return_to_launch().await.map_err(CommandError::Rtl)?;
        self.install_ready(Box::new(|s: &VehicleState| !s.armed()) as ReadyFn).await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn = Box::new(move |s: &VehicleState| match home {
                Some(home) => 1.0 - s.position().distance(&home) / initial_distance,
                None => 0.0,
            });
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "return_to_launch", progress).await
    }

    /// Turns in place to `heading_deg` and blocks until within tolerance.
    /// With `lock_in`, subsequent navigation holds this heading instead of
    /// facing the direction of travel. `None` clears any lock without
    /// issuing a command.
    pub async fn set_heading(
        &self,
        heading_deg: Option<f64>,
        lock_in: bool,
    ) -> Result<(), CommandError> {
        let Some(heading) = heading_deg else {
            self.set_locked_heading(None);
            return Ok(());
        };
        self.set_heading_tracked(heading, lock_in, None).await
    }

    pub fn set_heading_nonblocking(
        self: &Arc<Self>,
        heading_deg: f64,
        lock_in: bool,
    ) -> CommandHandle {
        self.spawn_tracked(move |vehicle, handle| async move {
            vehicle.set_heading_tracked(heading_deg, lock_in, Some(handle)).await
        })
    }

    pub(crate) async fn set_heading_tracked(
        &self,
        heading_deg: f64,
        lock_in: bool,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        let heading = normalize_heading(heading_deg);
        let issue = self.claim_issue_slot().await?;
        self.stack()
            .turn_to(heading)
            .await
            .map_err(|source| CommandError::Heading { heading_deg: heading, source })?;
        self.install_ready(Box::new(move |s: &VehicleState| {
            heading_difference(s.heading(), heading) <= Self::HEADING_TOLERANCE_DEG
        }))
        .await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn = Box::new(move |s: &VehicleState| {
                1.0 - heading_difference(s.heading(), heading) / 180.0
            });
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "set_heading", progress).await?;
        if lock_in {
            self.set_locked_heading(Some(heading));
        }
        Ok(())
    }

    /// Commands a velocity, optionally body-framed (rotated into the world
    /// frame using the current heading). The command is refreshed in the
    /// background so the autopilot's offboard watchdog stays fed; with a
    /// `duration` the vehicle is stopped once it elapses, otherwise the hold
    /// runs until the next velocity command or [`Vehicle::stop_velocity`].
    pub async fn set_velocity(
        self: &Arc<Self>,
        velocity: VectorNED,
        frame: VelocityFrame,
        yaw_deg: Option<f64>,
        duration: Option<Duration>,
    ) -> Result<(), CommandError> {
        let _issue = self.claim_issue_slot().await?;
        let heading = self.heading().await;
        let world = match frame {
            VelocityFrame::Global => velocity,
            VelocityFrame::Body => velocity.rotate_by_angle(-heading),
        };
        let yaw = yaw_deg.map_or_else(
            || self.locked_heading().unwrap_or(heading),
            normalize_heading,
        );
        self.consult_velocity_safety(&world).await;
        self.stack().set_velocity(world, yaw).await.map_err(CommandError::Velocity)?;

        let token = CancellationToken::new();
        self.replace_velocity_hold(Some(token.clone()));
        let vehicle = Arc::clone(self);
        tokio::spawn(async move {
            let deadline = duration.map(|d| tokio::time::Instant::now() + d);
            loop {
                let refresh = async {
                    sleep(VELOCITY_REFRESH_INTERVAL).await;
                    if let Err(e) = vehicle.stack().set_velocity(world, yaw).await {
                        warn!("velocity refresh failed: {e}");
                    }
                };
                match deadline {
                    Some(deadline) => tokio::select! {
                        () = token.cancelled() => return,
                        () = tokio::time::sleep_until(deadline) => {
                            if let Err(e) = vehicle.stack().stop_velocity().await {
                                warn!("stopping after velocity hold failed: {e}");
                            }
                            return;
                        }
                        () = refresh => {}
                    },
                    None => tokio::select! {
                        () = token.cancelled() => return,
                        () = refresh => {}
                    },
                }
            }
        });
        Ok(())
    }

    /// Cancels any velocity hold and reverts control to the autopilot.
    pub async fn stop_velocity(&self) -> Result<(), CommandError> {
        self.replace_velocity_hold(None);
        self.stack().stop_velocity().await.map_err(CommandError::Velocity)
    }

    /// Caps the autopilot's cruise speed for subsequent navigation.
    pub async fn set_max_speed(&self, speed_m_s: f64) -> Result<(), CommandError> {
        let speed = validate_speed(speed_m_s)?;
        self.stack()
            .set_max_speed(speed)
            .await
            .map_err(CommandError::Velocity)
    }

    pub(crate) async fn goto_drone(
        &self,
        target: Coordinate,
        tolerance: f64,
        target_heading: Option<f64>,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        let tolerance = validate_tolerance(tolerance)?;
        let issue = self.claim_issue_slot().await?;
        self.consult_safety(&target).await;
        let (origin, home_amsl) = {
            let snapshot = self.state().await;
            (snapshot.position(), snapshot.home_amsl())
        };
        let initial_distance = origin.distance(&target).max(tolerance);
        let heading = match target_heading.or_else(|| self.locked_heading()) {
            Some(h) => normalize_heading(h),
            None => origin.bearing(&target),
        };
        self.stack()
            .goto(target.lat(), target.lon(), home_amsl + target.alt(), heading)
            .await
            .map_err(|source| CommandError::Navigation { target, source })?;
        self.install_ready(Box::new(move |s: &VehicleState| {
            s.position().distance(&target) < tolerance
        }))
        .await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn = Box::new(move |s: &VehicleState| {
                1.0 - s.position().distance(&target) / initial_distance
            });
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "goto", progress).await
    }

    async fn consult_velocity_safety(&self, world: &VectorNED) {
        let speed = world.hypot(false);
        if let Err(e) = validate_speed(speed) {
            warn!("safety: {e}");
        }
    }
}
