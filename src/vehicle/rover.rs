//! Rover navigation. Ground vehicles measure arrival in 2D and hold
//! position after reaching a waypoint instead of loitering.

use super::core::{ProgressFn, Vehicle};
use super::handle::CommandHandle;
use super::state::VehicleState;
use crate::error::CommandError;
use crate::geo::Coordinate;
use crate::safety::validation::validate_tolerance;
use crate::warn;

impl Vehicle {
    pub(crate) async fn goto_rover(
        &self,
        target: Coordinate,
        tolerance: f64,
        handle: Option<CommandHandle>,
    ) -> Result<(), CommandError> {
        let tolerance = validate_tolerance(tolerance)?;
        let issue = self.claim_issue_slot().await?;
        self.consult_safety(&target).await;
        let (origin, home_amsl) = {
            let snapshot = self.state().await;
            (snapshot.position(), snapshot.home_amsl())
        };
        let initial_distance = origin.ground_distance(&target).max(tolerance);
        let heading = origin.bearing(&target);
        self.stack()
            .goto(target.lat(), target.lon(), home_amsl, heading)
            .await
            .map_err(|source| CommandError::Navigation { target, source })?;
        self.install_ready(Box::new(move |s: &VehicleState| {
            s.position().ground_distance(&target) < tolerance
        }))
        .await;
        drop(issue);
        let progress = handle.map(|h| {
            let compute: ProgressFn = Box::new(move |s: &VehicleState| {
                1.0 - s.position().ground_distance(&target) / initial_distance
            });
            (h, compute)
        });
        self.wait_ready(Self::DEFAULT_COMMAND_TIMEOUT, "goto", progress).await?;
        // Without an explicit hold some autopilots keep creeping toward the
        // setpoint after the tolerance check passes.
        if let Err(e) = self.stack().hold().await {
            warn!("hold after waypoint arrival failed: {e}");
        }
        Ok(())
    }
}
