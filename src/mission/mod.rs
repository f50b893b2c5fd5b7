//! Reader for QGroundControl `.plan` mission files: extracts the ordered
//! command list a script can replay against a vehicle.

use crate::geo::Coordinate;
use crate::warn;
use serde::Deserialize;
use thiserror::Error;

/// MAV_CMD ids understood by the reader.
const CMD_NAV_WAYPOINT: u32 = 16;
const CMD_NAV_RETURN_TO_LAUNCH: u32 = 20;
const CMD_NAV_LAND: u32 = 21;
const CMD_NAV_TAKEOFF: u32 = 22;
const CMD_DO_CHANGE_SPEED: u32 = 178;

/// One executable step of a translated plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanCommand {
    Takeoff { altitude_m: f64 },
    Waypoint { target: Coordinate },
    ChangeSpeed { speed_m_s: f64 },
    ReturnToLaunch,
    Land,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("could not read plan file")]
    Io(#[from] std::io::Error),
    #[error("plan file is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("plan item {index} (command {command}) is missing parameters")]
    MalformedItem { index: usize, command: u32 },
}

/// A parsed `.plan` file.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionPlan {
    pub home: Option<Coordinate>,
    pub commands: Vec<PlanCommand>,
}

impl MissionPlan {
    /// Just the navigation targets, in order.
    pub fn waypoints(&self) -> Vec<Coordinate> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                PlanCommand::Waypoint { target } => Some(*target),
                _ => None,
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct PlanFile {
    mission: PlanMission,
}

#[derive(Deserialize)]
struct PlanMission {
    items: Vec<PlanItem>,
    #[serde(default, rename = "plannedHomePosition")]
    planned_home_position: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct PlanItem {
    command: u32,
    #[serde(default)]
    params: Vec<Option<f64>>,
}

impl PlanItem {
    fn param(&self, index: usize) -> Option<f64> {
        self.params.get(index).copied().flatten()
    }
}

/// Reads a `.plan` file. Unsupported commands are skipped with a warning so
/// plans authored with extra camera or gimbal actions still fly.
pub fn read_plan(path: &str) -> Result<MissionPlan, PlanError> {
    let body = std::fs::read_to_string(path)?;
    parse_plan(&body)
}

fn parse_plan(body: &str) -> Result<MissionPlan, PlanError> {
    let file: PlanFile = serde_json::from_str(body)?;
    let home = file.mission.planned_home_position.as_deref().and_then(|p| match p {
        [lat, lon, alt, ..] => Some(Coordinate::new(*lat, *lon, *alt)),
        _ => None,
    });
    let mut commands = Vec::new();
    for (index, item) in file.mission.items.iter().enumerate() {
        match item.command {
            CMD_NAV_TAKEOFF => {
                let altitude_m = item
                    .param(6)
                    .ok_or(PlanError::MalformedItem { index, command: item.command })?;
                commands.push(PlanCommand::Takeoff { altitude_m });
            }
            CMD_NAV_WAYPOINT => {
                let (Some(lat), Some(lon), Some(alt)) =
                    (item.param(4), item.param(5), item.param(6))
                else {
                    return Err(PlanError::MalformedItem { index, command: item.command });
                };
                commands.push(PlanCommand::Waypoint { target: Coordinate::new(lat, lon, alt) });
            }
            CMD_DO_CHANGE_SPEED => {
                let speed_m_s = item
                    .param(1)
                    .ok_or(PlanError::MalformedItem { index, command: item.command })?;
                commands.push(PlanCommand::ChangeSpeed { speed_m_s });
            }
            CMD_NAV_RETURN_TO_LAUNCH => commands.push(PlanCommand::ReturnToLaunch),
            CMD_NAV_LAND => commands.push(PlanCommand::Land),
            other => warn!("Skipping unsupported plan command {other} at item {index}"),
        }
    }
    Ok(MissionPlan { home, commands })
}
