//! Action validator - the ordered gate every queued action passes before it runs.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Turn ownership (skipped for AdvanceTurn)
//! 2. Lock conflict (Place/Remove only)
//! 3. Affordability (Place only)
//! 4. Target sanity (Place over or Remove of another player's building,
//!    Remove on empty ground, Claim on an owned cell)
//!
//! Validation never mutates state. A failure is terminal for the action.

use crate::action::{Action, ActionPayload};
use crate::costs::BuildCostTable;
use crate::grid::{BuildingKind, CityGrid, Coord};
use crate::ledger::ResourceLedger;
use crate::locks::CoordinateLockTable;
use crate::turn::TurnController;
use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reason code carried by `action_rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NotYourTurn,
    CoordinateLocked,
    InsufficientResources,
    /// Trade/Claim could not be covered at execution time
    StaleAffordability,
    InvalidTarget,
}

impl RejectionReason {
    /// Stable wire code.
    pub fn code(self) -> &'static str {
        match self {
            RejectionReason::NotYourTurn => "not_your_turn",
            RejectionReason::CoordinateLocked => "coordinate_locked",
            RejectionReason::InsufficientResources => "insufficient_resources",
            RejectionReason::StaleAffordability => "stale_affordability",
            RejectionReason::InvalidTarget => "invalid_target",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Read-only view of the room state the validator needs.
pub struct ValidationView<'a> {
    pub turns: &'a TurnController,
    pub locks: &'a CoordinateLockTable,
    pub ledger: &'a ResourceLedger,
    pub costs: &'a BuildCostTable,
    pub grid: &'a CityGrid,
    pub now: Duration,
}

pub struct ActionValidator;

impl ActionValidator {
    pub fn validate(action: &Action, view: &ValidationView<'_>) -> Result<(), RejectionReason> {
        Self::check_turn(action, view)?;
        Self::check_lock(action, view)?;
        Self::check_affordability(action, view)?;
        Self::check_target(action, view)
    }

    fn check_turn(action: &Action, view: &ValidationView<'_>) -> Result<(), RejectionReason> {
        if matches!(action.payload, ActionPayload::AdvanceTurn) {
            return Ok(());
        }
        if view.turns.current() == Some(action.actor) {
            Ok(())
        } else {
            Err(RejectionReason::NotYourTurn)
        }
    }

    fn check_lock(action: &Action, view: &ValidationView<'_>) -> Result<(), RejectionReason> {
        let coord = match &action.payload {
            ActionPayload::Place { coord, .. } | ActionPayload::Remove { coord } => *coord,
            _ => return Ok(()),
        };
        if view.locks.conflicts(coord, action.actor, view.now) {
            Err(RejectionReason::CoordinateLocked)
        } else {
            Ok(())
        }
    }

    fn check_affordability(action: &Action, view: &ValidationView<'_>) -> Result<(), RejectionReason> {
        let ActionPayload::Place { building, .. } = &action.payload else {
            return Ok(());
        };
        let Some(cost) = view.costs.cost_of(*building) else {
            return Err(RejectionReason::InvalidTarget);
        };
        let affordable = view
            .ledger
            .pool(action.actor)
            .is_some_and(|pool| pool.can_afford(cost));
        if affordable {
            Ok(())
        } else {
            Err(RejectionReason::InsufficientResources)
        }
    }

    fn check_target(action: &Action, view: &ValidationView<'_>) -> Result<(), RejectionReason> {
        match &action.payload {
            ActionPayload::Place { coord, .. } if Self::built_by_other(view.grid, *coord, action.actor) => {
                Err(RejectionReason::InvalidTarget)
            }
            ActionPayload::Remove { coord } if !Self::removable(view.grid, *coord, action.actor) => {
                Err(RejectionReason::InvalidTarget)
            }
            ActionPayload::ClaimTerritory { coord } => {
                let owned = view
                    .grid
                    .get(*coord)
                    .is_some_and(|cell| cell.owner == Some(action.actor));
                if owned {
                    Err(RejectionReason::InvalidTarget)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// A player-placed building that belongs to someone other than `actor`.
    fn built_by_other(grid: &CityGrid, coord: Coord, actor: PlayerId) -> bool {
        grid.get(coord)
            .is_some_and(|cell| cell.player_placed && cell.owner.is_some_and(|owner| owner != actor))
    }

    /// Something on the cell can be taken away by `actor`: their own building,
    /// clearable terrain, or a structure the terrain generator put there.
    fn removable(grid: &CityGrid, coord: Coord, actor: PlayerId) -> bool {
        match grid.get(coord) {
            Some(cell) if cell.player_placed => !Self::built_by_other(grid, coord, actor),
            Some(cell) => !matches!(cell.kind, BuildingKind::Grass | BuildingKind::Water),
            None => false,
        }
    }
}
