//! Player actions - the wire submission and the closed, typed action it decodes to.
//!
//! Clients send a loosely shaped [`ActionSubmission`]. It is decoded once, at
//! the room boundary, into an [`Action`] whose [`ActionPayload`] is a closed
//! enum; validation and execution match on it exhaustively. Anything that
//! fails decoding is a [`MalformedAction`] and is dropped with a log line.

use crate::costs::BuildCostTable;
use crate::grid::{BuildingKind, CityGrid, Coord};
use crate::resources::ResourceBundle;
use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Room-local, monotonically assigned action identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Action kinds, ordered by service priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Place,
    Remove,
    AdvanceTurn,
    Trade,
    ClaimTerritory,
}

impl ActionKind {
    /// Fixed priority; lower values are served first.
    pub fn priority(self) -> u8 {
        match self {
            ActionKind::Place => 0,
            ActionKind::Remove => 1,
            ActionKind::AdvanceTurn => 2,
            ActionKind::Trade => 3,
            ActionKind::ClaimTerritory => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Place => "place",
            ActionKind::Remove => "remove",
            ActionKind::AdvanceTurn => "advance_turn",
            ActionKind::Trade => "trade",
            ActionKind::ClaimTerritory => "claim_territory",
        }
    }

    /// Kinds gated by coordinate locks.
    pub fn is_spatial(self) -> bool {
        matches!(self, ActionKind::Place | ActionKind::Remove)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = MalformedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "place" => Ok(ActionKind::Place),
            "remove" => Ok(ActionKind::Remove),
            "advance_turn" | "advanceturn" | "end_turn" => Ok(ActionKind::AdvanceTurn),
            "trade" => Ok(ActionKind::Trade),
            "claim_territory" | "claimterritory" | "claim" => Ok(ActionKind::ClaimTerritory),
            _ => Err(MalformedAction::UnknownKind(s.to_string())),
        }
    }
}

/// Kind-specific action data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Place {
        coord: Coord,
        building: BuildingKind,
    },
    Remove {
        coord: Coord,
    },
    AdvanceTurn,
    Trade {
        counterparty: PlayerId,
        offer: ResourceBundle,
        request: ResourceBundle,
    },
    ClaimTerritory {
        coord: Coord,
    },
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::Place { .. } => ActionKind::Place,
            ActionPayload::Remove { .. } => ActionKind::Remove,
            ActionPayload::AdvanceTurn => ActionKind::AdvanceTurn,
            ActionPayload::Trade { .. } => ActionKind::Trade,
            ActionPayload::ClaimTerritory { .. } => ActionKind::ClaimTerritory,
        }
    }

    pub fn coord(&self) -> Option<Coord> {
        match self {
            ActionPayload::Place { coord, .. }
            | ActionPayload::Remove { coord }
            | ActionPayload::ClaimTerritory { coord } => Some(*coord),
            ActionPayload::AdvanceTurn | ActionPayload::Trade { .. } => None,
        }
    }

    pub fn building(&self) -> Option<BuildingKind> {
        match self {
            ActionPayload::Place { building, .. } => Some(*building),
            _ => None,
        }
    }
}

/// A decoded action waiting in (or moving through) a room's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    pub actor: PlayerId,
    pub payload: ActionPayload,
    /// Client-supplied submission timestamp (ms), echoed in events
    pub timestamp: u64,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    pub fn priority(&self) -> u8 {
        self.kind().priority()
    }
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Action as submitted by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSubmission {
    pub kind: String,
    pub actor_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<ResourceBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ResourceBundle>,
    #[serde(default)]
    pub timestamp: u64,
}

/// Why a submission could not be turned into an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedAction {
    #[error("Unknown action kind: {0}")]
    UnknownKind(String),

    #[error("{kind} is missing field `{field}`")]
    MissingField { kind: ActionKind, field: &'static str },

    #[error("Coordinate {0} is outside the grid")]
    OutOfBounds(Coord),

    #[error("Unknown building kind: {0}")]
    UnknownBuilding(String),

    #[error("{0} cannot be placed")]
    NotBuildable(BuildingKind),

    #[error("Trade counterparty must be another player")]
    SelfTrade,

    #[error("Trade moves no resources")]
    EmptyTrade,

    #[error("Player {0} is not in this room")]
    UnknownCounterparty(PlayerId),
}

impl ActionSubmission {
    /// Convenience constructor for a placement.
    pub fn place(actor: PlayerId, coord: Coord, building: BuildingKind) -> Self {
        Self {
            kind: ActionKind::Place.name().to_string(),
            actor_id: actor,
            coordinate: Some(coord),
            building_kind: Some(building.name().to_string()),
            ..Default::default()
        }
    }

    pub fn remove(actor: PlayerId, coord: Coord) -> Self {
        Self {
            kind: ActionKind::Remove.name().to_string(),
            actor_id: actor,
            coordinate: Some(coord),
            ..Default::default()
        }
    }

    pub fn advance_turn(actor: PlayerId) -> Self {
        Self {
            kind: ActionKind::AdvanceTurn.name().to_string(),
            actor_id: actor,
            ..Default::default()
        }
    }

    pub fn trade(actor: PlayerId, counterparty: PlayerId, offer: ResourceBundle, request: ResourceBundle) -> Self {
        Self {
            kind: ActionKind::Trade.name().to_string(),
            actor_id: actor,
            counterparty_id: Some(counterparty),
            offer: Some(offer),
            request: Some(request),
            ..Default::default()
        }
    }

    pub fn claim(actor: PlayerId, coord: Coord) -> Self {
        Self {
            kind: ActionKind::ClaimTerritory.name().to_string(),
            actor_id: actor,
            coordinate: Some(coord),
            ..Default::default()
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Decodes into a typed payload, checking shape and grid bounds.
    ///
    /// Roster membership (actor, counterparty) is the room's concern.
    pub fn decode(&self, grid: &CityGrid, costs: &BuildCostTable) -> Result<ActionPayload, MalformedAction> {
        let kind: ActionKind = self.kind.parse()?;

        let coord = || -> Result<Coord, MalformedAction> {
            let coord = self.coordinate.ok_or(MalformedAction::MissingField { kind, field: "coordinate" })?;
            if grid.in_bounds(coord) {
                Ok(coord)
            } else {
                Err(MalformedAction::OutOfBounds(coord))
            }
        };

        match kind {
            ActionKind::Place => {
                let coord = coord()?;
                let name = self
                    .building_kind
                    .as_deref()
                    .ok_or(MalformedAction::MissingField { kind, field: "buildingKind" })?;
                let building: BuildingKind = name
                    .parse()
                    .map_err(|_| MalformedAction::UnknownBuilding(name.to_string()))?;
                if !costs.is_buildable(building) {
                    return Err(MalformedAction::NotBuildable(building));
                }
                Ok(ActionPayload::Place { coord, building })
            }
            ActionKind::Remove => Ok(ActionPayload::Remove { coord: coord()? }),
            ActionKind::AdvanceTurn => Ok(ActionPayload::AdvanceTurn),
            ActionKind::Trade => {
                let counterparty = self
                    .counterparty_id
                    .ok_or(MalformedAction::MissingField { kind, field: "counterpartyId" })?;
                if counterparty == self.actor_id {
                    return Err(MalformedAction::SelfTrade);
                }
                let offer = self.offer.unwrap_or_default();
                let request = self.request.unwrap_or_default();
                if offer.is_empty() && request.is_empty() {
                    return Err(MalformedAction::EmptyTrade);
                }
                Ok(ActionPayload::Trade { counterparty, offer, request })
            }
            ActionKind::ClaimTerritory => Ok(ActionPayload::ClaimTerritory { coord: coord()? }),
        }
    }
}
