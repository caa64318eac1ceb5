//! Outbound room events and their addressing.

use crate::action::{ActionId, ActionKind};
use crate::grid::{BuildingKind, Coord};
use crate::ledger::PoolSnapshot;
use crate::validator::RejectionReason;
use civitas_env::{Audience, EnvError, EventEnvelope, PlayerId, RoomCode};
use serde::{Deserialize, Serialize};

/// Public view of a player, as broadcast on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub is_host: bool,
}

/// Events emitted by a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    ActionExecuted {
        action_id: ActionId,
        kind: ActionKind,
        actor_id: PlayerId,
        coordinate: Option<Coord>,
        building_kind: Option<BuildingKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterparty_id: Option<PlayerId>,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    ActionRejected {
        action_id: ActionId,
        reason_code: RejectionReason,
    },

    #[serde(rename_all = "camelCase")]
    TurnChanged {
        turn_index: usize,
        turn_order: Vec<PlayerId>,
    },

    #[serde(rename_all = "camelCase")]
    PlayerJoined { player: PlayerInfo },

    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },

    #[serde(rename_all = "camelCase")]
    HostChanged { player_id: PlayerId },

    #[serde(rename_all = "camelCase")]
    ResourcesUpdated {
        player_id: PlayerId,
        resources: PoolSnapshot,
    },

    #[serde(rename_all = "camelCase")]
    OperabilityChanged {
        inoperable: Vec<Coord>,
        restored: Vec<Coord>,
    },
}

impl OutboundEvent {
    /// Event name, identical to the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::ActionExecuted { .. } => "action_executed",
            OutboundEvent::ActionRejected { .. } => "action_rejected",
            OutboundEvent::TurnChanged { .. } => "turn_changed",
            OutboundEvent::PlayerJoined { .. } => "player_joined",
            OutboundEvent::PlayerLeft { .. } => "player_left",
            OutboundEvent::HostChanged { .. } => "host_changed",
            OutboundEvent::ResourcesUpdated { .. } => "resources_updated",
            OutboundEvent::OperabilityChanged { .. } => "operability_changed",
        }
    }
}

/// An event plus who should receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: OutboundEvent,
}

impl Delivery {
    pub fn room(event: OutboundEvent) -> Self {
        Self {
            audience: Audience::Room,
            event,
        }
    }

    pub fn player(player: PlayerId, event: OutboundEvent) -> Self {
        Self {
            audience: Audience::Player(player),
            event,
        }
    }

    /// Encodes into a transport envelope (JSON payload).
    pub fn into_envelope(self, room: &RoomCode, timestamp_ms: u64) -> Result<EventEnvelope, EnvError> {
        let payload = serde_json::to_vec(&self.event).map_err(EnvError::serialization)?;
        Ok(EventEnvelope::new(
            room.clone(),
            self.audience,
            self.event.name(),
            payload,
            timestamp_ms,
        ))
    }

    /// Decodes the event carried by an envelope produced by [`Delivery::into_envelope`].
    pub fn decode(envelope: &EventEnvelope) -> Result<OutboundEvent, EnvError> {
        serde_json::from_slice(&envelope.payload).map_err(EnvError::serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let event = OutboundEvent::ActionRejected {
            action_id: ActionId(7),
            reason_code: RejectionReason::CoordinateLocked,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "action_rejected");
        assert_eq!(json["actionId"], 7);
        assert_eq!(json["reasonCode"], "coordinate_locked");
        assert_eq!(event.name(), "action_rejected");
    }

    #[test]
    fn test_turn_changed_shape() {
        let p = PlayerId::from_seed(1);
        let event = OutboundEvent::TurnChanged { turn_index: 0, turn_order: vec![p] };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["turnIndex"], 0);
        assert_eq!(json["turnOrder"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_envelope_roundtrip_keeps_audience() {
        let p = PlayerId::from_seed(1);
        let delivery = Delivery::player(p, OutboundEvent::HostChanged { player_id: p });
        let envelope = delivery.clone().into_envelope(&RoomCode::new("ABCD"), 99).unwrap();

        assert_eq!(envelope.event, "host_changed");
        assert_eq!(envelope.audience, Audience::Player(p));
        assert_eq!(envelope.timestamp_ms, 99);
        assert_eq!(Delivery::decode(&envelope).unwrap(), delivery.event);
    }
}
