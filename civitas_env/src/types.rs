//! Common types for the Civitas environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random PlayerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a PlayerId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic PlayerId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Short human-shareable code naming a room.
///
/// Codes are normalised to upper case on every path in, including serde.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Creates a room code, normalising to upper case.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Who an outbound envelope is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "player", rename_all = "snake_case")]
pub enum Audience {
    /// Every subscriber of the room
    Room,
    /// A single player (rejections, private resource updates)
    Player(PlayerId),
}

/// Envelope for events leaving a room.
///
/// This is a transport-layer wrapper - the event body is opaque bytes
/// (JSON-encoded by the engine) that the client decodes by `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Room the event belongs to
    pub room: RoomCode,

    /// Intended recipients
    pub audience: Audience,

    /// Event name (e.g. `action_executed`)
    pub event: String,

    /// Encoded event body
    pub payload: Vec<u8>,

    /// Timestamp when the event was produced (engine wall clock, ms)
    pub timestamp_ms: u64,
}

impl EventEnvelope {
    /// Creates a new envelope.
    pub fn new(
        room: RoomCode,
        audience: Audience,
        event: impl Into<String>,
        payload: Vec<u8>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            room,
            audience,
            event: event.into(),
            payload,
            timestamp_ms,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the given player should receive this envelope.
    pub fn is_visible_to(&self, player: PlayerId) -> bool {
        match self.audience {
            Audience::Room => true,
            Audience::Player(target) => target == player,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_from_seed_is_deterministic() {
        assert_eq!(PlayerId::from_seed(7), PlayerId::from_seed(7));
        assert_ne!(PlayerId::from_seed(7), PlayerId::from_seed(8));
    }

    #[test]
    fn test_room_code_normalises() {
        assert_eq!(RoomCode::new(" abcd "), RoomCode::new("ABCD"));
        assert_eq!(RoomCode::from("xy12").as_str(), "XY12");

        let parsed: RoomCode = serde_json::from_str("\"lobby\"").unwrap();
        assert_eq!(parsed.as_str(), "LOBBY");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"LOBBY\"");
    }

    #[test]
    fn test_envelope_visibility() {
        let a = PlayerId::from_seed(1);
        let b = PlayerId::from_seed(2);
        let room = RoomCode::new("R1");

        let public = EventEnvelope::new(room.clone(), Audience::Room, "turn_changed", vec![], 0);
        assert!(public.is_visible_to(a));
        assert!(public.is_visible_to(b));

        let private = EventEnvelope::new(room, Audience::Player(a), "action_rejected", vec![], 0);
        assert!(private.is_visible_to(a));
        assert!(!private.is_visible_to(b));
    }
}
