//! JSON-lines protocol spoken on stdin/stdout.
//!
//! Each stdin line is a JSON object with a `"cmd"` discriminator. Each stdout
//! line is a JSON object with a `"type"` discriminator: either the reply to a
//! command or an `event` pushed by a room.

use civitas_core::{ActionSubmission, BuildingKind, Delivery, OutboundEvent, RoomSnapshot, RoomStatus};
use civitas_env::{Audience, EventEnvelope, PlayerId, RoomCode};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

pub const DEFAULT_GRID_SIZE: u32 = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Opens a room. Terrain is row-major; all grass when omitted.
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        room: RoomCode,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        terrain: Option<Vec<BuildingKind>>,
    },

    /// Joins a room; a fresh id is minted when `player` is omitted.
    #[serde(rename_all = "camelCase")]
    Join {
        room: RoomCode,
        #[serde(default)]
        player: Option<PlayerId>,
        name: String,
    },

    #[serde(rename_all = "camelCase")]
    Leave { room: RoomCode, player: PlayerId },

    #[serde(rename_all = "camelCase")]
    Submit { room: RoomCode, action: ActionSubmission },

    #[serde(rename_all = "camelCase")]
    Snapshot { room: RoomCode },

    #[serde(rename_all = "camelCase")]
    Status { room: RoomCode },

    ListRooms,

    Quit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Ready { protocol_version: u32 },

    #[serde(rename_all = "camelCase")]
    RoomCreated { room: RoomCode, width: u32, height: u32 },

    #[serde(rename_all = "camelCase")]
    Joined { room: RoomCode, player: PlayerId, rejoined: bool },

    /// Leave and submit are fire-and-forget; outcomes arrive as events.
    #[serde(rename_all = "camelCase")]
    Accepted { room: RoomCode },

    #[serde(rename_all = "camelCase")]
    Snapshot { snapshot: Box<RoomSnapshot> },

    #[serde(rename_all = "camelCase")]
    Status { status: RoomStatus },

    #[serde(rename_all = "camelCase")]
    Rooms { rooms: Vec<RoomCode> },

    #[serde(rename_all = "camelCase")]
    Event {
        room: RoomCode,
        audience: Audience,
        timestamp_ms: u64,
        event: OutboundEvent,
    },

    #[serde(rename_all = "camelCase")]
    Error { message: String },

    Goodbye,
}

impl ServerMessage {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }

    /// Decodes a room envelope into a printable event line.
    pub fn from_envelope(envelope: EventEnvelope) -> Self {
        match Delivery::decode(&envelope) {
            Ok(event) => ServerMessage::Event {
                room: envelope.room,
                audience: envelope.audience,
                timestamp_ms: envelope.timestamp_ms,
                event,
            },
            Err(e) => ServerMessage::error(e),
        }
    }
}
