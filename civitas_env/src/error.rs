//! Error types for the Civitas environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport delivery failed (subscriber gone, buffer full, etc.)
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The room's command channel is closed (room task has stopped)
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// Event serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Creates a room-closed error.
    pub fn room_closed(room: impl std::fmt::Display) -> Self {
        Self::RoomClosed(room.to_string())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::SerializationError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_pick_variant() {
        let errors = [
            EnvError::transport("subscriber gone"),
            EnvError::room_closed("LOBBY"),
            EnvError::serialization("bad json"),
        ];
        for error in &errors {
            let label = match error {
                EnvError::TransportError(_) => "Transport error",
                EnvError::RoomClosed(_) => "Room closed",
                EnvError::SerializationError(_) => "Serialization error",
            };
            assert!(error.to_string().starts_with(label));
        }
        assert_eq!(errors[1].to_string(), "Room closed: LOBBY");
    }
}
