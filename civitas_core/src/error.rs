//! Room and session lifecycle errors.

use civitas_env::{EnvError, RoomCode};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Room {0} already exists")]
    RoomExists(RoomCode),

    #[error("Room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("Room {room} is full ({max} players)")]
    RoomFull { room: RoomCode, max: usize },

    #[error("Grid {width}x{height} does not match {cells} terrain cells")]
    GridMismatch { width: u32, height: u32, cells: usize },
}

/// Errors surfaced by a [`crate::runtime::RoomHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Env(#[from] EnvError),
}
