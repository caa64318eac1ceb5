//! Room registry: one spawned [`RoomRuntime`] per room code.

use crate::protocol::{ClientCommand, ServerMessage, DEFAULT_GRID_SIZE};
use civitas_core::{
    ActionSubmission, BuildingKind, CityGrid, EngineConfig, Room, RoomHandle, RoomRuntime, RoomSnapshot, RoomStatus, RuntimeError,
    SessionError,
};
use civitas_env::{EngineContext, EventTransport, PlayerId, RoomCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RoomRegistry<Ctx, T>
where
    Ctx: EngineContext,
    T: EventTransport,
{
    config: Arc<EngineConfig>,
    context: Arc<Ctx>,
    transport: Arc<T>,
    rooms: BTreeMap<RoomCode, RoomHandle>,
}

impl<Ctx, T> RoomRegistry<Ctx, T>
where
    Ctx: EngineContext,
    T: EventTransport,
{
    pub fn new(config: Arc<EngineConfig>, context: Arc<Ctx>, transport: Arc<T>) -> Self {
        Self {
            config,
            context,
            transport,
            rooms: BTreeMap::new(),
        }
    }

    /// Forgets rooms whose task has stopped (e.g. the last player left).
    fn prune(&mut self) {
        self.rooms.retain(|code, handle| {
            let closed = handle.is_closed();
            if closed {
                debug!(room = %code, "Pruning closed room");
            }
            !closed
        });
    }

    fn handle(&mut self, code: &RoomCode) -> Result<&RoomHandle, SessionError> {
        self.prune();
        self.rooms
            .get(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))
    }

    pub fn create_room(
        &mut self,
        code: RoomCode,
        width: u32,
        height: u32,
        terrain: Option<Vec<BuildingKind>>,
    ) -> Result<(), SessionError> {
        self.prune();
        if self.rooms.contains_key(&code) {
            return Err(SessionError::RoomExists(code));
        }

        let grid = match terrain {
            Some(terrain) => {
                let cells = terrain.len();
                CityGrid::from_terrain(width, height, terrain).ok_or(SessionError::GridMismatch {
                    width,
                    height,
                    cells,
                })?
            }
            None => CityGrid::filled(width, height, BuildingKind::Grass),
        };

        let room = Room::new(code.clone(), grid, Arc::clone(&self.config));
        let handle = RoomRuntime::spawn(room, Arc::clone(&self.context), Arc::clone(&self.transport));
        info!(room = %code, width, height, "Room opened");
        self.rooms.insert(code, handle);
        Ok(())
    }

    pub async fn join(&mut self, code: &RoomCode, player: PlayerId, name: String) -> Result<bool, RuntimeError> {
        let handle = self.handle(code)?.clone();
        handle.join(player, name).await
    }

    pub fn leave(&mut self, code: &RoomCode, player: PlayerId) -> Result<(), RuntimeError> {
        Ok(self.handle(code)?.leave(player)?)
    }

    pub fn submit(&mut self, code: &RoomCode, submission: ActionSubmission) -> Result<(), RuntimeError> {
        Ok(self.handle(code)?.submit(submission)?)
    }

    pub async fn snapshot(&mut self, code: &RoomCode) -> Result<RoomSnapshot, RuntimeError> {
        let handle = self.handle(code)?.clone();
        Ok(handle.snapshot().await?)
    }

    pub async fn status(&mut self, code: &RoomCode) -> Result<RoomStatus, RuntimeError> {
        let handle = self.handle(code)?.clone();
        Ok(handle.status().await?)
    }

    pub fn codes(&mut self) -> Vec<RoomCode> {
        self.prune();
        self.rooms.keys().cloned().collect()
    }

    /// Stops every room task.
    pub fn shutdown_all(&mut self) {
        for (code, handle) in std::mem::take(&mut self.rooms) {
            if handle.shutdown().is_ok() {
                debug!(room = %code, "Shutdown sent");
            }
        }
    }

    /// Runs one protocol command and produces its reply line.
    pub async fn dispatch(&mut self, command: ClientCommand) -> ServerMessage {
        match command {
            ClientCommand::CreateRoom {
                room,
                width,
                height,
                terrain,
            } => {
                let width = width.unwrap_or(DEFAULT_GRID_SIZE);
                let height = height.unwrap_or(width);
                match self.create_room(room.clone(), width, height, terrain) {
                    Ok(()) => ServerMessage::RoomCreated { room, width, height },
                    Err(e) => ServerMessage::error(e),
                }
            }
            ClientCommand::Join { room, player, name } => {
                let player = player.unwrap_or_default();
                match self.join(&room, player, name).await {
                    Ok(joined) => ServerMessage::Joined {
                        room,
                        player,
                        rejoined: !joined,
                    },
                    Err(e) => ServerMessage::error(e),
                }
            }
            ClientCommand::Leave { room, player } => match self.leave(&room, player) {
                Ok(()) => ServerMessage::Accepted { room },
                Err(e) => ServerMessage::error(e),
            },
            ClientCommand::Submit { room, action } => match self.submit(&room, action) {
                Ok(()) => ServerMessage::Accepted { room },
                Err(e) => ServerMessage::error(e),
            },
            ClientCommand::Snapshot { room } => match self.snapshot(&room).await {
                Ok(snapshot) => ServerMessage::Snapshot {
                    snapshot: Box::new(snapshot),
                },
                Err(e) => ServerMessage::error(e),
            },
            ClientCommand::Status { room } => match self.status(&room).await {
                Ok(status) => ServerMessage::Status { status },
                Err(e) => ServerMessage::error(e),
            },
            ClientCommand::ListRooms => ServerMessage::Rooms { rooms: self.codes() },
            ClientCommand::Quit => {
                self.shutdown_all();
                ServerMessage::Goodbye
            }
        }
    }
}
