//! Session manager - owns every live room, keyed by room code.
//!
//! Rooms share nothing, so the manager is only a directory: it creates rooms,
//! routes joins, leaves and submissions to them, and destroys a room when its
//! last player leaves. Unknown rooms are a permissive no-op for submissions.

use crate::action::{ActionId, ActionSubmission};
use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::events::Delivery;
use crate::grid::{BuildingKind, CityGrid};
use crate::locks::LockTicket;
use crate::room::{Room, RoomSnapshot, TickReport};
use civitas_env::{PlayerId, RoomCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct SessionManager {
    config: Arc<EngineConfig>,
    rooms: BTreeMap<RoomCode, Room>,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            rooms: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Creates an empty room on a grid supplied by the terrain generator.
    pub fn create_room(&mut self, code: RoomCode, grid: CityGrid) -> Result<&mut Room, SessionError> {
        if self.rooms.contains_key(&code) {
            return Err(SessionError::RoomExists(code));
        }
        info!(room = %code, width = grid.width(), height = grid.height(), "Room created");
        let room = Room::new(code.clone(), grid, Arc::clone(&self.config));
        Ok(self.rooms.entry(code).or_insert(room))
    }

    /// Creates a room from a row-major terrain list.
    pub fn create_room_from_terrain(
        &mut self,
        code: RoomCode,
        width: u32,
        height: u32,
        terrain: Vec<BuildingKind>,
    ) -> Result<&mut Room, SessionError> {
        let cells = terrain.len();
        let grid = CityGrid::from_terrain(width, height, terrain)
            .ok_or(SessionError::GridMismatch { width, height, cells })?;
        self.create_room(code, grid)
    }

    /// Rebuilds a room from a persisted snapshot.
    pub fn restore_room(&mut self, snapshot: RoomSnapshot) -> Result<&mut Room, SessionError> {
        let code = snapshot.code.clone();
        if self.rooms.contains_key(&code) {
            return Err(SessionError::RoomExists(code));
        }
        info!(room = %code, players = snapshot.players.len(), "Room restored");
        let room = Room::restore(snapshot, Arc::clone(&self.config));
        Ok(self.rooms.entry(code).or_insert(room))
    }

    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn room_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn join(&mut self, code: &RoomCode, player: PlayerId, name: &str) -> Result<bool, SessionError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;
        room.join(player, name)
    }

    /// Removes a player; destroys the room once it is empty.
    ///
    /// The departing room's final events are returned since the room itself
    /// may no longer exist.
    pub fn leave(&mut self, code: &RoomCode, player: PlayerId) -> Vec<Delivery> {
        let Some(room) = self.rooms.get_mut(code) else {
            debug!(room = %code, player = %player, "Leave for unknown room ignored");
            return Vec::new();
        };
        room.leave(player);
        let outbox = room.take_outbox();
        if room.is_empty() {
            self.rooms.remove(code);
            info!(room = %code, "Room destroyed");
        }
        outbox
    }

    pub fn submit(&mut self, code: &RoomCode, submission: ActionSubmission, now: Duration) -> Option<ActionId> {
        match self.rooms.get_mut(code) {
            Some(room) => room.submit(submission, now),
            None => {
                debug!(room = %code, "Submission for unknown room ignored");
                None
            }
        }
    }

    pub fn expire_lock(&mut self, code: &RoomCode, ticket: LockTicket) -> bool {
        self.rooms
            .get_mut(code)
            .is_some_and(|room| room.expire_lock(ticket))
    }

    /// Ticks every room once.
    pub fn tick_all(&mut self, now: Duration) -> Vec<(RoomCode, TickReport)> {
        self.rooms
            .iter_mut()
            .map(|(code, room)| (code.clone(), room.tick(now)))
            .collect()
    }

    /// Collects pending events from every room.
    pub fn drain_outboxes(&mut self) -> Vec<(RoomCode, Delivery)> {
        let mut out = Vec::new();
        for (code, room) in self.rooms.iter_mut() {
            out.extend(room.take_outbox().into_iter().map(|d| (code.clone(), d)));
        }
        out
    }

    /// Collects lock tickets installed since the last call, per room.
    pub fn drain_scheduled_locks(&mut self) -> Vec<(RoomCode, LockTicket)> {
        let mut out = Vec::new();
        for (code, room) in self.rooms.iter_mut() {
            out.extend(room.take_scheduled_locks().into_iter().map(|t| (code.clone(), t)));
        }
        out
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
