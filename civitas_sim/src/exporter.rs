//! JSON exporter for simulation replays.
//!
//! Exports one frame per economy tick so a run can be inspected offline.

use civitas_core::{PoolSnapshot, Room, SessionManager};
use civitas_env::{PlayerId, RoomCode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::time::Duration;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub tick: u64,

    /// Simulation time in seconds
    pub time_sec: f64,

    pub rooms: Vec<RoomFrame>,

    /// Notable things that happened since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    /// Captures every room the session manager holds.
    pub fn capture(tick: u64, now: Duration, sessions: &SessionManager, events: Vec<SimEvent>) -> Self {
        Self {
            tick,
            time_sec: now.as_secs_f64(),
            rooms: sessions.rooms().map(|room| RoomFrame::capture(room, now)).collect(),
            events,
        }
    }
}

/// Room state at one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomFrame {
    pub code: RoomCode,
    pub turn_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<PlayerId>,
    pub players: Vec<PlayerFrame>,
    pub buildings: usize,
    pub active_locks: usize,
    pub inoperable_roads: usize,
}

impl RoomFrame {
    pub fn capture(room: &Room, now: Duration) -> Self {
        let players = room
            .players()
            .iter()
            .filter_map(|player| {
                let pool = room.ledger().pool(player.id)?;
                Some(PlayerFrame {
                    id: player.id,
                    name: player.name.clone(),
                    resources: pool.snapshot(),
                    in_outage: room.outages().contains(&player.id),
                })
            })
            .collect();

        Self {
            code: room.code().clone(),
            turn_index: room.turns().index(),
            current_player: room.turns().current(),
            players,
            buildings: room.grid().cells().filter(|cell| cell.player_placed).count(),
            active_locks: room.locks().active_count(now),
            inoperable_roads: room.grid().inoperable_road_count(),
        }
    }
}

/// Player state at one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerFrame {
    pub id: PlayerId,
    pub name: String,
    pub resources: PoolSnapshot,
    pub in_outage: bool,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
