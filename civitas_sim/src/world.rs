//! SimWorld - The simulation harness container.
//!
//! Drives a [`SessionManager`] on a virtual clock. Lock expiries are kept in
//! a time-ordered schedule instead of spawned timers, so a run is a pure
//! function of its seed.

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::invariants::{check_room, InvariantViolation};
use crate::terrain::TerrainGenerator;
use crate::transport::SimTransport;

use civitas_core::{
    ActionId, ActionSubmission, EngineConfig, LockTicket, OutboundEvent, Room, SessionError, SessionManager,
    TickReport,
};
use civitas_env::{EngineContext, PlayerId, RoomCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Players joined to each room at start
    pub num_players: usize,

    /// Economy ticks to run (scenarios may stop earlier)
    pub ticks: u64,

    pub grid_width: u32,
    pub grid_height: u32,

    /// Engine tunables shared by every room
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_players: 3,
            ticks: 60,
            grid_width: 24,
            grid_height: 24,
            engine: EngineConfig::default(),
        }
    }
}

/// Counters collected while the world runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimMetrics {
    pub actions_submitted: u64,
    pub actions_executed: u64,
    pub actions_rejected: u64,
    pub events_delivered: u64,
    pub delivery_failures: u64,
    pub locks_expired: u64,
    pub outages_started: u64,
    pub outages_ended: u64,
    pub peak_inoperable_roads: usize,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Records every envelope the rooms emit
    pub transport: Arc<SimTransport>,

    pub metrics: SimMetrics,

    sessions: SessionManager,
    terrain: TerrainGenerator,

    /// Pending expiries keyed by (due time, insertion order)
    expiries: BTreeMap<(Duration, u64), (RoomCode, LockTicket)>,
    expiry_seq: u64,

    recorder: Option<SimExport>,
    pending_events: Vec<SimEvent>,

    /// When the next economy tick is due
    next_tick: Duration,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Self {
        // Derive separate seeds for different subsystems
        let context_seed = config.seed;
        let terrain_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        Self {
            context: SimContext::shared(context_seed),
            transport: SimTransport::shared(),
            metrics: SimMetrics::default(),
            sessions: SessionManager::new(config.engine.clone()),
            terrain: TerrainGenerator::new(terrain_seed),
            expiries: BTreeMap::new(),
            expiry_seq: 0,
            recorder: None,
            pending_events: Vec::new(),
            next_tick: config.engine.tick_interval(),
            tick_count: 0,
            config,
        }
    }

    /// Starts collecting one frame per tick.
    pub fn enable_recording(&mut self, scenario: &str) {
        self.recorder = Some(SimExport::new(scenario, self.config.seed));
    }

    pub fn take_export(&mut self) -> Option<SimExport> {
        self.recorder.take()
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.sessions.room(code)
    }

    pub fn pending_expiries(&self) -> usize {
        self.expiries.len()
    }

    // =========================================================================
    // ROSTER
    // =========================================================================

    /// Creates a room on freshly generated terrain.
    pub fn create_room(&mut self, code: &RoomCode) -> Result<(), SessionError> {
        let grid = self.terrain.grid(self.config.grid_width, self.config.grid_height);
        self.sessions.create_room(code.clone(), grid)?;
        Ok(())
    }

    /// Joins a new player whose id is drawn from the run's RNG.
    pub fn add_player(&mut self, code: &RoomCode, name: &str) -> Result<PlayerId, SessionError> {
        let id = self.context.next_player_id();
        self.sessions.join(code, id, name)?;
        self.flush();
        Ok(id)
    }

    /// Creates a room and joins `config.num_players` players to it.
    pub fn populate(&mut self, code: &RoomCode) -> Result<Vec<PlayerId>, SessionError> {
        self.create_room(code)?;
        (0..self.config.num_players)
            .map(|i| self.add_player(code, &format!("player-{}", i)))
            .collect()
    }

    pub fn remove_player(&mut self, code: &RoomCode, player: PlayerId) {
        let farewell = self.sessions.leave(code, player);
        self.deliver(code, farewell);
        self.flush();
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    pub fn submit(&mut self, code: &RoomCode, submission: ActionSubmission) -> Option<ActionId> {
        let now = self.now();
        let submission = submission.at(self.context.unix_millis());
        self.metrics.actions_submitted += 1;
        let id = self.sessions.submit(code, submission, now);
        self.flush();
        id
    }

    /// Submits a batch that arrives together, so it drains in priority order.
    pub fn submit_batch(&mut self, code: &RoomCode, submissions: Vec<ActionSubmission>) -> Vec<ActionId> {
        let now = self.now();
        let stamp = self.context.unix_millis();
        self.metrics.actions_submitted += submissions.len() as u64;
        let submissions = submissions.into_iter().map(|s| s.at(stamp)).collect();
        let ids = match self.sessions.room_mut(code) {
            Some(room) => room.submit_batch(submissions, now),
            None => Vec::new(),
        };
        self.flush();
        ids
    }

    // =========================================================================
    // TIME
    // =========================================================================

    /// Moves the virtual clock forward, firing lock expiries on the way.
    pub fn advance(&mut self, duration: Duration) {
        let target = self.now() + duration;
        while let Some(entry) = self.expiries.first_entry() {
            let (due, _) = *entry.key();
            if due > target {
                break;
            }
            let (code, ticket) = entry.remove();
            if due > self.now() {
                self.context.set_time(due);
            }
            if self.sessions.expire_lock(&code, ticket) {
                self.metrics.locks_expired += 1;
            }
        }
        self.context.set_time(target);
    }

    /// Advances to the next tick boundary and runs one economy tick in every room.
    ///
    /// A tick that is already overdue runs at the current time.
    pub fn step(&mut self) -> Vec<(RoomCode, TickReport)> {
        let now = self.now();
        if self.next_tick > now {
            self.advance(self.next_tick - now);
        }

        let now = self.now();
        self.next_tick = now + self.config.engine.tick_interval();
        let reports = self.sessions.tick_all(now);
        for (code, report) in &reports {
            self.metrics.outages_started += report.outages_started.len() as u64;
            self.metrics.outages_ended += report.outages_ended.len() as u64;
            for player in &report.outages_started {
                self.pending_events
                    .push(SimEvent::warn(format!("{}: outage for {}", code, player)));
            }
            for player in &report.outages_ended {
                self.pending_events
                    .push(SimEvent::info(format!("{}: power restored for {}", code, player)));
            }
        }
        let dark = self
            .sessions
            .rooms()
            .map(|room| room.grid().inoperable_road_count())
            .max()
            .unwrap_or(0);
        self.metrics.peak_inoperable_roads = self.metrics.peak_inoperable_roads.max(dark);

        self.flush();
        self.tick_count += 1;

        if let Some(export) = self.recorder.as_mut() {
            let events = std::mem::take(&mut self.pending_events);
            export.add_frame(SimFrame::capture(self.tick_count, now, &self.sessions, events));
        }
        reports
    }

    /// Runs `ticks` steps, checking invariants after each one.
    pub fn run_ticks(&mut self, ticks: u64) -> Result<(), InvariantViolation> {
        for _ in 0..ticks {
            self.step();
            self.check_invariants()?;
        }
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let now = self.now();
        self.sessions.rooms().try_for_each(|room| check_room(room, now))
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Schedules fresh lock expiries and pushes every outbox through the transport.
    fn flush(&mut self) {
        let due = self.now() + self.config.engine.lock_ttl();
        for (code, ticket) in self.sessions.drain_scheduled_locks() {
            self.expiry_seq += 1;
            self.expiries.insert((due, self.expiry_seq), (code, ticket));
        }

        let mut by_room: BTreeMap<RoomCode, Vec<_>> = BTreeMap::new();
        for (code, delivery) in self.sessions.drain_outboxes() {
            by_room.entry(code).or_default().push(delivery);
        }
        for (code, deliveries) in by_room {
            self.deliver(&code, deliveries);
        }
    }

    fn deliver(&mut self, code: &RoomCode, deliveries: Vec<civitas_core::Delivery>) {
        let stamp = self.context.unix_millis();
        for delivery in deliveries {
            match &delivery.event {
                OutboundEvent::ActionExecuted { .. } => self.metrics.actions_executed += 1,
                OutboundEvent::ActionRejected { reason_code, .. } => {
                    self.metrics.actions_rejected += 1;
                    debug!(room = %code, reason = %reason_code, "Rejection delivered");
                }
                OutboundEvent::OperabilityChanged { inoperable, restored } => {
                    self.pending_events.push(SimEvent::info(format!(
                        "{}: {} roads dark, {} restored",
                        code,
                        inoperable.len(),
                        restored.len()
                    )));
                }
                _ => {}
            }

            let result = delivery
                .into_envelope(code, stamp)
                .and_then(|envelope| self.transport.record(envelope));
            match result {
                Ok(()) => self.metrics.events_delivered += 1,
                Err(err) => {
                    self.metrics.delivery_failures += 1;
                    warn!(room = %code, error = %err, "Delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::{BuildingKind, Coord};

    fn world() -> (SimWorld, RoomCode, Vec<PlayerId>) {
        let mut world = SimWorld::new(SimConfig {
            num_players: 2,
            ..SimConfig::default()
        });
        let code = RoomCode::new("WORLD");
        let players = world.populate(&code).unwrap();
        (world, code, players)
    }

    #[test]
    fn test_populate_joins_players() {
        let (world, code, players) = world();
        assert_eq!(players.len(), 2);
        assert_eq!(world.room(&code).unwrap().players().len(), 2);
        assert!(world.metrics.events_delivered > 0);
        assert!(world.check_invariants().is_ok());
    }

    #[test]
    fn test_step_follows_tick_interval() {
        let (mut world, _, _) = world();
        world.step();
        world.step();
        assert_eq!(world.now(), Duration::from_secs(2));
        assert_eq!(world.tick_count(), 2);
    }

    #[test]
    fn test_lock_expiry_is_scheduled_and_fired() {
        let (mut world, code, players) = world();
        let at = Coord::new(3, 3);
        world.submit(&code, ActionSubmission::place(players[0], at, BuildingKind::Road));
        assert_eq!(world.pending_expiries(), 1);

        world.advance(Duration::from_millis(4_999));
        assert_eq!(world.metrics.locks_expired, 0);

        world.advance(Duration::from_millis(1));
        assert_eq!(world.metrics.locks_expired, 1);
        assert!(world.room(&code).unwrap().locks().is_empty());
    }

    #[test]
    fn test_same_seed_same_transcript() {
        let run = || {
            let (mut world, code, players) = world();
            world.submit(&code, ActionSubmission::place(players[0], Coord::new(1, 1), BuildingKind::Residential));
            world.run_ticks(3).unwrap();
            let snapshot = world.room(&code).unwrap().snapshot();
            (players, serde_json::to_string(&snapshot).unwrap())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_failed_delivery_leaves_room_intact() {
        let (mut world, code, players) = world();
        world.transport.set_failing(true);
        world.submit(&code, ActionSubmission::place(players[0], Coord::new(2, 2), BuildingKind::Road));
        assert!(world.metrics.delivery_failures > 0);
        assert_eq!(
            world.room(&code).unwrap().grid().get(Coord::new(2, 2)).unwrap().kind,
            BuildingKind::Road
        );
    }

    #[test]
    fn test_recording_captures_frames() {
        let (mut world, _, _) = world();
        world.enable_recording("test");
        world.run_ticks(4).unwrap();
        let export = world.take_export().unwrap();
        assert_eq!(export.frames.len(), 4);
        assert_eq!(export.duration_sec, 4.0);
    }
}
