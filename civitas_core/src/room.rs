//! Room - one authoritative game session.
//!
//! A room owns every piece of mutable state for its session: roster, turn
//! controller, grid, ledger, lock table and action queue. It is a plain
//! synchronous state machine; all I/O happens outside it.
//!
//! ```text
//!   submit ──► decode ──► queue ──► drain: validate ──► execute ──► outbox
//!                                              │
//!                                              └──► reject ───────► outbox (actor only)
//!   tick ────► sweep locks ──► economy per pool ──► outages ──► operability ──► outbox
//! ```
//!
//! Events accumulate in an outbox of [`Delivery`] values; locks installed by
//! executed actions accumulate as [`LockTicket`]s for the caller to schedule.

use crate::action::{Action, ActionId, ActionPayload, ActionSubmission, MalformedAction};
use crate::config::EngineConfig;
use crate::costs::AffordabilityHint;
use crate::economy::{Census, EconomyTicker, PoolTick};
use crate::error::SessionError;
use crate::events::{Delivery, OutboundEvent, PlayerInfo};
use crate::executor::{ActionExecutor, ExecutionState};
use crate::grid::CityGrid;
use crate::ledger::ResourceLedger;
use crate::locks::{CoordinateLockTable, LockTicket};
use crate::operability::{OperabilityChange, OperabilityPropagator};
use crate::queue::ActionQueue;
use crate::resources::ResourceKind;
use crate::turn::TurnController;
use crate::validator::{ActionValidator, RejectionReason, ValidationView};
use civitas_env::{PlayerId, RoomCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Player colors, handed out in join order.
pub const PLAYER_COLORS: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#bfef45",
];

/// Everything the persistence collaborator needs to rebuild a room.
///
/// Queued actions and coordinate locks are transient and not captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub players: Vec<PlayerInfo>,
    pub turn: TurnController,
    pub grid: CityGrid,
    pub ledger: ResourceLedger,
    pub outages: BTreeSet<PlayerId>,
    pub tick_count: u64,
    pub next_action_id: u64,
}

/// Summary of one economy tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub pools: Vec<(PlayerId, PoolTick)>,
    pub operability: OperabilityChange,
    pub outages_started: Vec<PlayerId>,
    pub outages_ended: Vec<PlayerId>,
    pub locks_swept: usize,
}

pub struct Room {
    code: RoomCode,
    config: Arc<EngineConfig>,
    players: Vec<PlayerInfo>,
    turns: TurnController,
    grid: CityGrid,
    ledger: ResourceLedger,
    locks: CoordinateLockTable,
    queue: ActionQueue,
    outbox: Vec<Delivery>,
    scheduled_locks: Vec<LockTicket>,
    outages: BTreeSet<PlayerId>,
    next_action_id: u64,
    tick_count: u64,
}

impl Room {
    pub fn new(code: RoomCode, grid: CityGrid, config: Arc<EngineConfig>) -> Self {
        let ledger = ResourceLedger::new(config.starting_resources, config.max_resources);
        Self {
            code,
            config,
            players: Vec::new(),
            turns: TurnController::new(),
            grid,
            ledger,
            locks: CoordinateLockTable::new(),
            queue: ActionQueue::new(),
            outbox: Vec::new(),
            scheduled_locks: Vec::new(),
            outages: BTreeSet::new(),
            next_action_id: 0,
            tick_count: 0,
        }
    }

    /// Rebuilds a room from a snapshot with an empty queue and no locks.
    pub fn restore(snapshot: RoomSnapshot, config: Arc<EngineConfig>) -> Self {
        let turns = TurnController::from_parts(snapshot.turn.order().to_vec(), snapshot.turn.index());
        Self {
            code: snapshot.code,
            config,
            players: snapshot.players,
            turns,
            grid: snapshot.grid,
            ledger: snapshot.ledger,
            locks: CoordinateLockTable::new(),
            queue: ActionQueue::new(),
            outbox: Vec::new(),
            scheduled_locks: Vec::new(),
            outages: snapshot.outages,
            next_action_id: snapshot.next_action_id,
            tick_count: snapshot.tick_count,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            players: self.players.clone(),
            turn: self.turns.clone(),
            grid: self.grid.clone(),
            ledger: self.ledger.clone(),
            outages: self.outages.clone(),
            tick_count: self.tick_count,
            next_action_id: self.next_action_id,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.players.iter().find(|p| p.is_host).map(|p| p.id)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn turns(&self) -> &TurnController {
        &self.turns
    }

    pub fn grid(&self) -> &CityGrid {
        &self.grid
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn locks(&self) -> &CoordinateLockTable {
        &self.locks
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn outages(&self) -> &BTreeSet<PlayerId> {
        &self.outages
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Build-cost table rows annotated with what `player` can currently afford.
    pub fn affordability(&self, player: PlayerId) -> Option<Vec<AffordabilityHint>> {
        let pool = self.ledger.pool(player)?;
        Some(self.config.build_costs.affordability(pool.stock()))
    }

    /// Drains pending outbound events.
    pub fn take_outbox(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.outbox)
    }

    /// Drains locks installed since the last call, for expiry scheduling.
    pub fn take_scheduled_locks(&mut self) -> Vec<LockTicket> {
        std::mem::take(&mut self.scheduled_locks)
    }

    // =========================================================================
    // ROSTER
    // =========================================================================

    /// Adds a player. Joining twice is a no-op that returns `Ok(false)`.
    pub fn join(&mut self, id: PlayerId, name: impl Into<String>) -> Result<bool, SessionError> {
        if self.contains(id) {
            debug!(room = %self.code, player = %id, "Duplicate join ignored");
            return Ok(false);
        }
        if self.players.len() >= self.config.max_players {
            return Err(SessionError::RoomFull {
                room: self.code.clone(),
                max: self.config.max_players,
            });
        }

        let info = PlayerInfo {
            id,
            name: name.into(),
            color: self.next_color().to_string(),
            is_host: self.players.is_empty(),
        };
        info!(room = %self.code, player = %id, name = %info.name, host = info.is_host, "Player joined");

        self.players.push(info.clone());
        self.turns.add_player(id);
        self.ledger.open(id);

        self.outbox.push(Delivery::room(OutboundEvent::PlayerJoined { player: info }));
        self.push_turn_changed();
        self.push_resources(id);
        Ok(true)
    }

    /// Removes a player, discarding their queued actions and locks.
    ///
    /// Returns false for a player who is not in the room.
    pub fn leave(&mut self, id: PlayerId) -> bool {
        let Some(position) = self.players.iter().position(|p| p.id == id) else {
            debug!(room = %self.code, player = %id, "Leave for unknown player ignored");
            return false;
        };

        let was_host = self.players[position].is_host;
        let order_position = self.turns.order().iter().position(|p| *p == id);
        self.players.remove(position);

        let discarded = self.queue.discard_from(id);
        let released = self.locks.release_all_held_by(id);
        let disowned = self.grid.disown(id);
        self.ledger.close(id);
        self.turns.remove_player(id);
        info!(
            room = %self.code,
            player = %id,
            discarded,
            released,
            disowned,
            remaining = self.players.len(),
            "Player left"
        );

        self.outbox.push(Delivery::room(OutboundEvent::PlayerLeft { player_id: id }));

        if self.outages.remove(&id) {
            self.refresh_operability();
        }

        if self.players.is_empty() {
            return true;
        }

        if was_host {
            let order = self.turns.order();
            // A restored snapshot may carry a turn order shorter than the roster.
            let successor = order_position
                .filter(|_| !order.is_empty())
                .and_then(|p| order.get(p % order.len()))
                .copied()
                .or_else(|| self.players.first().map(|p| p.id));
            if let Some(successor) = successor {
                for player in self.players.iter_mut() {
                    player.is_host = player.id == successor;
                }
                info!(room = %self.code, player = %successor, "Host transferred");
                self.outbox.push(Delivery::room(OutboundEvent::HostChanged { player_id: successor }));
            }
        }

        self.push_turn_changed();
        true
    }

    fn next_color(&self) -> &'static str {
        PLAYER_COLORS
            .iter()
            .find(|color| !self.players.iter().any(|p| p.color == **color))
            .copied()
            .unwrap_or(PLAYER_COLORS[self.players.len() % PLAYER_COLORS.len()])
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Accepts one submission and drains the queue before returning.
    ///
    /// Malformed submissions and unknown actors are dropped without a
    /// client-visible event. Returns the id assigned to an accepted action.
    pub fn submit(&mut self, submission: ActionSubmission, now: Duration) -> Option<ActionId> {
        let id = self.enqueue(submission);
        self.drain(now);
        id
    }

    /// Accepts a burst of submissions, then drains them in priority order.
    pub fn submit_batch(&mut self, submissions: Vec<ActionSubmission>, now: Duration) -> Vec<ActionId> {
        let ids = submissions
            .into_iter()
            .filter_map(|submission| self.enqueue(submission))
            .collect();
        self.drain(now);
        ids
    }

    fn enqueue(&mut self, submission: ActionSubmission) -> Option<ActionId> {
        let actor = submission.actor_id;
        if !self.contains(actor) {
            debug!(room = %self.code, player = %actor, kind = %submission.kind, "Submission from unknown actor ignored");
            return None;
        }

        let payload = match self.decode(&submission) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room = %self.code, player = %actor, error = %err, "Dropping malformed action");
                return None;
            }
        };

        self.next_action_id += 1;
        let action = Action {
            id: ActionId(self.next_action_id),
            actor,
            payload,
            timestamp: submission.timestamp,
        };
        let id = action.id;
        self.queue.insert(action);
        Some(id)
    }

    fn decode(&self, submission: &ActionSubmission) -> Result<ActionPayload, MalformedAction> {
        let payload = submission.decode(&self.grid, &self.config.build_costs)?;
        if let ActionPayload::Trade { counterparty, .. } = &payload {
            if !self.contains(*counterparty) {
                return Err(MalformedAction::UnknownCounterparty(*counterparty));
            }
        }
        Ok(payload)
    }

    /// Validates and applies queued actions until the queue is empty.
    fn drain(&mut self, now: Duration) {
        while let Some(action) = self.queue.pop_front() {
            let verdict = {
                let view = ValidationView {
                    turns: &self.turns,
                    locks: &self.locks,
                    ledger: &self.ledger,
                    costs: &self.config.build_costs,
                    grid: &self.grid,
                    now,
                };
                ActionValidator::validate(&action, &view)
            };

            let result = verdict.and_then(|()| {
                let mut state = ExecutionState {
                    grid: &mut self.grid,
                    ledger: &mut self.ledger,
                    locks: &mut self.locks,
                    turns: &mut self.turns,
                    config: &self.config,
                    now,
                };
                ActionExecutor::execute(&action, &mut state)
            });

            match result {
                Ok(execution) => {
                    debug!(room = %self.code, action = %action.id, kind = %action.kind(), player = %action.actor, "Action executed");
                    self.outbox
                        .extend(execution.events.into_iter().map(Delivery::room));
                    if let Some(ticket) = execution.lock {
                        self.scheduled_locks.push(ticket);
                    }
                    self.push_resources_after(&action, execution.counterparty);
                }
                Err(reason) => self.reject(&action, reason),
            }
        }
    }

    fn reject(&mut self, action: &Action, reason: RejectionReason) {
        debug!(room = %self.code, action = %action.id, kind = %action.kind(), player = %action.actor, %reason, "Action rejected");
        self.outbox.push(Delivery::player(
            action.actor,
            OutboundEvent::ActionRejected {
                action_id: action.id,
                reason_code: reason,
            },
        ));
    }

    fn push_resources_after(&mut self, action: &Action, counterparty: Option<PlayerId>) {
        if matches!(action.payload, ActionPayload::AdvanceTurn) {
            return;
        }
        self.push_resources(action.actor);
        if let Some(other) = counterparty {
            self.push_resources(other);
        }
    }

    /// Scheduled expiry for a lock installed earlier.
    pub fn expire_lock(&mut self, ticket: LockTicket) -> bool {
        let cleared = self.locks.expire(ticket);
        if cleared {
            debug!(room = %self.code, coord = %ticket.coord, generation = ticket.generation, "Lock expired");
        }
        cleared
    }

    // =========================================================================
    // ECONOMY
    // =========================================================================

    /// Runs one economy tick for every pool in the room.
    pub fn tick(&mut self, now: Duration) -> TickReport {
        let mut report = TickReport {
            locks_swept: self.locks.sweep(now),
            ..TickReport::default()
        };

        let before = self.outages.clone();
        for (player, pool) in self.ledger.pools_mut() {
            let census = Census::take(&self.grid, player);
            let tick = EconomyTicker::apply(pool, &census, &self.config.economy);

            if tick.power_after == 0 {
                if self.outages.insert(player) {
                    info!(room = %self.code, player = %player, "Power outage");
                    report.outages_started.push(player);
                }
            } else if self.outages.remove(&player) {
                info!(room = %self.code, player = %player, power = tick.power_after, "Power restored");
                report.outages_ended.push(player);
            }
            report.pools.push((player, tick));
        }

        if before != self.outages || !self.outages.is_empty() {
            report.operability = self.refresh_operability();
        }

        let players: Vec<PlayerId> = self.ledger.pools().map(|(id, _)| id).collect();
        for player in players {
            self.push_resources(player);
        }

        self.tick_count += 1;
        report.tick = self.tick_count;
        report
    }

    /// Re-derives road operability from the current outage set.
    fn refresh_operability(&mut self) -> OperabilityChange {
        let change = OperabilityPropagator::refresh(&mut self.grid, &self.outages);
        if !change.is_empty() {
            debug!(
                room = %self.code,
                marked = change.marked.len(),
                restored = change.restored.len(),
                "Operability changed"
            );
            self.outbox.push(Delivery::room(OutboundEvent::OperabilityChanged {
                inoperable: change.marked.clone(),
                restored: change.restored.clone(),
            }));
        }
        change
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    fn push_turn_changed(&mut self) {
        self.outbox.push(Delivery::room(OutboundEvent::TurnChanged {
            turn_index: self.turns.index(),
            turn_order: self.turns.order().to_vec(),
        }));
    }

    fn push_resources(&mut self, player: PlayerId) {
        if let Some(pool) = self.ledger.pool(player) {
            self.outbox.push(Delivery::player(
                player,
                OutboundEvent::ResourcesUpdated {
                    player_id: player,
                    resources: pool.snapshot(),
                },
            ));
        }
    }

    /// Current power of `player`, if they have a pool.
    pub fn power(&self, player: PlayerId) -> Option<u32> {
        self.ledger.pool(player).map(|pool| pool.quantity(ResourceKind::Power))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::grid::{BuildingKind, Coord};
    use crate::resources::ResourceBundle;
    use civitas_env::Audience;

    fn room() -> Room {
        Room::new(
            RoomCode::new("TEST"),
            CityGrid::filled(12, 12, BuildingKind::Grass),
            Arc::new(EngineConfig::default()),
        )
    }

    fn two_player_room() -> (Room, PlayerId, PlayerId) {
        let mut room = room();
        let a = PlayerId::from_seed(1);
        let b = PlayerId::from_seed(2);
        room.join(a, "alice").unwrap();
        room.join(b, "bob").unwrap();
        room.take_outbox();
        (room, a, b)
    }

    fn rejections(outbox: &[Delivery]) -> Vec<(Audience, RejectionReason)> {
        outbox
            .iter()
            .filter_map(|d| match &d.event {
                OutboundEvent::ActionRejected { reason_code, .. } => Some((d.audience, *reason_code)),
                _ => None,
            })
            .collect()
    }

    fn executed(outbox: &[Delivery]) -> usize {
        outbox
            .iter()
            .filter(|d| matches!(d.event, OutboundEvent::ActionExecuted { .. }))
            .count()
    }

    #[test]
    fn test_join_assigns_host_and_colors() {
        let (room, a, b) = two_player_room();
        assert_eq!(room.host(), Some(a));
        assert_eq!(room.player(a).unwrap().color, PLAYER_COLORS[0]);
        assert_eq!(room.player(b).unwrap().color, PLAYER_COLORS[1]);
        assert_eq!(room.turns().order(), &[a, b]);
        assert!(room.ledger().pool(b).is_some());
    }

    #[test]
    fn test_duplicate_join_is_noop() {
        let (mut room, a, _) = two_player_room();
        assert_eq!(room.join(a, "again"), Ok(false));
        assert_eq!(room.players().len(), 2);
        assert!(room.take_outbox().is_empty());
    }

    #[test]
    fn test_room_full() {
        let mut config = EngineConfig::default();
        config.max_players = 1;
        let mut room = Room::new(RoomCode::new("FULL"), CityGrid::filled(2, 2, BuildingKind::Grass), Arc::new(config));
        room.join(PlayerId::from_seed(1), "a").unwrap();
        assert!(matches!(
            room.join(PlayerId::from_seed(2), "b"),
            Err(SessionError::RoomFull { max: 1, .. })
        ));
    }

    #[test]
    fn test_place_executes_and_broadcasts() {
        let (mut room, a, _) = two_player_room();
        let id = room.submit(
            ActionSubmission::place(a, Coord::new(3, 3), BuildingKind::Road).at(7),
            Duration::ZERO,
        );
        assert_eq!(id, Some(ActionId(1)));

        let outbox = room.take_outbox();
        assert_eq!(executed(&outbox), 1);
        assert_eq!(room.queue_len(), 0);
        assert_eq!(room.take_scheduled_locks().len(), 1);
        assert_eq!(room.grid().get(Coord::new(3, 3)).unwrap().kind, BuildingKind::Road);
    }

    #[test]
    fn test_rejection_goes_to_actor_only() {
        let (mut room, _, b) = two_player_room();
        room.submit(ActionSubmission::place(b, Coord::new(1, 1), BuildingKind::Road), Duration::ZERO);

        let outbox = room.take_outbox();
        assert_eq!(rejections(&outbox), vec![(Audience::Player(b), RejectionReason::NotYourTurn)]);
        assert_eq!(executed(&outbox), 0);
    }

    #[test]
    fn test_malformed_and_unknown_actor_are_silent() {
        let (mut room, a, _) = two_player_room();
        let stranger = PlayerId::from_seed(99);

        assert!(room.submit(ActionSubmission::place(a, Coord::new(50, 50), BuildingKind::Road), Duration::ZERO).is_none());
        assert!(room.submit(ActionSubmission::advance_turn(stranger), Duration::ZERO).is_none());
        let trade = ActionSubmission::trade(
            a,
            stranger,
            ResourceBundle::new().with(ResourceKind::Wood, 1),
            ResourceBundle::EMPTY,
        );
        assert!(room.submit(trade, Duration::ZERO).is_none());
        assert!(room.take_outbox().is_empty());
    }

    #[test]
    fn test_contested_place_never_both_execute() {
        let (mut room, a, b) = two_player_room();
        let at = Coord::new(4, 4);

        room.submit(ActionSubmission::place(a, at, BuildingKind::Road), Duration::ZERO);
        room.submit(ActionSubmission::advance_turn(a), Duration::from_millis(10));
        room.submit(ActionSubmission::place(b, at, BuildingKind::Residential), Duration::from_millis(20));

        let outbox = room.take_outbox();
        assert_eq!(rejections(&outbox), vec![(Audience::Player(b), RejectionReason::CoordinateLocked)]);
        assert_eq!(room.grid().get(at).unwrap().kind, BuildingKind::Road);

        // The lock lapses but the road is still the first player's.
        room.submit(ActionSubmission::remove(b, at), Duration::from_secs(6));
        room.submit(ActionSubmission::place(b, at, BuildingKind::Residential), Duration::from_secs(6));
        assert_eq!(
            rejections(&room.take_outbox()),
            vec![
                (Audience::Player(b), RejectionReason::InvalidTarget),
                (Audience::Player(b), RejectionReason::InvalidTarget),
            ]
        );
        assert_eq!(room.grid().get(at).unwrap().owner, Some(a));
    }

    #[test]
    fn test_batch_drains_by_priority() {
        let (mut room, a, _) = two_player_room();
        let ids = room.submit_batch(
            vec![
                ActionSubmission::advance_turn(a),
                ActionSubmission::place(a, Coord::new(2, 2), BuildingKind::Road),
            ],
            Duration::ZERO,
        );
        assert_eq!(ids.len(), 2);

        // Place (priority 0) runs before AdvanceTurn even though it came second.
        let outbox = room.take_outbox();
        assert_eq!(executed(&outbox), 2);
        assert_eq!(room.grid().get(Coord::new(2, 2)).unwrap().kind, BuildingKind::Road);
    }

    #[test]
    fn test_batch_keeps_submission_order_within_priority() {
        let (mut room, a, _) = two_player_room();
        let first = Coord::new(2, 2);
        let second = Coord::new(5, 5);
        room.submit_batch(
            vec![
                ActionSubmission::advance_turn(a),
                ActionSubmission::place(a, first, BuildingKind::Road),
                ActionSubmission::place(a, second, BuildingKind::Residential),
            ],
            Duration::ZERO,
        );

        let placed: Vec<Coord> = room
            .take_outbox()
            .into_iter()
            .filter_map(|d| match d.event {
                OutboundEvent::ActionExecuted { kind: ActionKind::Place, coordinate, .. } => coordinate,
                _ => None,
            })
            .collect();
        assert_eq!(placed, vec![first, second]);
    }

    #[test]
    fn test_leave_clears_ownership() {
        let (mut room, a, b) = two_player_room();
        let at = Coord::new(3, 3);
        room.submit(ActionSubmission::place(a, at, BuildingKind::Road), Duration::ZERO);
        room.submit(ActionSubmission::advance_turn(a), Duration::ZERO);
        room.leave(a);
        room.take_outbox();

        let cell = room.grid().get(at).unwrap();
        assert_eq!(cell.kind, BuildingKind::Road);
        assert_eq!(cell.owner, None);

        room.submit(ActionSubmission::claim(b, at), Duration::from_secs(1));
        let outbox = room.take_outbox();
        assert!(outbox.iter().any(|d| matches!(
            d.event,
            OutboundEvent::ActionExecuted { kind: ActionKind::ClaimTerritory, counterparty_id: None, .. }
        )));
        assert_eq!(room.grid().get(at).unwrap().owner, Some(b));
    }

    #[test]
    fn test_host_leaves_restored_room_with_short_turn_order() {
        let (room, a, b) = two_player_room();
        let mut snapshot = room.snapshot();
        snapshot.turn = TurnController::from_parts(vec![a], 0);
        let mut restored = Room::restore(snapshot, Arc::new(EngineConfig::default()));

        assert!(restored.leave(a));
        assert_eq!(restored.host(), Some(b));
        assert!(restored.turns().order().is_empty());
    }

    #[test]
    fn test_leave_transfers_host_and_clamps_turn() {
        let mut room = room();
        let ids: Vec<PlayerId> = (1..=3).map(PlayerId::from_seed).collect();
        for (i, id) in ids.iter().enumerate() {
            room.join(*id, format!("p{}", i)).unwrap();
        }
        room.submit(ActionSubmission::advance_turn(ids[0]), Duration::ZERO);
        room.submit(ActionSubmission::advance_turn(ids[1]), Duration::ZERO);
        assert_eq!(room.turns().index(), 2);
        room.take_outbox();

        assert!(room.leave(ids[0]));
        assert_eq!(room.host(), Some(ids[1]));
        assert_eq!(room.turns().index(), 1);
        assert_eq!(room.turns().current(), Some(ids[2]));

        let outbox = room.take_outbox();
        assert!(outbox.iter().any(|d| d.event == OutboundEvent::HostChanged { player_id: ids[1] }));
        assert!(outbox.iter().any(|d| matches!(d.event, OutboundEvent::TurnChanged { turn_index: 1, .. })));
    }

    #[test]
    fn test_leave_releases_locks() {
        let (mut room, a, b) = two_player_room();
        let at = Coord::new(6, 6);
        room.submit(ActionSubmission::place(a, at, BuildingKind::Road), Duration::ZERO);
        assert_eq!(room.locks().active_count(Duration::ZERO), 1);

        room.leave(a);
        assert_eq!(room.locks().active_count(Duration::ZERO), 0);
        assert_eq!(room.turns().current(), Some(b));
        assert!(!room.leave(a));
    }

    #[test]
    fn test_expire_lock_ignores_superseded_ticket() {
        let (mut room, a, _) = two_player_room();
        let at = Coord::new(1, 1);
        room.submit(ActionSubmission::place(a, at, BuildingKind::Road), Duration::ZERO);
        room.submit(ActionSubmission::remove(a, at), Duration::from_secs(1));
        let tickets = room.take_scheduled_locks();
        assert_eq!(tickets.len(), 2);

        assert!(!room.expire_lock(tickets[0]));
        assert!(room.locks().active(at, Duration::from_secs(2)).is_some());
        assert!(room.expire_lock(tickets[1]));
        assert!(room.locks().active(at, Duration::from_secs(2)).is_none());
    }

    #[test]
    fn test_tick_broadcasts_resources_per_player() {
        let (mut room, a, b) = two_player_room();
        let report = room.tick(Duration::from_secs(1));
        assert_eq!(report.tick, 1);
        assert_eq!(report.pools.len(), 2);

        let outbox = room.take_outbox();
        let audiences: Vec<Audience> = outbox
            .iter()
            .filter(|d| matches!(d.event, OutboundEvent::ResourcesUpdated { .. }))
            .map(|d| d.audience)
            .collect();
        assert!(audiences.contains(&Audience::Player(a)));
        assert!(audiences.contains(&Audience::Player(b)));
        assert_eq!(audiences.len(), 2);
    }

    #[test]
    fn test_outage_marks_and_restores_roads() {
        let mut config = EngineConfig::default();
        config.starting_resources = ResourceBundle::new()
            .with(ResourceKind::Wood, 100)
            .with(ResourceKind::Ore, 40)
            .with(ResourceKind::Power, 1);
        let mut room = Room::new(
            RoomCode::new("DARK"),
            CityGrid::filled(10, 10, BuildingKind::Grass),
            Arc::new(config),
        );
        let a = PlayerId::from_seed(1);
        room.join(a, "a").unwrap();

        let zone = Coord::new(1, 1);
        room.submit(ActionSubmission::place(a, Coord::new(2, 1), BuildingKind::Road), Duration::ZERO);
        room.submit(ActionSubmission::place(a, zone, BuildingKind::Residential), Duration::ZERO);

        // Residential draws 1 power: 1 -> 0
        let report = room.tick(Duration::from_secs(1));
        assert_eq!(report.outages_started, vec![a]);
        assert!(!room.grid().get(Coord::new(2, 1)).unwrap().operable);
        assert_eq!(Census::take(room.grid(), a).count(BuildingKind::Residential), 0);

        // Power comes back from a plant placed during the outage.
        room.submit(ActionSubmission::place(a, Coord::new(8, 8), BuildingKind::PowerPlant), Duration::from_secs(1));
        let report = room.tick(Duration::from_secs(2));
        assert!(report.pools[0].1.power_after > 0);
        assert_eq!(report.outages_ended, vec![a]);
        assert!(room.grid().get(Coord::new(2, 1)).unwrap().operable);
        assert_eq!(Census::take(room.grid(), a).count(BuildingKind::Residential), 1);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (mut room, a, b) = two_player_room();
        room.submit(ActionSubmission::place(a, Coord::new(3, 3), BuildingKind::Road), Duration::ZERO);
        room.submit(ActionSubmission::advance_turn(a), Duration::ZERO);
        room.tick(Duration::from_secs(1));

        let json = serde_json::to_string(&room.snapshot()).unwrap();
        let snapshot: RoomSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Room::restore(snapshot, Arc::new(EngineConfig::default()));

        assert_eq!(restored.turns().current(), Some(b));
        assert_eq!(restored.tick_count(), 1);
        assert_eq!(restored.grid().get(Coord::new(3, 3)).unwrap().kind, BuildingKind::Road);
        assert_eq!(restored.locks().active_count(Duration::ZERO), 0);
        assert_eq!(restored.ledger().pool(a).unwrap().stock(), room.ledger().pool(a).unwrap().stock());
    }
}
