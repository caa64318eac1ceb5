//! Scenario runner - executes room stress scenarios.

use crate::exporter::SimExport;
use crate::invariants::InvariantViolation;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimMetrics, SimWorld};

use civitas_core::{
    ActionKind, ActionSubmission, BuildingKind, Census, Coord, EngineConfig, OutboundEvent, RejectionReason, ResourceBundle,
    ResourceKind, SessionError, TickReport,
};
use civitas_env::{PlayerId, RoomCode};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: SimMetrics,
}

/// Why a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioFailure {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Assertion(String),
}

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(ScenarioFailure::Assertion(format!($($arg)+)));
        }
    };
}

/// Runs room scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Players per room (at least two are always joined)
    num_players: usize,

    /// Economy ticks each scenario runs after its scripted part
    ticks: u64,

    engine: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new runner with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            num_players: 3,
            ticks: 30,
            engine: EngineConfig::default(),
        }
    }

    /// Runs every room on `engine` instead of the defaults.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_players(mut self, num_players: usize) -> Self {
        self.num_players = num_players.max(2);
        self
    }

    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_inner(scenario, false).0
    }

    /// Runs a scenario while recording one frame per tick.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.run_inner(scenario, true);
        let mut export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn run_inner(&self, scenario: ScenarioId, record: bool) -> (ScenarioResult, Option<SimExport>) {
        info!(scenario = %scenario, seed = self.seed, "Running scenario");

        let mut world = SimWorld::new(self.config_for(scenario));
        if record {
            world.enable_recording(scenario.name());
        }

        let outcome = match scenario {
            ScenarioId::ContestedPlacement => self.contested_placement(&mut world),
            ScenarioId::PowerOutageCascade => self.power_outage_cascade(&mut world),
            ScenarioId::RefundAccounting => self.refund_accounting(&mut world),
            ScenarioId::TurnChurn => self.turn_churn(&mut world),
            ScenarioId::TradeRace => self.trade_race(&mut world),
            ScenarioId::LockExpiry => self.lock_expiry(&mut world),
            ScenarioId::RandomBurst => self.random_burst(&mut world),
        };

        let failure_reason = match outcome {
            Ok(()) => None,
            Err(failure) => {
                warn!(scenario = %scenario, seed = self.seed, error = %failure, "Scenario failed");
                Some(failure.to_string())
            }
        };

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks: world.tick_count(),
            final_time_secs: world.now().as_secs_f64(),
            failure_reason,
            metrics: world.metrics.clone(),
        };
        (result, world.take_export())
    }

    fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let mut config = SimConfig {
            seed: self.seed,
            num_players: self.num_players,
            ticks: self.ticks,
            engine: self.engine.clone(),
            ..SimConfig::default()
        };
        if scenario == ScenarioId::PowerOutageCascade {
            config.engine.starting_resources = ResourceBundle::new()
                .with(ResourceKind::Wood, 100)
                .with(ResourceKind::Ore, 40)
                .with(ResourceKind::Power, 1);
        }
        config
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    fn contested_placement(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("CONTEST");
        let players = world.populate(&code)?;
        let (a, b) = (players[0], players[1]);
        let at = centre(world);

        world.submit(&code, ActionSubmission::place(a, at, BuildingKind::Road));
        world.submit(&code, ActionSubmission::advance_turn(a));
        world.advance(Duration::from_millis(100));
        world.submit(&code, ActionSubmission::place(b, at, BuildingKind::Residential));
        world.submit(&code, ActionSubmission::remove(b, at));

        let rejected = rejections_for(world, b);
        ensure!(
            rejected == vec![RejectionReason::CoordinateLocked, RejectionReason::CoordinateLocked],
            "expected two coordinate_locked rejections for the second player, got {:?}",
            rejected
        );
        ensure!(
            executed_places_at(world, at) == 1,
            "exactly one placement may execute while the cell is locked"
        );
        let cell = world.room(&code).and_then(|room| room.grid().get(at).cloned());
        ensure!(
            cell.as_ref().is_some_and(|c| c.kind == BuildingKind::Road && c.owner == Some(a)),
            "cell should hold the first player's road, found {:?}",
            cell
        );

        // Once the lock lapses the cell is free of contention, but the road is
        // still the first player's and cannot be built over.
        world.advance(world.config.engine.lock_ttl());
        world.submit(&code, ActionSubmission::place(b, at, BuildingKind::Residential));
        ensure!(
            rejections_for(world, b).last() == Some(&RejectionReason::InvalidTarget),
            "building over another player's road should be an invalid target, got {:?}",
            rejections_for(world, b)
        );
        ensure!(executed_places_at(world, at) == 1, "the first player's road must survive");

        world.run_ticks(self.ticks)?;
        Ok(())
    }

    fn power_outage_cascade(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("BLACKOUT");
        let players = world.populate(&code)?;
        let a = players[0];
        let (road, zone) = (Coord::new(2, 1), Coord::new(1, 1));

        world.submit(&code, ActionSubmission::place(a, road, BuildingKind::Road));
        world.submit(&code, ActionSubmission::place(a, zone, BuildingKind::Residential));

        // Residential draws the single unit of power.
        let reports = world.step();
        check_gating(&reports)?;
        ensure!(
            reports.iter().any(|(_, r)| r.outages_started.contains(&a)),
            "outage should start once power hits zero"
        );
        ensure!(!road_operable(world, &code, road), "road next to a dark zone should be inoperable");
        let zones = world
            .room(&code)
            .map(|room| Census::take(room.grid(), a).count(BuildingKind::Residential))
            .unwrap_or(0);
        ensure!(zones == 0, "zone behind an inoperable road must drop out of the census");

        let reports = world.step();
        check_gating(&reports)?;
        ensure!(
            world.room(&code).is_some_and(|room| room.outages().contains(&a)),
            "outage should persist while power stays at zero"
        );

        world.submit(&code, ActionSubmission::place(a, Coord::new(8, 8), BuildingKind::PowerPlant));
        let reports = world.step();
        check_gating(&reports)?;
        ensure!(
            reports.iter().any(|(_, r)| r.outages_ended.contains(&a)),
            "a power plant should end the outage"
        );
        ensure!(road_operable(world, &code, road), "road should be restored with power");
        world.check_invariants()?;

        for _ in 0..self.ticks {
            let reports = world.step();
            check_gating(&reports)?;
            world.check_invariants()?;
        }
        Ok(())
    }

    fn refund_accounting(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("REFUND");
        let players = world.populate(&code)?;
        let (a, b) = (players[0], players[1]);
        let at = Coord::new(3, 3);

        let engine = &world.config.engine;
        let cost = engine
            .build_costs
            .cost_of(BuildingKind::Residential)
            .map(|c| c.get(ResourceKind::Wood))
            .unwrap_or(0);
        let refund = (cost as f64 * engine.refund_rate).floor() as u32;

        let start = wood(world, &code, a);
        world.submit(&code, ActionSubmission::place(a, at, BuildingKind::Residential));
        ensure!(wood(world, &code, a) + cost == start, "residential should cost {} wood", cost);
        world.submit(&code, ActionSubmission::remove(a, at));
        ensure!(
            wood(world, &code, a) + cost - refund == start,
            "removal should refund {} of {} wood, balance {} from {}",
            refund,
            cost,
            wood(world, &code, a),
            start
        );
        let reverted = world
            .room(&code)
            .is_some_and(|room| room.grid().get(at).map(|c| c.kind) == room.grid().original_terrain(at));
        ensure!(reverted, "removed building should revert to original terrain");

        // Clearing natural terrain is free and refunds nothing.
        let natural = world.room(&code).and_then(|room| {
            room.grid()
                .cells()
                .find(|c| !c.player_placed && matches!(c.kind, BuildingKind::Forest | BuildingKind::Mountain))
                .map(|c| c.coord)
        });
        if let Some(natural) = natural {
            let before = wood(world, &code, a);
            world.submit(&code, ActionSubmission::remove(a, natural));
            ensure!(wood(world, &code, a) == before, "clearing terrain must not refund");
            let kind = world.room(&code).and_then(|room| room.grid().get(natural).map(|c| c.kind));
            ensure!(kind == Some(BuildingKind::Grass), "cleared terrain should become grass");
        }

        // Another player's building is not ours to remove.
        let theirs = Coord::new(5, 5);
        pass_turn_to(world, &code, b);
        world.submit(&code, ActionSubmission::place(b, theirs, BuildingKind::Road));
        pass_turn_to(world, &code, a);
        world.advance(world.config.engine.lock_ttl());
        world.submit(&code, ActionSubmission::remove(a, theirs));
        ensure!(
            rejections_for(world, a).last() == Some(&RejectionReason::InvalidTarget),
            "removing another player's building should be an invalid target"
        );

        // Claiming it hands over the ground, not the builder's refund.
        world.submit(&code, ActionSubmission::claim(a, theirs));
        let before = wood(world, &code, a);
        world.submit(&code, ActionSubmission::remove(a, theirs));
        let cleared = world
            .room(&code)
            .is_some_and(|room| room.grid().get(theirs).is_some_and(|c| !c.player_placed));
        ensure!(cleared, "claimed building should come down");
        ensure!(wood(world, &code, a) == before, "claimed building must not refund its remover");

        world.run_ticks(self.ticks)?;
        Ok(())
    }

    fn turn_churn(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("CHURN");
        world.populate(&code)?;
        let max_players = world.config.engine.max_players;
        let mut joined = 0;

        for round in 0..self.ticks {
            let roster: Vec<PlayerId> = world
                .room(&code)
                .map(|room| room.players().iter().map(|p| p.id).collect())
                .unwrap_or_default();
            let roll: u8 = world.context.with_rng(|rng| rng.gen_range(0..10));

            match roll {
                0..=2 if roster.len() < max_players => {
                    joined += 1;
                    world.add_player(&code, &format!("late-{}", joined))?;
                }
                3..=4 if roster.len() > 1 => {
                    let leaver = world.context.with_rng(|rng| roster.choose(rng).copied());
                    if let Some(leaver) = leaver {
                        debug!(round, player = %leaver, "Churn leave");
                        world.remove_player(&code, leaver);
                    }
                }
                _ => {
                    if let Some(current) = world.room(&code).and_then(|room| room.turns().current()) {
                        let at = random_coord(world);
                        world.submit(&code, ActionSubmission::place(current, at, BuildingKind::Road));
                        world.submit(&code, ActionSubmission::advance_turn(current));
                    }
                }
            }

            world.step();
            world.check_invariants()?;
            let room = world
                .room(&code)
                .ok_or_else(|| ScenarioFailure::Assertion("room vanished while players remained".to_string()))?;
            ensure!(
                room.turns().current().is_some_and(|p| room.contains(p)),
                "current turn must belong to a player in the room"
            );
        }
        Ok(())
    }

    fn trade_race(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        use ResourceKind::{Ore, Wood};

        let code = RoomCode::new("TRADE");
        let players = world.populate(&code)?;
        let (a, b) = (players[0], players[1]);
        let total = |world: &SimWorld, kind: ResourceKind| {
            world
                .room(&code)
                .map(|room| room.ledger().pools().map(|(_, pool)| pool.quantity(kind)).sum::<u32>())
                .unwrap_or(0)
        };
        let (wood_before, ore_before) = (total(world, Wood), total(world, Ore));

        // Both ask for most of b's wood; only the first can be covered.
        let offer = ResourceBundle::new().with(Ore, 1);
        let request = ResourceBundle::new().with(Wood, 50);
        world.submit_batch(
            &code,
            vec![
                ActionSubmission::trade(a, b, offer, request),
                ActionSubmission::trade(a, b, offer, request),
            ],
        );
        ensure!(
            rejections_for(world, a) == vec![RejectionReason::StaleAffordability],
            "second trade should fail as stale, got {:?}",
            rejections_for(world, a)
        );
        ensure!(
            total(world, Wood) == wood_before && total(world, Ore) == ore_before,
            "trades must conserve resources"
        );
        let counterparty_updates = world
            .transport
            .visible_to(b)
            .iter()
            .filter(|e| matches!(e, OutboundEvent::ResourcesUpdated { player_id, .. } if *player_id == b))
            .count();
        ensure!(counterparty_updates >= 1, "counterparty should receive a resources update");

        // Trading with someone who already left is stale too.
        let ghost = world.add_player(&code, "ghost")?;
        world.remove_player(&code, ghost);
        world.submit(&code, ActionSubmission::trade(a, ghost, offer, ResourceBundle::EMPTY));
        ensure!(
            rejections_for(world, a).last() == Some(&RejectionReason::StaleAffordability),
            "trade with a departed player should be stale"
        );

        world.run_ticks(self.ticks)?;
        Ok(())
    }

    fn lock_expiry(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("LOCKS");
        let players = world.populate(&code)?;
        let (a, b) = (players[0], players[1]);
        let ttl = world.config.engine.lock_ttl();
        let at = centre(world);

        // Build and tear down: the cell is empty again but stays locked.
        world.submit(&code, ActionSubmission::place(a, at, BuildingKind::Road));
        world.submit(&code, ActionSubmission::remove(a, at));
        world.submit(&code, ActionSubmission::advance_turn(a));

        world.advance(ttl - Duration::from_millis(1));
        world.submit(&code, ActionSubmission::place(b, at, BuildingKind::Road));
        ensure!(
            rejections_for(world, b) == vec![RejectionReason::CoordinateLocked],
            "lock should hold until its TTL"
        );

        world.advance(Duration::from_millis(1));
        ensure!(world.metrics.locks_expired == 1, "scheduled expiry should clear the lock");
        world.submit(&code, ActionSubmission::place(b, at, BuildingKind::Residential));
        ensure!(executed_places_at(world, at) == 2, "placement after expiry should execute");

        // Refreshing a lock supersedes the earlier expiry.
        world.advance(Duration::from_secs(2));
        world.submit(&code, ActionSubmission::place(b, at, BuildingKind::Road));
        world.advance(ttl - Duration::from_secs(2));
        let now = world.now();
        ensure!(
            world
                .room(&code)
                .is_some_and(|room| room.locks().active(at, now).is_some_and(|lock| lock.holder == b)),
            "superseded expiry must not clear a refreshed lock"
        );
        world.advance(Duration::from_secs(2));
        ensure!(
            world.room(&code).is_some_and(|room| room.locks().is_empty()),
            "refreshed lock should expire on its own schedule"
        );

        world.run_ticks(self.ticks)?;
        Ok(())
    }

    fn random_burst(&self, world: &mut SimWorld) -> Result<(), ScenarioFailure> {
        let code = RoomCode::new("BURST");
        let players = world.populate(&code)?;

        for _ in 0..self.ticks {
            let mut order = players.clone();
            world.context.with_rng(|rng| order.shuffle(rng));

            for actor in order {
                let batch_len = world.context.with_rng(|rng| rng.gen_range(1..=4));
                let batch = (0..batch_len).map(|_| random_submission(world, actor, &players)).collect();
                world.submit_batch(&code, batch);
                world.check_invariants()?;
            }

            let reports = world.step();
            check_gating(&reports)?;
            world.check_invariants()?;
        }

        ensure!(
            world.metrics.actions_executed + world.metrics.actions_rejected > 0,
            "random burst produced no outcomes"
        );
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn centre(world: &SimWorld) -> Coord {
    Coord::new(world.config.grid_width as i32 / 2, world.config.grid_height as i32 / 2)
}

fn random_coord(world: &SimWorld) -> Coord {
    let (w, h) = (world.config.grid_width as i32, world.config.grid_height as i32);
    world
        .context
        .with_rng(|rng| Coord::new(rng.gen_range(0..w), rng.gen_range(0..h)))
}

fn random_submission(world: &SimWorld, actor: PlayerId, players: &[PlayerId]) -> ActionSubmission {
    let roll: u8 = world.context.with_rng(|rng| rng.gen_range(0..100));
    let at = random_coord(world);
    match roll {
        0..=44 => {
            let building = world
                .context
                .with_rng(|rng| *BuildingKind::BUILDABLE.choose(rng).unwrap_or(&BuildingKind::Road));
            ActionSubmission::place(actor, at, building)
        }
        45..=59 => ActionSubmission::remove(actor, at),
        60..=74 => ActionSubmission::advance_turn(actor),
        75..=89 => {
            let other = world
                .context
                .with_rng(|rng| players.iter().filter(|p| **p != actor).copied().collect::<Vec<_>>().choose(rng).copied());
            let amount: u32 = world.context.with_rng(|rng| rng.gen_range(1..=20));
            match other {
                Some(other) => ActionSubmission::trade(
                    actor,
                    other,
                    ResourceBundle::new().with(ResourceKind::Ore, amount),
                    ResourceBundle::new().with(ResourceKind::Wood, amount),
                ),
                None => ActionSubmission::advance_turn(actor),
            }
        }
        90..=97 => ActionSubmission::claim(actor, at),
        // Out of bounds: dropped as malformed without any event.
        _ => ActionSubmission::place(actor, Coord::new(-1, at.y), BuildingKind::Road),
    }
}

fn rejections_for(world: &SimWorld, player: PlayerId) -> Vec<RejectionReason> {
    world
        .transport
        .visible_to(player)
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::ActionRejected { reason_code, .. } => Some(reason_code),
            _ => None,
        })
        .collect()
}

fn executed_places_at(world: &SimWorld, at: Coord) -> usize {
    world
        .transport
        .events()
        .iter()
        .filter(|(_, event)| {
            matches!(
                event,
                OutboundEvent::ActionExecuted { kind: ActionKind::Place, coordinate: Some(c), .. } if *c == at
            )
        })
        .count()
}

fn wood(world: &SimWorld, code: &RoomCode, player: PlayerId) -> u32 {
    world
        .room(code)
        .and_then(|room| room.ledger().pool(player))
        .map(|pool| pool.quantity(ResourceKind::Wood))
        .unwrap_or(0)
}

fn road_operable(world: &SimWorld, code: &RoomCode, at: Coord) -> bool {
    world
        .room(code)
        .and_then(|room| room.grid().get(at))
        .is_some_and(|cell| cell.operable)
}

/// Advances the turn until `player` holds it.
fn pass_turn_to(world: &mut SimWorld, code: &RoomCode, player: PlayerId) {
    let len = world.room(code).map(|room| room.turns().len()).unwrap_or(0);
    for _ in 0..len {
        match world.room(code).and_then(|room| room.turns().current()) {
            Some(current) if current != player => {
                world.submit(code, ActionSubmission::advance_turn(current));
            }
            _ => break,
        }
    }
}

/// Derived production never runs on a tick that started without power.
fn check_gating(reports: &[(RoomCode, TickReport)]) -> Result<(), ScenarioFailure> {
    for (code, report) in reports {
        for (player, tick) in &report.pools {
            ensure!(
                tick.power_before > 0 || (!tick.processed_gated_open && !tick.goods_gated_open),
                "{}: derived production ran for {} without power",
                code,
                player
            );
        }
    }
    Ok(())
}
