//! Action executor - applies a validated action to room state.
//!
//! Execution is all-or-nothing. Place/Remove install a coordinate lock and
//! hand back its [`LockTicket`] so the caller can schedule the expiry.
//! Trade and ClaimTerritory re-check both sides' stock at execution time;
//! a shortfall there is reported as [`RejectionReason::StaleAffordability`].

use crate::action::{Action, ActionPayload};
use crate::config::EngineConfig;
use crate::events::OutboundEvent;
use crate::grid::{BuildingKind, CityGrid, Coord};
use crate::ledger::ResourceLedger;
use crate::locks::{CoordinateLockTable, LockTicket};
use crate::resources::ResourceBundle;
use crate::turn::TurnController;
use crate::validator::RejectionReason;
use civitas_env::PlayerId;
use std::time::Duration;

/// Mutable room state touched by execution.
pub struct ExecutionState<'a> {
    pub grid: &'a mut CityGrid,
    pub ledger: &'a mut ResourceLedger,
    pub locks: &'a mut CoordinateLockTable,
    pub turns: &'a mut TurnController,
    pub config: &'a EngineConfig,
    pub now: Duration,
}

/// What an executed action produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Room-wide events, in emission order
    pub events: Vec<OutboundEvent>,
    /// Lock installed by a Place/Remove
    pub lock: Option<LockTicket>,
    /// Resources credited back (Remove only)
    pub refund: ResourceBundle,
    /// Other player whose pool changed (trade partner or paid previous owner)
    pub counterparty: Option<PlayerId>,
}

pub struct ActionExecutor;

impl ActionExecutor {
    pub fn execute(action: &Action, state: &mut ExecutionState<'_>) -> Result<Execution, RejectionReason> {
        let mut execution = Execution {
            events: Vec::new(),
            lock: None,
            refund: ResourceBundle::EMPTY,
            counterparty: None,
        };

        match &action.payload {
            ActionPayload::AdvanceTurn => {
                state.turns.advance();
            }
            ActionPayload::Place { coord, building } => {
                execution.lock = Some(Self::place(action, *coord, *building, state)?);
            }
            ActionPayload::Remove { coord } => {
                let (ticket, refund) = Self::remove(action, *coord, state)?;
                execution.lock = Some(ticket);
                execution.refund = refund;
            }
            ActionPayload::Trade {
                counterparty: other,
                offer,
                request,
            } => {
                state
                    .ledger
                    .exchange(action.actor, *other, offer, request)
                    .map_err(|_| RejectionReason::StaleAffordability)?;
                execution.counterparty = Some(*other);
            }
            ActionPayload::ClaimTerritory { coord } => {
                execution.counterparty = Self::claim(action, *coord, state)?;
            }
        }

        execution.events.push(OutboundEvent::ActionExecuted {
            action_id: action.id,
            kind: action.kind(),
            actor_id: action.actor,
            coordinate: action.payload.coord(),
            building_kind: action.payload.building(),
            counterparty_id: execution.counterparty,
            timestamp: action.timestamp,
        });

        if matches!(action.payload, ActionPayload::AdvanceTurn) {
            execution.events.push(OutboundEvent::TurnChanged {
                turn_index: state.turns.index(),
                turn_order: state.turns.order().to_vec(),
            });
        }

        Ok(execution)
    }

    fn lock(action: &Action, coord: Coord, state: &mut ExecutionState<'_>) -> Result<LockTicket, RejectionReason> {
        state
            .locks
            .acquire(coord, action.actor, action.id, state.now, state.config.lock_ttl())
            .ok_or(RejectionReason::CoordinateLocked)
    }

    fn place(
        action: &Action,
        coord: Coord,
        building: BuildingKind,
        state: &mut ExecutionState<'_>,
    ) -> Result<LockTicket, RejectionReason> {
        let cost = state
            .config
            .build_costs
            .cost_of(building)
            .copied()
            .ok_or(RejectionReason::InvalidTarget)?;

        let affordable = state
            .ledger
            .pool(action.actor)
            .is_some_and(|pool| pool.can_afford(&cost));
        if !affordable {
            return Err(RejectionReason::InsufficientResources);
        }

        let ticket = Self::lock(action, coord, state)?;
        if let Some(pool) = state.ledger.pool_mut(action.actor) {
            pool.debit(action.actor, &cost)
                .map_err(|_| RejectionReason::InsufficientResources)?;
        }
        state.grid.place(coord, building, action.actor);
        Ok(ticket)
    }

    fn remove(
        action: &Action,
        coord: Coord,
        state: &mut ExecutionState<'_>,
    ) -> Result<(LockTicket, ResourceBundle), RejectionReason> {
        let cell = state.grid.get(coord).cloned().ok_or(RejectionReason::InvalidTarget)?;
        let ticket = Self::lock(action, coord, state)?;

        if !cell.player_placed {
            state.grid.clear_to_grass(coord);
            return Ok((ticket, ResourceBundle::EMPTY));
        }

        // A building taken over by a claim comes down without a refund.
        let refund = if cell.builder == Some(action.actor) {
            state
                .config
                .build_costs
                .cost_of(cell.kind)
                .map(|cost| cost.scaled_floor(state.config.refund_rate))
                .unwrap_or_default()
        } else {
            ResourceBundle::EMPTY
        };

        let landed = state
            .ledger
            .pool_mut(action.actor)
            .map(|pool| pool.credit(&refund))
            .unwrap_or_default();
        state.grid.erase(coord);
        Ok((ticket, landed))
    }

    /// Returns the previous owner when one was paid.
    fn claim(
        action: &Action,
        coord: Coord,
        state: &mut ExecutionState<'_>,
    ) -> Result<Option<PlayerId>, RejectionReason> {
        let previous_owner = state
            .grid
            .get(coord)
            .ok_or(RejectionReason::InvalidTarget)?
            .owner
            .filter(|owner| *owner != action.actor && state.ledger.pool(*owner).is_some());
        let price = state.config.claim_price;

        match previous_owner {
            Some(owner) => {
                state
                    .ledger
                    .transfer(action.actor, owner, &price)
                    .map_err(|_| RejectionReason::StaleAffordability)?;
            }
            None => {
                state
                    .ledger
                    .pool_mut(action.actor)
                    .ok_or(RejectionReason::StaleAffordability)?
                    .debit(action.actor, &price)
                    .map_err(|_| RejectionReason::StaleAffordability)?;
            }
        }

        state.grid.set_owner(coord, Some(action.actor));
        Ok(previous_owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionId;
    use crate::resources::ResourceKind;

    struct Fixture {
        grid: CityGrid,
        ledger: ResourceLedger,
        locks: CoordinateLockTable,
        turns: TurnController,
        config: EngineConfig,
        a: PlayerId,
        b: PlayerId,
    }

    impl Fixture {
        fn new() -> Self {
            let a = PlayerId::from_seed(1);
            let b = PlayerId::from_seed(2);
            let config = EngineConfig::default();
            let mut ledger = ResourceLedger::new(config.starting_resources, config.max_resources);
            ledger.open(a);
            ledger.open(b);
            Self {
                grid: CityGrid::filled(8, 8, BuildingKind::Grass),
                ledger,
                locks: CoordinateLockTable::new(),
                turns: TurnController::from_parts(vec![a, b], 0),
                config,
                a,
                b,
            }
        }

        fn run(&mut self, actor: PlayerId, payload: ActionPayload) -> Result<Execution, RejectionReason> {
            let action = Action {
                id: ActionId(1),
                actor,
                payload,
                timestamp: 42,
            };
            let mut state = ExecutionState {
                grid: &mut self.grid,
                ledger: &mut self.ledger,
                locks: &mut self.locks,
                turns: &mut self.turns,
                config: &self.config,
                now: Duration::from_secs(10),
            };
            ActionExecutor::execute(&action, &mut state)
        }

        fn wood(&self, player: PlayerId) -> u32 {
            self.ledger.pool(player).unwrap().quantity(ResourceKind::Wood)
        }
    }

    #[test]
    fn test_place_debits_locks_and_builds() {
        let mut fx = Fixture::new();
        let at = Coord::new(2, 3);
        let exec = fx
            .run(fx.a, ActionPayload::Place { coord: at, building: BuildingKind::Residential })
            .unwrap();

        assert_eq!(fx.wood(fx.a), 50);
        assert_eq!(fx.grid.get(at).unwrap().kind, BuildingKind::Residential);
        let ticket = exec.lock.unwrap();
        assert_eq!(ticket.coord, at);
        let lock = fx.locks.active(at, Duration::from_secs(14)).unwrap();
        assert_eq!(lock.holder, fx.a);
        assert!(fx.locks.active(at, Duration::from_secs(15)).is_none());

        match &exec.events[0] {
            OutboundEvent::ActionExecuted { building_kind, coordinate, timestamp, .. } => {
                assert_eq!(*building_kind, Some(BuildingKind::Residential));
                assert_eq!(*coordinate, Some(at));
                assert_eq!(*timestamp, 42);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_remove_refunds_half_floored() {
        let mut fx = Fixture::new();
        let at = Coord::new(1, 1);
        fx.run(fx.a, ActionPayload::Place { coord: at, building: BuildingKind::Residential })
            .unwrap();
        assert_eq!(fx.wood(fx.a), 50);

        let exec = fx.run(fx.a, ActionPayload::Remove { coord: at }).unwrap();
        assert_eq!(exec.refund.get(ResourceKind::Wood), 5);
        assert_eq!(fx.wood(fx.a), 55);
        assert_eq!(fx.grid.get(at).unwrap().kind, BuildingKind::Grass);
    }

    #[test]
    fn test_remove_odd_cost_floors() {
        let mut fx = Fixture::new();
        let at = Coord::new(1, 1);
        // Bridge costs 6 wood + 4 ore; refund 3 wood + 2 ore
        fx.run(fx.a, ActionPayload::Place { coord: at, building: BuildingKind::Bridge })
            .unwrap();
        let exec = fx.run(fx.a, ActionPayload::Remove { coord: at }).unwrap();
        assert_eq!(exec.refund.get(ResourceKind::Wood), 3);
        assert_eq!(exec.refund.get(ResourceKind::Ore), 2);
    }

    #[test]
    fn test_remove_terrain_refunds_nothing() {
        let mut fx = Fixture::new();
        let at = Coord::new(4, 4);
        fx.grid = CityGrid::filled(8, 8, BuildingKind::Forest);

        let exec = fx.run(fx.a, ActionPayload::Remove { coord: at }).unwrap();
        assert!(exec.refund.is_empty());
        assert_eq!(fx.wood(fx.a), 60);
        assert_eq!(fx.grid.get(at).unwrap().kind, BuildingKind::Grass);
        assert_eq!(fx.grid.original_terrain(at), Some(BuildingKind::Grass));
    }

    #[test]
    fn test_advance_turn_emits_turn_changed() {
        let mut fx = Fixture::new();
        let exec = fx.run(fx.b, ActionPayload::AdvanceTurn).unwrap();
        assert_eq!(fx.turns.current(), Some(fx.b));
        assert!(exec.lock.is_none());
        assert_eq!(exec.events.len(), 2);
        assert_eq!(
            exec.events[1],
            OutboundEvent::TurnChanged { turn_index: 1, turn_order: vec![fx.a, fx.b] }
        );
    }

    #[test]
    fn test_trade_moves_both_sides() {
        let mut fx = Fixture::new();
        let offer = ResourceBundle::new().with(ResourceKind::Wood, 20);
        let request = ResourceBundle::new().with(ResourceKind::Ore, 10);
        let exec = fx
            .run(fx.a, ActionPayload::Trade { counterparty: fx.b, offer, request })
            .unwrap();

        assert_eq!(fx.wood(fx.a), 40);
        assert_eq!(fx.wood(fx.b), 80);
        assert_eq!(fx.ledger.pool(fx.a).unwrap().quantity(ResourceKind::Ore), 50);
        assert_eq!(fx.ledger.pool(fx.b).unwrap().quantity(ResourceKind::Ore), 30);
        assert!(matches!(
            exec.events[0],
            OutboundEvent::ActionExecuted { counterparty_id: Some(_), .. }
        ));
    }

    #[test]
    fn test_trade_stale_leaves_pools_untouched() {
        let mut fx = Fixture::new();
        let offer = ResourceBundle::new().with(ResourceKind::Wood, 5);
        let request = ResourceBundle::new().with(ResourceKind::Ore, 41);
        let result = fx.run(fx.a, ActionPayload::Trade { counterparty: fx.b, offer, request });

        assert_eq!(result, Err(RejectionReason::StaleAffordability));
        assert_eq!(fx.wood(fx.a), 60);
        assert_eq!(fx.wood(fx.b), 60);
    }

    #[test]
    fn test_claim_pays_previous_owner() {
        let mut fx = Fixture::new();
        let at = Coord::new(5, 5);
        fx.grid.place(at, BuildingKind::Road, fx.b);

        let exec = fx.run(fx.a, ActionPayload::ClaimTerritory { coord: at }).unwrap();
        assert_eq!(fx.grid.get(at).unwrap().owner, Some(fx.a));
        assert_eq!(fx.wood(fx.a), 45);
        assert_eq!(fx.wood(fx.b), 75);
        assert!(matches!(
            exec.events[0],
            OutboundEvent::ActionExecuted { counterparty_id: Some(owner), .. } if owner == fx.b
        ));
    }

    #[test]
    fn test_claimed_building_removed_without_refund() {
        let mut fx = Fixture::new();
        let at = Coord::new(5, 5);
        fx.grid.place(at, BuildingKind::Residential, fx.b);
        fx.run(fx.a, ActionPayload::ClaimTerritory { coord: at }).unwrap();
        let after_claim = fx.wood(fx.a);

        let exec = fx.run(fx.a, ActionPayload::Remove { coord: at }).unwrap();
        assert!(exec.refund.is_empty());
        assert_eq!(fx.wood(fx.a), after_claim);
        assert_eq!(fx.grid.get(at).unwrap().kind, BuildingKind::Grass);
    }

    #[test]
    fn test_claim_from_departed_owner_has_no_counterparty() {
        let mut fx = Fixture::new();
        let at = Coord::new(5, 5);
        fx.grid.place(at, BuildingKind::Road, fx.b);
        fx.ledger.close(fx.b);

        let exec = fx.run(fx.a, ActionPayload::ClaimTerritory { coord: at }).unwrap();
        assert_eq!(fx.wood(fx.a), 45);
        assert_eq!(exec.counterparty, None);
        assert!(matches!(
            exec.events[0],
            OutboundEvent::ActionExecuted { counterparty_id: None, .. }
        ));
    }

    #[test]
    fn test_claim_unowned_only_debits() {
        let mut fx = Fixture::new();
        let at = Coord::new(0, 0);
        fx.run(fx.a, ActionPayload::ClaimTerritory { coord: at }).unwrap();
        assert_eq!(fx.wood(fx.a), 45);
        assert_eq!(fx.wood(fx.b), 60);
    }

    #[test]
    fn test_claim_without_stock_is_stale() {
        let mut fx = Fixture::new();
        fx.ledger.pool_mut(fx.a).unwrap().apply_delta(ResourceKind::Wood, -60);
        let result = fx.run(fx.a, ActionPayload::ClaimTerritory { coord: Coord::new(0, 0) });
        assert_eq!(result, Err(RejectionReason::StaleAffordability));
        assert_eq!(fx.grid.get(Coord::new(0, 0)).unwrap().owner, None);
    }
}
