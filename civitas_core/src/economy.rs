//! The "ECONOMY" engine - fixed-interval recomputation of a chained economy.
//!
//! Resource chain:
//!
//! ```text
//!   LumberMill ──wood──┐
//!   Mine ───────ore────┼──► Industrial ──processed──► Commercial ──goods──► Residential
//!   PowerPlant ─power──┴──────────────────────────────────┴─────────────────────┘
//! ```
//!
//! Each tick, per player:
//! 1. Census: count buildings by kind. Power-requiring zones only count when
//!    they touch an operable road.
//! 2. Primary classes (wood, ore, power) apply their net delta unconditionally.
//! 3. Processed materials apply their net delta only if, at tick start, wood
//!    and ore cover industrial demand and power is positive. Otherwise only
//!    the consumption side applies.
//! 4. Commercial goods follow the same asymmetric rule, gated on processed
//!    materials covering commercial demand and positive power.
//!
//! Every application is clamped to `[0, max]` by the ledger.

use crate::grid::{BuildingKind, CityGrid};
use crate::ledger::ResourcePool;
use crate::resources::{ResourceBundle, ResourceKind};
use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RATES
// =============================================================================

/// What one unit of a building kind produces and consumes per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRate {
    #[serde(default)]
    pub generates: ResourceBundle,
    #[serde(default)]
    pub consumes: ResourceBundle,
}

/// Per-unit rates for every producing/consuming building kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EconomyRates {
    rates: BTreeMap<BuildingKind, UnitRate>,
}

impl EconomyRates {
    pub fn empty() -> Self {
        Self {
            rates: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, kind: BuildingKind, rate: UnitRate) {
        self.rates.insert(kind, rate);
    }

    pub fn rate(&self, kind: BuildingKind) -> UnitRate {
        self.rates.get(&kind).copied().unwrap_or_default()
    }
}

impl Default for EconomyRates {
    fn default() -> Self {
        use ResourceKind::*;

        let mut rates = Self::empty();
        rates.set(
            BuildingKind::LumberMill,
            UnitRate {
                generates: ResourceBundle::new().with(Wood, 4),
                consumes: ResourceBundle::EMPTY,
            },
        );
        rates.set(
            BuildingKind::Mine,
            UnitRate {
                generates: ResourceBundle::new().with(Ore, 3),
                consumes: ResourceBundle::EMPTY,
            },
        );
        rates.set(
            BuildingKind::PowerPlant,
            UnitRate {
                generates: ResourceBundle::new().with(Power, 10),
                consumes: ResourceBundle::EMPTY,
            },
        );
        rates.set(
            BuildingKind::Industrial,
            UnitRate {
                generates: ResourceBundle::new().with(ProcessedMaterials, 3),
                consumes: ResourceBundle::new().with(Wood, 2).with(Ore, 2).with(Power, 2),
            },
        );
        rates.set(
            BuildingKind::Commercial,
            UnitRate {
                generates: ResourceBundle::new().with(CommercialGoods, 3),
                consumes: ResourceBundle::new().with(ProcessedMaterials, 2).with(Power, 1),
            },
        );
        rates.set(
            BuildingKind::Residential,
            UnitRate {
                generates: ResourceBundle::EMPTY,
                consumes: ResourceBundle::new().with(CommercialGoods, 1).with(Power, 1),
            },
        );
        rates
    }
}

// =============================================================================
// CENSUS
// =============================================================================

/// Building counts for one player, as used by one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    counts: BTreeMap<BuildingKind, u32>,
    /// Zones skipped because no operable road touches them
    pub disconnected_zones: u32,
}

impl Census {
    /// Counts `owner`'s buildings on `grid`.
    ///
    /// Zones that need power are only counted when an operable road touches
    /// them; producers are counted unconditionally.
    pub fn take(grid: &CityGrid, owner: PlayerId) -> Self {
        let mut census = Census::default();
        for cell in grid.cells().filter(|c| c.owner == Some(owner)) {
            if cell.kind.is_terrain() || cell.kind.is_road() {
                continue;
            }
            if cell.kind.requires_power() && !grid.touches_operable_road(cell.coord) {
                census.disconnected_zones += 1;
                continue;
            }
            *census.counts.entry(cell.kind).or_insert(0) += 1;
        }
        census
    }

    pub fn count(&self, kind: BuildingKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total generation and consumption implied by this census.
    pub fn rates(&self, table: &EconomyRates) -> (ResourceBundle, ResourceBundle) {
        let mut generation = ResourceBundle::EMPTY;
        let mut consumption = ResourceBundle::EMPTY;
        for (kind, count) in &self.counts {
            let unit = table.rate(*kind);
            for (resource, q) in unit.generates.times(*count).iter() {
                generation.add(resource, q);
            }
            for (resource, q) in unit.consumes.times(*count).iter() {
                consumption.add(resource, q);
            }
        }
        (generation, consumption)
    }
}

// =============================================================================
// TICK
// =============================================================================

/// What happened to one pool during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTick {
    pub generation: ResourceBundle,
    pub consumption: ResourceBundle,
    /// True if processed-materials generation was applied
    pub processed_gated_open: bool,
    /// True if commercial-goods generation was applied
    pub goods_gated_open: bool,
    pub power_before: u32,
    pub power_after: u32,
}

/// Stateless per-pool tick application.
pub struct EconomyTicker;

impl EconomyTicker {
    /// Applies one tick to `pool` from a census.
    pub fn apply(pool: &mut ResourcePool, census: &Census, table: &EconomyRates) -> PoolTick {
        use ResourceKind::*;

        let (generation, consumption) = census.rates(table);
        let start = *pool.stock();
        let power_positive = start.get(Power) > 0;

        // Requirements are the consumption of the stage that makes each derived class.
        let industrial = table.rate(BuildingKind::Industrial).consumes.times(census.count(BuildingKind::Industrial));
        let commercial = table.rate(BuildingKind::Commercial).consumes.times(census.count(BuildingKind::Commercial));

        for kind in ResourceKind::PRIMARY {
            pool.apply_delta(kind, net(&generation, &consumption, kind));
        }

        let processed_open = power_positive
            && start.get(Wood) >= industrial.get(Wood)
            && start.get(Ore) >= industrial.get(Ore);
        apply_gated(pool, &generation, &consumption, ProcessedMaterials, processed_open);

        let goods_open = power_positive && start.get(ProcessedMaterials) >= commercial.get(ProcessedMaterials);
        apply_gated(pool, &generation, &consumption, CommercialGoods, goods_open);

        pool.set_rates(generation, consumption);

        PoolTick {
            generation,
            consumption,
            processed_gated_open: processed_open,
            goods_gated_open: goods_open,
            power_before: start.get(Power),
            power_after: pool.quantity(Power),
        }
    }
}

fn net(generation: &ResourceBundle, consumption: &ResourceBundle, kind: ResourceKind) -> i64 {
    generation.get(kind) as i64 - consumption.get(kind) as i64
}

fn apply_gated(
    pool: &mut ResourcePool,
    generation: &ResourceBundle,
    consumption: &ResourceBundle,
    kind: ResourceKind,
    open: bool,
) {
    let delta = if open {
        net(generation, consumption, kind)
    } else {
        -(consumption.get(kind) as i64)
    };
    pool.apply_delta(kind, delta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Coord;
    use ResourceKind::*;

    fn caps() -> ResourceBundle {
        ResourceKind::ALL.iter().map(|k| (*k, 1000)).collect()
    }

    fn build(grid: &mut CityGrid, owner: PlayerId, cells: &[(i32, i32, BuildingKind)]) {
        for (x, y, kind) in cells {
            grid.place(Coord::new(*x, *y), *kind, owner);
        }
    }

    #[test]
    fn test_census_skips_zones_without_road() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(6, 6, BuildingKind::Grass);
        build(
            &mut grid,
            owner,
            &[
                (0, 0, BuildingKind::Residential),
                (4, 4, BuildingKind::Residential),
                (5, 5, BuildingKind::Road),
                (2, 2, BuildingKind::PowerPlant),
            ],
        );

        let census = Census::take(&grid, owner);
        assert_eq!(census.count(BuildingKind::Residential), 1);
        assert_eq!(census.count(BuildingKind::PowerPlant), 1);
        assert_eq!(census.disconnected_zones, 1);
    }

    #[test]
    fn test_census_ignores_other_owners() {
        let a = PlayerId::from_seed(1);
        let b = PlayerId::from_seed(2);
        let mut grid = CityGrid::filled(4, 4, BuildingKind::Grass);
        build(&mut grid, a, &[(0, 0, BuildingKind::Mine)]);
        build(&mut grid, b, &[(1, 0, BuildingKind::Mine)]);
        assert_eq!(Census::take(&grid, a).count(BuildingKind::Mine), 1);
    }

    #[test]
    fn test_primary_deltas_apply() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(4, 4, BuildingKind::Grass);
        build(&mut grid, owner, &[(0, 0, BuildingKind::LumberMill), (1, 0, BuildingKind::Mine)]);

        let mut pool = ResourcePool::new(ResourceBundle::EMPTY, caps());
        let tick = EconomyTicker::apply(&mut pool, &Census::take(&grid, owner), &EconomyRates::default());
        assert_eq!(pool.quantity(Wood), 4);
        assert_eq!(pool.quantity(Ore), 3);
        assert_eq!(tick.generation.get(Wood), 4);
        assert_eq!(pool.generation_rate(Ore), 3);
    }

    #[test]
    fn test_zero_power_suppresses_generation_but_not_consumption() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(6, 6, BuildingKind::Grass);
        build(
            &mut grid,
            owner,
            &[
                (0, 1, BuildingKind::Road),
                (1, 1, BuildingKind::Road),
                (2, 1, BuildingKind::Road),
                (0, 0, BuildingKind::Industrial),
                (1, 0, BuildingKind::Commercial),
                (2, 0, BuildingKind::Residential),
            ],
        );

        let starting = ResourceBundle::new()
            .with(Wood, 50)
            .with(Ore, 50)
            .with(ProcessedMaterials, 10)
            .with(CommercialGoods, 10);
        let mut pool = ResourcePool::new(starting, caps());
        let tick = EconomyTicker::apply(&mut pool, &Census::take(&grid, owner), &EconomyRates::default());

        assert!(!tick.processed_gated_open);
        assert!(!tick.goods_gated_open);
        // Commercial eats 2 processed, industrial output suppressed
        assert_eq!(pool.quantity(ProcessedMaterials), 8);
        // Residential eats 1 goods, commercial output suppressed
        assert_eq!(pool.quantity(CommercialGoods), 9);
        // Primaries still consumed
        assert_eq!(pool.quantity(Wood), 48);
        assert_eq!(pool.quantity(Power), 0);
    }

    #[test]
    fn test_gates_open_with_power_and_inputs() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(6, 6, BuildingKind::Grass);
        build(
            &mut grid,
            owner,
            &[
                (0, 1, BuildingKind::Road),
                (1, 1, BuildingKind::Road),
                (0, 0, BuildingKind::Industrial),
                (1, 0, BuildingKind::Commercial),
            ],
        );

        let starting = ResourceBundle::new()
            .with(Wood, 10)
            .with(Ore, 10)
            .with(ProcessedMaterials, 2)
            .with(Power, 5);
        let mut pool = ResourcePool::new(starting, caps());
        let tick = EconomyTicker::apply(&mut pool, &Census::take(&grid, owner), &EconomyRates::default());

        assert!(tick.processed_gated_open);
        assert!(tick.goods_gated_open);
        assert_eq!(pool.quantity(ProcessedMaterials), 3); // 2 + 3 - 2
        assert_eq!(pool.quantity(CommercialGoods), 3);
        assert_eq!(pool.quantity(Power), 2); // 5 - 2 - 1
    }

    #[test]
    fn test_short_inputs_close_processed_gate() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(4, 4, BuildingKind::Grass);
        build(&mut grid, owner, &[(0, 1, BuildingKind::Road), (0, 0, BuildingKind::Industrial)]);

        let starting = ResourceBundle::new().with(Wood, 1).with(Ore, 10).with(Power, 10);
        let mut pool = ResourcePool::new(starting, caps());
        let tick = EconomyTicker::apply(&mut pool, &Census::take(&grid, owner), &EconomyRates::default());

        assert!(!tick.processed_gated_open);
        assert_eq!(pool.quantity(ProcessedMaterials), 0);
        // Clamped at zero rather than going negative
        assert_eq!(pool.quantity(Wood), 0);
    }
}
