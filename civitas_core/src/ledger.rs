//! The resource ledger - per-player pools with capped, clamped quantities.
//!
//! Every mutation path (debit, credit, tick delta, transfer) ends in a clamp
//! to `[0, max]`, so no sequence of operations can leave a quantity outside
//! that range. Debits and transfers are all-or-nothing.

use crate::resources::{ResourceBundle, ResourceKind};
use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("No resource pool for player {0}")]
    UnknownPool(PlayerId),

    #[error("Player {player} has {available} {kind}, needs {needed}")]
    Insufficient {
        player: PlayerId,
        kind: ResourceKind,
        needed: u32,
        available: u32,
    },
}

// =============================================================================
// RESOURCE POOL
// =============================================================================

/// One player's resources plus the rates computed on the last tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    stock: ResourceBundle,
    max: ResourceBundle,
    generation: ResourceBundle,
    consumption: ResourceBundle,
}

/// Read-only view of one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub quantity: u32,
    pub max: u32,
    pub generation_rate: u32,
    pub consumption_rate: u32,
}

/// Snapshot handed to presentation and cooperative-feature collaborators.
pub type PoolSnapshot = BTreeMap<ResourceKind, ResourceEntry>;

impl ResourcePool {
    /// Creates a pool, clamping the starting stock into `[0, max]`.
    pub fn new(starting: ResourceBundle, max: ResourceBundle) -> Self {
        let mut stock = ResourceBundle::EMPTY;
        for kind in ResourceKind::ALL {
            stock.set(kind, starting.get(kind).min(max.get(kind)));
        }
        Self {
            stock,
            max,
            generation: ResourceBundle::EMPTY,
            consumption: ResourceBundle::EMPTY,
        }
    }

    pub fn quantity(&self, kind: ResourceKind) -> u32 {
        self.stock.get(kind)
    }

    pub fn max(&self, kind: ResourceKind) -> u32 {
        self.max.get(kind)
    }

    pub fn stock(&self) -> &ResourceBundle {
        &self.stock
    }

    pub fn can_afford(&self, cost: &ResourceBundle) -> bool {
        self.stock.covers(cost)
    }

    /// The first class the pool cannot cover, as `(kind, needed, available)`.
    pub fn shortfall(&self, cost: &ResourceBundle) -> Option<(ResourceKind, u32, u32)> {
        ResourceKind::ALL
            .iter()
            .find(|k| self.quantity(**k) < cost.get(**k))
            .map(|k| (*k, cost.get(*k), self.quantity(*k)))
    }

    /// Removes `cost` from the pool, or nothing if any class falls short.
    pub fn debit(&mut self, owner: PlayerId, cost: &ResourceBundle) -> Result<(), LedgerError> {
        if let Some((kind, needed, available)) = self.shortfall(cost) {
            return Err(LedgerError::Insufficient {
                player: owner,
                kind,
                needed,
                available,
            });
        }
        for (kind, amount) in cost.iter() {
            self.apply_delta(kind, -(amount as i64));
        }
        Ok(())
    }

    /// Adds `amount` clamped to the maxima; returns what actually landed.
    pub fn credit(&mut self, amount: &ResourceBundle) -> ResourceBundle {
        let mut landed = ResourceBundle::EMPTY;
        for (kind, q) in amount.iter() {
            let before = self.quantity(kind);
            let after = self.apply_delta(kind, q as i64);
            landed.set(kind, after - before);
        }
        landed
    }

    /// Applies a signed delta to one class, clamped to `[0, max]`.
    ///
    /// Returns the new quantity.
    pub fn apply_delta(&mut self, kind: ResourceKind, delta: i64) -> u32 {
        let current = self.stock.get(kind) as i64;
        let max = self.max.get(kind) as i64;
        let next = (current + delta).clamp(0, max) as u32;
        self.stock.set(kind, next);
        next
    }

    /// Records the rates computed on the latest tick.
    pub fn set_rates(&mut self, generation: ResourceBundle, consumption: ResourceBundle) {
        self.generation = generation;
        self.consumption = consumption;
    }

    pub fn generation_rate(&self, kind: ResourceKind) -> u32 {
        self.generation.get(kind)
    }

    pub fn consumption_rate(&self, kind: ResourceKind) -> u32 {
        self.consumption.get(kind)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        ResourceKind::ALL
            .iter()
            .map(|k| {
                (
                    *k,
                    ResourceEntry {
                        quantity: self.quantity(*k),
                        max: self.max(*k),
                        generation_rate: self.generation_rate(*k),
                        consumption_rate: self.consumption_rate(*k),
                    },
                )
            })
            .collect()
    }

    /// True if every class sits inside `[0, max]`.
    pub fn within_bounds(&self) -> bool {
        ResourceKind::ALL.iter().all(|k| self.quantity(*k) <= self.max(*k))
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// All pools of one room, keyed by player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLedger {
    pools: BTreeMap<PlayerId, ResourcePool>,
    starting: ResourceBundle,
    max: ResourceBundle,
}

impl ResourceLedger {
    pub fn new(starting: ResourceBundle, max: ResourceBundle) -> Self {
        Self {
            pools: BTreeMap::new(),
            starting,
            max,
        }
    }

    /// Opens a pool with the starting stock. Existing pools are kept as-is.
    pub fn open(&mut self, player: PlayerId) -> &mut ResourcePool {
        let (starting, max) = (self.starting, self.max);
        self.pools
            .entry(player)
            .or_insert_with(|| ResourcePool::new(starting, max))
    }

    pub fn close(&mut self, player: PlayerId) -> Option<ResourcePool> {
        self.pools.remove(&player)
    }

    pub fn pool(&self, player: PlayerId) -> Option<&ResourcePool> {
        self.pools.get(&player)
    }

    pub fn pool_mut(&mut self, player: PlayerId) -> Option<&mut ResourcePool> {
        self.pools.get_mut(&player)
    }

    pub fn pools(&self) -> impl Iterator<Item = (PlayerId, &ResourcePool)> {
        self.pools.iter().map(|(id, pool)| (*id, pool))
    }

    pub fn pools_mut(&mut self) -> impl Iterator<Item = (PlayerId, &mut ResourcePool)> {
        self.pools.iter_mut().map(|(id, pool)| (*id, pool))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Atomic two-way exchange: `a` gives `a_gives` to `b`, `b` gives `b_gives` to `a`.
    ///
    /// Both sides are checked against current stock before anything moves.
    pub fn exchange(
        &mut self,
        a: PlayerId,
        b: PlayerId,
        a_gives: &ResourceBundle,
        b_gives: &ResourceBundle,
    ) -> Result<(), LedgerError> {
        let pool_a = self.pools.get(&a).ok_or(LedgerError::UnknownPool(a))?;
        let pool_b = self.pools.get(&b).ok_or(LedgerError::UnknownPool(b))?;

        if let Some((kind, needed, available)) = pool_a.shortfall(a_gives) {
            return Err(LedgerError::Insufficient { player: a, kind, needed, available });
        }
        if let Some((kind, needed, available)) = pool_b.shortfall(b_gives) {
            return Err(LedgerError::Insufficient { player: b, kind, needed, available });
        }

        // Both checks passed against the same state, so the debits below cannot fail.
        if let Some(pool) = self.pools.get_mut(&a) {
            pool.debit(a, a_gives)?;
        }
        if let Some(pool) = self.pools.get_mut(&b) {
            pool.debit(b, b_gives)?;
            pool.credit(a_gives);
        }
        if let Some(pool) = self.pools.get_mut(&a) {
            pool.credit(b_gives);
        }
        Ok(())
    }

    /// One-way atomic transfer from `from` to `to`.
    pub fn transfer(&mut self, from: PlayerId, to: PlayerId, amount: &ResourceBundle) -> Result<(), LedgerError> {
        self.exchange(from, to, amount, &ResourceBundle::EMPTY)
    }

    /// Default maxima applied to new pools.
    pub fn max(&self) -> &ResourceBundle {
        &self.max
    }
}
