//! Operability propagation - power outages knock out the roads around zones.
//!
//! When a player's power pool hits zero, every road/bridge cell reachable
//! from that player's power-requiring zones (walking 8-directionally through
//! contiguous road cells only) is marked inoperable. Zones touching only
//! inoperable roads drop out of the economy census, which feeds back into
//! power consumption.
//!
//! Traversal is an iterative BFS with an explicit visited set, so stack
//! depth does not grow with the road network.

use crate::grid::{CityGrid, Coord};
use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Result of one propagation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperabilityChange {
    /// Road cells that went from operable to inoperable
    pub marked: Vec<Coord>,
    /// Road cells that went from inoperable to operable
    pub restored: Vec<Coord>,
}

impl OperabilityChange {
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty() && self.restored.is_empty()
    }
}

pub struct OperabilityPropagator;

impl OperabilityPropagator {
    /// Road cells reachable from power-requiring zones owned by any of `owners`.
    pub fn reachable_roads(grid: &CityGrid, owners: &BTreeSet<PlayerId>) -> HashSet<Coord> {
        let mut visited: HashSet<Coord> = HashSet::new();
        let mut frontier: VecDeque<Coord> = VecDeque::new();

        let seeds = grid.cells().filter(|cell| {
            cell.kind.requires_power() && cell.owner.is_some_and(|owner| owners.contains(&owner))
        });

        for zone in seeds {
            for next in grid.neighbors(zone.coord) {
                let is_road = grid.get(next).is_some_and(|c| c.kind.is_road());
                if is_road && visited.insert(next) {
                    frontier.push_back(next);
                }
            }
        }

        while let Some(coord) = frontier.pop_front() {
            for next in grid.neighbors(coord) {
                let is_road = grid.get(next).is_some_and(|c| c.kind.is_road());
                if is_road && visited.insert(next) {
                    frontier.push_back(next);
                }
            }
        }

        visited
    }

    /// Marks every road reachable from `owners`' zones inoperable.
    ///
    /// Returns the coordinates that changed state.
    pub fn mark_outage(grid: &mut CityGrid, owners: &BTreeSet<PlayerId>) -> Vec<Coord> {
        let reachable = Self::reachable_roads(grid, owners);
        let mut marked: Vec<Coord> = Vec::new();
        for coord in reachable {
            if let Some(cell) = grid.get_mut(coord) {
                if cell.operable {
                    cell.operable = false;
                    marked.push(coord);
                }
            }
        }
        marked.sort();
        marked
    }

    /// Clears every inoperable marking in one pass.
    pub fn clear(grid: &mut CityGrid) -> Vec<Coord> {
        let mut restored = Vec::new();
        for cell in grid.cells_mut() {
            if !cell.operable {
                cell.operable = true;
                if cell.kind.is_road() {
                    restored.push(cell.coord);
                }
            }
        }
        restored.sort();
        restored
    }

    /// Clears all markings, then re-marks from every player still in outage.
    ///
    /// Reports the net change against the state before the call.
    pub fn refresh(grid: &mut CityGrid, outages: &BTreeSet<PlayerId>) -> OperabilityChange {
        let before: BTreeSet<Coord> = grid
            .cells()
            .filter(|c| c.is_inoperable_road())
            .map(|c| c.coord)
            .collect();

        Self::clear(grid);
        if !outages.is_empty() {
            Self::mark_outage(grid, outages);
        }

        let after: BTreeSet<Coord> = grid
            .cells()
            .filter(|c| c.is_inoperable_road())
            .map(|c| c.coord)
            .collect();

        OperabilityChange {
            marked: after.difference(&before).copied().collect(),
            restored: before.difference(&after).copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BuildingKind;

    fn owners(ids: &[PlayerId]) -> BTreeSet<PlayerId> {
        ids.iter().copied().collect()
    }

    /// Row of roads along y = 1 from x = 0..len, zone at (0, 0).
    fn road_strip(len: i32, owner: PlayerId) -> CityGrid {
        let mut grid = CityGrid::filled(10, 10, BuildingKind::Grass);
        for x in 0..len {
            grid.place(Coord::new(x, 1), BuildingKind::Road, owner);
        }
        grid.place(Coord::new(0, 0), BuildingKind::Commercial, owner);
        grid
    }

    #[test]
    fn test_flood_follows_contiguous_roads_only() {
        let owner = PlayerId::from_seed(1);
        let mut grid = road_strip(4, owner);
        // Disconnected road segment
        grid.place(Coord::new(8, 8), BuildingKind::Road, owner);

        let marked = OperabilityPropagator::mark_outage(&mut grid, &owners(&[owner]));
        assert_eq!(marked.len(), 4);
        assert!(grid.get(Coord::new(8, 8)).unwrap().operable);
        assert!(!grid.get(Coord::new(3, 1)).unwrap().operable);
    }

    #[test]
    fn test_flood_walks_diagonals_and_bridges() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(6, 6, BuildingKind::Water);
        grid.place(Coord::new(0, 0), BuildingKind::Industrial, owner);
        grid.place(Coord::new(1, 1), BuildingKind::Road, owner);
        grid.place(Coord::new(2, 2), BuildingKind::Bridge, owner);
        grid.place(Coord::new(3, 3), BuildingKind::Road, owner);

        let reachable = OperabilityPropagator::reachable_roads(&grid, &owners(&[owner]));
        assert_eq!(reachable.len(), 3);
    }

    #[test]
    fn test_other_owners_zones_do_not_seed() {
        let a = PlayerId::from_seed(1);
        let b = PlayerId::from_seed(2);
        let mut grid = road_strip(3, a);

        let marked = OperabilityPropagator::mark_outage(&mut grid, &owners(&[b]));
        assert!(marked.is_empty());
        assert_eq!(grid.inoperable_road_count(), 0);
    }

    #[test]
    fn test_clear_restores_everything() {
        let owner = PlayerId::from_seed(1);
        let mut grid = road_strip(5, owner);
        OperabilityPropagator::mark_outage(&mut grid, &owners(&[owner]));
        assert_eq!(grid.inoperable_road_count(), 5);

        let restored = OperabilityPropagator::clear(&mut grid);
        assert_eq!(restored.len(), 5);
        assert_eq!(grid.inoperable_road_count(), 0);
    }

    #[test]
    fn test_refresh_reports_net_change() {
        let owner = PlayerId::from_seed(1);
        let mut grid = road_strip(3, owner);

        let change = OperabilityPropagator::refresh(&mut grid, &owners(&[owner]));
        assert_eq!(change.marked.len(), 3);
        assert!(change.restored.is_empty());

        // Same outage again: nothing changes
        let change = OperabilityPropagator::refresh(&mut grid, &owners(&[owner]));
        assert!(change.is_empty());

        let change = OperabilityPropagator::refresh(&mut grid, &BTreeSet::new());
        assert_eq!(change.restored.len(), 3);
    }

    #[test]
    fn test_large_network_does_not_recurse() {
        let owner = PlayerId::from_seed(1);
        let mut grid = CityGrid::filled(300, 300, BuildingKind::Road);
        grid.place(Coord::new(0, 0), BuildingKind::Residential, owner);

        let reachable = OperabilityPropagator::reachable_roads(&grid, &owners(&[owner]));
        assert_eq!(reachable.len(), 300 * 300 - 1);
    }
}
