//! Static build-cost table.
//!
//! Consulted by the validator (affordability), the executor (debit on place,
//! refund on remove) and read-only by clients for affordability hints.

use crate::grid::BuildingKind;
use crate::resources::{ResourceBundle, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from building kind to the resources needed to place it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildCostTable {
    costs: BTreeMap<BuildingKind, ResourceBundle>,
}

/// One row of an affordability hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffordabilityHint {
    pub building_kind: BuildingKind,
    pub cost: ResourceBundle,
    pub affordable: bool,
}

impl BuildCostTable {
    /// An empty table (nothing buildable).
    pub fn empty() -> Self {
        Self {
            costs: BTreeMap::new(),
        }
    }

    /// Sets the cost for one kind. Terrain kinds are ignored.
    pub fn set(&mut self, kind: BuildingKind, cost: ResourceBundle) {
        if !kind.is_terrain() {
            self.costs.insert(kind, cost);
        }
    }

    /// Cost of placing `kind`, or `None` if it is not buildable.
    pub fn cost_of(&self, kind: BuildingKind) -> Option<&ResourceBundle> {
        self.costs.get(&kind)
    }

    pub fn is_buildable(&self, kind: BuildingKind) -> bool {
        self.costs.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BuildingKind, &ResourceBundle)> {
        self.costs.iter().map(|(k, v)| (*k, v))
    }

    /// Every buildable kind, flagged by whether `stock` covers its cost.
    pub fn affordability(&self, stock: &ResourceBundle) -> Vec<AffordabilityHint> {
        self.costs
            .iter()
            .map(|(kind, cost)| AffordabilityHint {
                building_kind: *kind,
                cost: *cost,
                affordable: stock.covers(cost),
            })
            .collect()
    }
}

impl Default for BuildCostTable {
    fn default() -> Self {
        use ResourceKind::*;

        let mut table = Self::empty();
        table.set(BuildingKind::Road, ResourceBundle::new().with(Wood, 2));
        table.set(BuildingKind::Bridge, ResourceBundle::new().with(Wood, 6).with(Ore, 4));
        table.set(BuildingKind::Residential, ResourceBundle::new().with(Wood, 10));
        table.set(BuildingKind::Commercial, ResourceBundle::new().with(Wood, 12).with(Ore, 6));
        table.set(BuildingKind::Industrial, ResourceBundle::new().with(Wood, 10).with(Ore, 10));
        table.set(BuildingKind::PowerPlant, ResourceBundle::new().with(Wood, 5).with(Ore, 20));
        table.set(BuildingKind::LumberMill, ResourceBundle::new().with(Wood, 5));
        table.set(BuildingKind::Mine, ResourceBundle::new().with(Wood, 10));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_all_buildables() {
        let table = BuildCostTable::default();
        for kind in BuildingKind::BUILDABLE {
            assert!(table.is_buildable(kind), "{} missing from cost table", kind);
        }
        assert!(!table.is_buildable(BuildingKind::Grass));
    }

    #[test]
    fn test_terrain_cannot_be_priced() {
        let mut table = BuildCostTable::empty();
        table.set(BuildingKind::Water, ResourceBundle::new().with(ResourceKind::Wood, 1));
        assert!(table.cost_of(BuildingKind::Water).is_none());
    }

    #[test]
    fn test_affordability_hints() {
        let table = BuildCostTable::default();
        let stock = ResourceBundle::new().with(ResourceKind::Wood, 10);
        let hints = table.affordability(&stock);

        let road = hints.iter().find(|h| h.building_kind == BuildingKind::Road).unwrap();
        assert!(road.affordable);
        let plant = hints.iter().find(|h| h.building_kind == BuildingKind::PowerPlant).unwrap();
        assert!(!plant.affordable);
        assert_eq!(hints.len(), BuildingKind::BUILDABLE.len());
    }

    #[test]
    fn test_table_json_roundtrip_shape() {
        let table = BuildCostTable::default();
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["road"]["wood"], 2);
    }
}
