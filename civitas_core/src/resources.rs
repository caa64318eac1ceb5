//! Resource classes and fixed-size resource bundles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The five resource classes of the economy.
///
/// Wood, ore and power are primary. Processed materials are made from the
/// primaries by industry; commercial goods are made from processed materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Wood,
    Ore,
    ProcessedMaterials,
    CommercialGoods,
    Power,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Wood,
        ResourceKind::Ore,
        ResourceKind::ProcessedMaterials,
        ResourceKind::CommercialGoods,
        ResourceKind::Power,
    ];

    /// Classes whose net delta is applied unconditionally each tick.
    pub const PRIMARY: [ResourceKind; 3] = [ResourceKind::Wood, ResourceKind::Ore, ResourceKind::Power];

    pub fn index(self) -> usize {
        match self {
            ResourceKind::Wood => 0,
            ResourceKind::Ore => 1,
            ResourceKind::ProcessedMaterials => 2,
            ResourceKind::CommercialGoods => 3,
            ResourceKind::Power => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Ore => "ore",
            ResourceKind::ProcessedMaterials => "processedMaterials",
            ResourceKind::CommercialGoods => "commercialGoods",
            ResourceKind::Power => "power",
        }
    }

    pub fn is_primary(self) -> bool {
        Self::PRIMARY.contains(&self)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A quantity for each resource class.
///
/// Serialized as a sparse map (`{"wood": 10}`), zero entries omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ResourceKind, u32>", into = "BTreeMap<ResourceKind, u32>")]
pub struct ResourceBundle([u32; 5]);

impl ResourceBundle {
    pub const EMPTY: ResourceBundle = ResourceBundle([0; 5]);

    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Builder-style setter.
    pub fn with(mut self, kind: ResourceKind, amount: u32) -> Self {
        self.0[kind.index()] = amount;
        self
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: ResourceKind, amount: u32) {
        self.0[kind.index()] = amount;
    }

    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        let slot = &mut self.0[kind.index()];
        *slot = slot.saturating_add(amount);
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|q| *q == 0)
    }

    /// Non-zero entries in class order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        ResourceKind::ALL
            .iter()
            .map(move |k| (*k, self.get(*k)))
            .filter(|(_, q)| *q > 0)
    }

    /// Every entry scaled by `rate` and floored.
    pub fn scaled_floor(&self, rate: f64) -> Self {
        let mut out = Self::EMPTY;
        for kind in ResourceKind::ALL {
            out.set(kind, (self.get(kind) as f64 * rate).floor().max(0.0) as u32);
        }
        out
    }

    /// Entry-wise multiplication by a count.
    pub fn times(&self, count: u32) -> Self {
        let mut out = Self::EMPTY;
        for kind in ResourceKind::ALL {
            out.set(kind, self.get(kind).saturating_mul(count));
        }
        out
    }

    /// True if every entry of `self` is at least the matching entry of `other`.
    pub fn covers(&self, other: &ResourceBundle) -> bool {
        ResourceKind::ALL.iter().all(|k| self.get(*k) >= other.get(*k))
    }
}

impl From<BTreeMap<ResourceKind, u32>> for ResourceBundle {
    fn from(map: BTreeMap<ResourceKind, u32>) -> Self {
        let mut bundle = Self::EMPTY;
        for (kind, amount) in map {
            bundle.set(kind, amount);
        }
        bundle
    }
}

impl From<ResourceBundle> for BTreeMap<ResourceKind, u32> {
    fn from(bundle: ResourceBundle) -> Self {
        bundle.iter().collect()
    }
}

impl FromIterator<(ResourceKind, u32)> for ResourceBundle {
    fn from_iter<I: IntoIterator<Item = (ResourceKind, u32)>>(iter: I) -> Self {
        let mut bundle = Self::EMPTY;
        for (kind, amount) in iter {
            bundle.add(kind, amount);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_sparse_json() {
        let bundle = ResourceBundle::new()
            .with(ResourceKind::Wood, 10)
            .with(ResourceKind::Power, 2);
        let json = serde_json::to_string(&bundle).unwrap();
        assert_eq!(json, r#"{"wood":10,"power":2}"#);

        let back: ResourceBundle = serde_json::from_str(r#"{"processedMaterials":4}"#).unwrap();
        assert_eq!(back.get(ResourceKind::ProcessedMaterials), 4);
        assert_eq!(back.get(ResourceKind::Wood), 0);
    }

    #[test]
    fn test_scaled_floor_halves_and_floors() {
        let bundle = ResourceBundle::new()
            .with(ResourceKind::Wood, 10)
            .with(ResourceKind::Ore, 7);
        let half = bundle.scaled_floor(0.5);
        assert_eq!(half.get(ResourceKind::Wood), 5);
        assert_eq!(half.get(ResourceKind::Ore), 3);
    }

    #[test]
    fn test_covers() {
        let have = ResourceBundle::new().with(ResourceKind::Wood, 5);
        assert!(have.covers(&ResourceBundle::new().with(ResourceKind::Wood, 5)));
        assert!(!have.covers(&ResourceBundle::new().with(ResourceKind::Ore, 1)));
        assert!(have.covers(&ResourceBundle::EMPTY));
    }
}
