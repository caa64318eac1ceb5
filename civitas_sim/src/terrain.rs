//! Seeded terrain generation for simulated rooms.
//!
//! The generator owns its own RNG so that changing how many actions a
//! scenario submits never changes the map it plays on.

use civitas_core::{BuildingKind, CityGrid, Coord};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Share of the map each feature tries to cover.
#[derive(Debug, Clone, Copy)]
pub struct TerrainMix {
    pub water: f64,
    pub forest: f64,
    pub mountain: f64,
}

impl Default for TerrainMix {
    fn default() -> Self {
        Self {
            water: 0.08,
            forest: 0.12,
            mountain: 0.05,
        }
    }
}

/// Random-walk blob generator.
pub struct TerrainGenerator {
    rng: ChaCha8Rng,
    mix: TerrainMix,
}

impl TerrainGenerator {
    /// Creates a generator. The terrain seed should be derived separately
    /// from the action seed.
    pub fn new(terrain_seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(terrain_seed),
            mix: TerrainMix::default(),
        }
    }

    pub fn with_mix(mut self, mix: TerrainMix) -> Self {
        self.mix = mix;
        self
    }

    /// Row-major terrain for a `width` x `height` map.
    pub fn generate(&mut self, width: u32, height: u32) -> Vec<BuildingKind> {
        let mut cells = vec![BuildingKind::Grass; (width * height) as usize];
        if cells.is_empty() {
            return cells;
        }

        let area = cells.len() as f64;
        let features = [
            (BuildingKind::Water, self.mix.water),
            (BuildingKind::Forest, self.mix.forest),
            (BuildingKind::Mountain, self.mix.mountain),
        ];
        for (kind, share) in features {
            let target = (area * share).round() as usize;
            self.scatter(&mut cells, width, height, kind, target);
        }
        cells
    }

    /// Generates a ready-to-use grid.
    pub fn grid(&mut self, width: u32, height: u32) -> CityGrid {
        let terrain = self.generate(width, height);
        CityGrid::from_terrain(width, height, terrain).unwrap_or_else(|| CityGrid::filled(width, height, BuildingKind::Grass))
    }

    fn scatter(&mut self, cells: &mut [BuildingKind], width: u32, height: u32, kind: BuildingKind, target: usize) {
        let mut painted = 0;
        let mut attempts = 0;
        while painted < target && attempts < target * 8 + 16 {
            attempts += 1;
            let mut at = Coord::new(
                self.rng.gen_range(0..width as i32),
                self.rng.gen_range(0..height as i32),
            );
            let blob = self.rng.gen_range(3..=8).min(target - painted);
            for _ in 0..blob {
                let index = (at.y as u32 * width + at.x as u32) as usize;
                if cells[index] == BuildingKind::Grass {
                    cells[index] = kind;
                    painted += 1;
                }
                let step = civitas_core::grid::NEIGHBORS_8[self.rng.gen_range(0..8)];
                let next = at.offset(step.0, step.1);
                if next.x >= 0 && next.y >= 0 && (next.x as u32) < width && (next.y as u32) < height {
                    at = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_map() {
        let a = TerrainGenerator::new(7).generate(24, 16);
        let b = TerrainGenerator::new(7).generate(24, 16);
        assert_eq!(a, b);

        let c = TerrainGenerator::new(8).generate(24, 16);
        assert_ne!(a, c);
    }

    #[test]
    fn test_only_terrain_kinds() {
        let cells = TerrainGenerator::new(3).generate(32, 32);
        assert_eq!(cells.len(), 32 * 32);
        assert!(cells.iter().all(|kind| kind.is_terrain()));
        assert!(cells.iter().any(|kind| *kind == BuildingKind::Grass));
    }

    #[test]
    fn test_mix_is_roughly_respected() {
        let cells = TerrainGenerator::new(11).generate(40, 40);
        let water = cells.iter().filter(|k| **k == BuildingKind::Water).count();
        let target = (1600.0 * TerrainMix::default().water).round() as usize;
        assert!(water <= target);
        assert!(water > 0);
    }

    #[test]
    fn test_grid_cells_are_unplaced() {
        let grid = TerrainGenerator::new(5).grid(10, 10);
        assert_eq!(grid.width(), 10);
        assert!(grid.cells().all(|cell| !cell.player_placed && cell.owner.is_none()));
    }

    #[test]
    fn test_empty_map() {
        assert!(TerrainGenerator::new(1).generate(0, 5).is_empty());
    }
}
