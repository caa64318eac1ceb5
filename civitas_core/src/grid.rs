//! The city grid - terrain, buildings and per-cell ownership.
//!
//! The grid is a dense row-major array of [`BuildingCell`]s. Alongside the
//! live cells it keeps the terrain each cell had when the room was created,
//! so erasing a building always reverts to the original ground.

use civitas_env::PlayerId;
use serde::{Deserialize, Serialize};

/// Offsets of the eight neighbours of a cell.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A grid coordinate. `x` grows east, `y` grows south.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the coordinate shifted by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// BUILDING KINDS
// =============================================================================

/// Tag carried by every cell: either natural terrain or something built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    // Terrain (supplied by the terrain generator)
    Grass,
    Forest,
    Water,
    Mountain,

    // Infrastructure
    Road,
    Bridge,

    // Zones
    Residential,
    Commercial,
    Industrial,

    // Producers
    PowerPlant,
    LumberMill,
    Mine,
}

impl BuildingKind {
    /// Every kind a player may place.
    pub const BUILDABLE: [BuildingKind; 8] = [
        BuildingKind::Road,
        BuildingKind::Bridge,
        BuildingKind::Residential,
        BuildingKind::Commercial,
        BuildingKind::Industrial,
        BuildingKind::PowerPlant,
        BuildingKind::LumberMill,
        BuildingKind::Mine,
    ];

    /// Natural terrain, never placed by a player.
    pub fn is_terrain(self) -> bool {
        matches!(
            self,
            BuildingKind::Grass | BuildingKind::Forest | BuildingKind::Water | BuildingKind::Mountain
        )
    }

    /// Cells that carry traffic and an operability flag.
    pub fn is_road(self) -> bool {
        matches!(self, BuildingKind::Road | BuildingKind::Bridge)
    }

    /// Zones that draw power and need road access to count in the economy.
    pub fn requires_power(self) -> bool {
        matches!(
            self,
            BuildingKind::Residential | BuildingKind::Commercial | BuildingKind::Industrial
        )
    }

    /// Wire name, identical to the serde representation.
    pub fn name(self) -> &'static str {
        match self {
            BuildingKind::Grass => "grass",
            BuildingKind::Forest => "forest",
            BuildingKind::Water => "water",
            BuildingKind::Mountain => "mountain",
            BuildingKind::Road => "road",
            BuildingKind::Bridge => "bridge",
            BuildingKind::Residential => "residential",
            BuildingKind::Commercial => "commercial",
            BuildingKind::Industrial => "industrial",
            BuildingKind::PowerPlant => "power_plant",
            BuildingKind::LumberMill => "lumber_mill",
            BuildingKind::Mine => "mine",
        }
    }
}

impl std::fmt::Display for BuildingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BuildingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grass" => Ok(BuildingKind::Grass),
            "forest" => Ok(BuildingKind::Forest),
            "water" => Ok(BuildingKind::Water),
            "mountain" => Ok(BuildingKind::Mountain),
            "road" => Ok(BuildingKind::Road),
            "bridge" => Ok(BuildingKind::Bridge),
            "residential" => Ok(BuildingKind::Residential),
            "commercial" => Ok(BuildingKind::Commercial),
            "industrial" => Ok(BuildingKind::Industrial),
            "power_plant" | "powerplant" => Ok(BuildingKind::PowerPlant),
            "lumber_mill" | "lumbermill" => Ok(BuildingKind::LumberMill),
            "mine" => Ok(BuildingKind::Mine),
            _ => Err(format!("Unknown building kind: {}", s)),
        }
    }
}

// =============================================================================
// CELLS
// =============================================================================

/// One cell of the city grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingCell {
    /// Position of this cell
    pub coord: Coord,

    /// What currently occupies the cell
    pub kind: BuildingKind,

    /// Owning player, if any
    pub owner: Option<PlayerId>,

    /// True when the current building was placed by a player
    pub player_placed: bool,

    /// Who paid for the current building. Only they are refunded on removal,
    /// even after the territory changes hands.
    #[serde(default)]
    pub builder: Option<PlayerId>,

    /// Derived flag, meaningful for road/bridge cells only
    pub operable: bool,
}

impl BuildingCell {
    /// A fresh terrain cell.
    pub fn terrain(coord: Coord, kind: BuildingKind) -> Self {
        Self {
            coord,
            kind,
            owner: None,
            player_placed: false,
            builder: None,
            operable: true,
        }
    }

    /// True for road/bridge cells currently marked inoperable.
    pub fn is_inoperable_road(&self) -> bool {
        self.kind.is_road() && !self.operable
    }
}

/// The room's grid of cells plus the terrain it started from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityGrid {
    width: u32,
    height: u32,
    cells: Vec<BuildingCell>,
    terrain: Vec<BuildingKind>,
}

impl CityGrid {
    /// Builds a grid from a row-major terrain list.
    ///
    /// Returns `None` if `terrain.len() != width * height`.
    pub fn from_terrain(width: u32, height: u32, terrain: Vec<BuildingKind>) -> Option<Self> {
        if terrain.len() != (width as usize) * (height as usize) {
            return None;
        }

        let cells = terrain
            .iter()
            .enumerate()
            .map(|(i, kind)| {
                let coord = Coord::new((i as u32 % width) as i32, (i as u32 / width) as i32);
                BuildingCell::terrain(coord, *kind)
            })
            .collect();

        Some(Self {
            width,
            height,
            cells,
            terrain,
        })
    }

    /// A grid covered entirely in one terrain kind.
    pub fn filled(width: u32, height: u32, kind: BuildingKind) -> Self {
        let terrain = vec![kind; (width as usize) * (height as usize)];
        Self::from_terrain(width, height, terrain).unwrap_or_else(|| Self {
            width: 0,
            height: 0,
            cells: Vec::new(),
            terrain: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x >= 0 && coord.y >= 0 && (coord.x as u32) < self.width && (coord.y as u32) < self.height
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        if self.in_bounds(coord) {
            Some(coord.y as usize * self.width as usize + coord.x as usize)
        } else {
            None
        }
    }

    pub fn get(&self, coord: Coord) -> Option<&BuildingCell> {
        self.index(coord).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, coord: Coord) -> Option<&mut BuildingCell> {
        self.index(coord).map(move |i| &mut self.cells[i])
    }

    /// Terrain recorded for this coordinate at room creation.
    pub fn original_terrain(&self, coord: Coord) -> Option<BuildingKind> {
        self.index(coord).map(|i| self.terrain[i])
    }

    pub fn cells(&self) -> impl Iterator<Item = &BuildingCell> {
        self.cells.iter()
    }

    pub(crate) fn cells_mut(&mut self) -> impl Iterator<Item = &mut BuildingCell> {
        self.cells.iter_mut()
    }

    /// In-bounds 8-directional neighbours of `coord`.
    pub fn neighbors(&self, coord: Coord) -> impl Iterator<Item = Coord> + '_ {
        NEIGHBORS_8
            .iter()
            .map(move |(dx, dy)| coord.offset(*dx, *dy))
            .filter(move |c| self.in_bounds(*c))
    }

    /// Puts a player building on a cell, replacing whatever was there.
    ///
    /// Returns the previous cell state.
    pub fn place(&mut self, coord: Coord, kind: BuildingKind, owner: PlayerId) -> Option<BuildingCell> {
        let cell = self.get_mut(coord)?;
        let previous = cell.clone();
        cell.kind = kind;
        cell.owner = Some(owner);
        cell.player_placed = true;
        cell.builder = Some(owner);
        cell.operable = true;
        Some(previous)
    }

    /// Reverts a cell to its original terrain and clears ownership.
    ///
    /// Returns the previous cell state.
    pub fn erase(&mut self, coord: Coord) -> Option<BuildingCell> {
        let terrain = self.original_terrain(coord)?;
        let cell = self.get_mut(coord)?;
        let previous = cell.clone();
        *cell = BuildingCell::terrain(coord, terrain);
        Some(previous)
    }

    /// Clears natural terrain (or a pre-existing, non-player structure) to grass.
    ///
    /// The cleared ground becomes the cell's new base terrain. Returns the
    /// previous cell state.
    pub fn clear_to_grass(&mut self, coord: Coord) -> Option<BuildingCell> {
        let i = self.index(coord)?;
        let previous = self.cells[i].clone();
        self.terrain[i] = BuildingKind::Grass;
        self.cells[i] = BuildingCell::terrain(coord, BuildingKind::Grass);
        Some(previous)
    }

    /// Hands a cell to a new owner without touching what is built on it.
    pub fn set_owner(&mut self, coord: Coord, owner: Option<PlayerId>) -> bool {
        match self.get_mut(coord) {
            Some(cell) => {
                cell.owner = owner;
                true
            }
            None => false,
        }
    }

    /// Drops `player`'s ownership everywhere. Buildings stay standing.
    pub fn disown(&mut self, player: PlayerId) -> usize {
        let mut released = 0;
        for cell in self.cells.iter_mut().filter(|cell| cell.owner == Some(player)) {
            cell.owner = None;
            released += 1;
        }
        released
    }

    /// True if any 8-neighbour of `coord` is an operable road or bridge.
    pub fn touches_operable_road(&self, coord: Coord) -> bool {
        self.neighbors(coord)
            .filter_map(|c| self.get(c))
            .any(|cell| cell.kind.is_road() && cell.operable)
    }

    /// Number of road/bridge cells currently marked inoperable.
    pub fn inoperable_road_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_inoperable_road()).count()
    }
}
