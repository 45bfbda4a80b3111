//! Terrain, tile-type and structure definitions.

use ahash::AHashMap;

use super::{MovementTypeId, TerrainId, TileTypeId};
use crate::core::types::Hp;

/// How a terrain behaves under fog of war.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FowVisibility {
    /// Visible when inside some allied unit's vision footprint.
    #[default]
    Normal,
    /// Always revealed, even with no ally nearby.
    AlwaysVisible,
    /// Hidden even inside a vision footprint unless the tile itself or an
    /// orthogonal neighbour is occupied by an allied unit.
    Hidden,
}

/// Static properties of one terrain class.
#[derive(Debug, Clone)]
pub struct TerrainDef {
    pub script_name: String,
    pub name: String,
    /// Capture points for properties; non-capturable terrain uses 0.
    pub max_hp: Hp,
    /// Defence stars granted to an occupying unit.
    pub defence: u32,
    /// Added to the vision range of a unit standing on this terrain.
    pub vision_offset: i32,
    pub fow: FowVisibility,
    move_costs: AHashMap<MovementTypeId, i32>,
}

impl TerrainDef {
    pub fn new(script_name: &str, name: &str) -> Self {
        Self {
            script_name: script_name.to_string(),
            name: name.to_string(),
            max_hp: 0,
            defence: 0,
            vision_offset: 0,
            fow: FowVisibility::Normal,
            move_costs: AHashMap::new(),
        }
    }

    pub fn with_max_hp(mut self, hp: Hp) -> Self {
        self.max_hp = hp;
        self
    }

    pub fn with_defence(mut self, defence: u32) -> Self {
        self.defence = defence;
        self
    }

    pub fn with_vision_offset(mut self, offset: i32) -> Self {
        self.vision_offset = offset;
        self
    }

    pub fn with_fow(mut self, fow: FowVisibility) -> Self {
        self.fow = fow;
        self
    }

    pub fn with_move_cost(mut self, movement: MovementTypeId, cost: i32) -> Self {
        self.move_costs.insert(movement, cost);
        self
    }

    /// Movement cost for the given movement type. `None` when the terrain is
    /// impassable for it (missing or negative entry).
    pub fn move_cost(&self, movement: MovementTypeId) -> Option<i32> {
        match self.move_costs.get(&movement) {
            Some(cost) if *cost >= 0 => Some(*cost),
            _ => None,
        }
    }
}

/// A paintable tile class, mapping onto one terrain.
#[derive(Debug, Clone)]
pub struct TileTypeDef {
    pub script_name: String,
    pub terrain: TerrainId,
}

impl TileTypeDef {
    pub fn new(script_name: &str, terrain: TerrainId) -> Self {
        Self {
            script_name: script_name.to_string(),
            terrain,
        }
    }
}

/// Tile types a structure tile cycles through.
#[derive(Debug, Clone)]
pub struct StructureTileSpec {
    pub normal: TileTypeId,
    pub destroyed: TileTypeId,
    /// Type the tile reverts to when the structure is deleted outright.
    /// `None` means the tile is merely disowned instead of retyped.
    pub deleted: Option<TileTypeId>,
}

/// A structure tile other than the root, placed at a fixed offset from it.
#[derive(Debug, Clone)]
pub struct DependentTile {
    pub offset: (i32, i32),
    pub tiles: StructureTileSpec,
}

/// A multi-tile composite terrain feature with shared destroy/delete
/// semantics.
#[derive(Debug, Clone)]
pub struct StructureDef {
    pub script_name: String,
    pub name: String,
    pub root: StructureTileSpec,
    pub dependents: Vec<DependentTile>,
}

impl StructureDef {
    pub fn new(script_name: &str, name: &str, root: StructureTileSpec) -> Self {
        Self {
            script_name: script_name.to_string(),
            name: name.to_string(),
            root,
            dependents: Vec::new(),
        }
    }

    pub fn with_dependent(mut self, offset: (i32, i32), tiles: StructureTileSpec) -> Self {
        self.dependents.push(DependentTile { offset, tiles });
        self
    }
}
