//! Per-army fog-of-war visibility: the incremental vision cache plus the
//! tile and unit visibility queries that compose it with terrain rules.
//!
//! The cache only tracks which tiles lie inside some unit's vision
//! footprint. Terrain-specific fog rules (always-visible, hidden) are
//! applied at query time, not cache-update time.

use ahash::{AHashMap, AHashSet};

use crate::core::types::{ArmyId, TileCoord, UnitId};
use crate::grid;
use crate::map::Map;

/// Multiset of tiles currently seen by at least one of an army's units.
///
/// Each contributing unit counts once per tile; a tile stays visible until
/// every contributor has withdrawn.
#[derive(Debug, Clone, Default)]
pub struct VisionCache {
    counts: AHashMap<TileCoord, u32>,
}

impl VisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one contribution for every tile in the set.
    pub fn add(&mut self, tiles: &AHashSet<TileCoord>) {
        for &tile in tiles.iter() {
            *self.counts.entry(tile).or_insert(0) += 1;
        }
    }

    /// Withdraw one contribution for every tile in the set. Withdrawing a
    /// tile with no contributions is a no-op.
    pub fn remove(&mut self, tiles: &AHashSet<TileCoord>) {
        for tile in tiles.iter() {
            if let Some(count) = self.counts.get_mut(tile) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(tile);
                }
            }
        }
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        self.counts.contains_key(&tile)
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.counts.keys().copied()
    }
}

impl Map {
    /// Effective vision range of a unit: its type's range plus the terrain
    /// offset under it, never below 1. Off-map units use the bare type range.
    pub fn unit_vision(&self, id: UnitId) -> u32 {
        let Some(unit) = self.units.get(&id) else {
            tracing::error!("unit_vision failed: unit {id} does not exist");
            return 0;
        };
        let vision = self.data.unit_type(unit.unit_type).vision;
        let Some(pos) = unit.position else {
            return vision;
        };
        match self.tile(pos) {
            Some(tile) => {
                let offset = self.data.terrain_of(tile.tile_type).vision_offset;
                (vision as i32 + offset).max(1) as u32
            }
            None => vision,
        }
    }

    /// Every tile inside the unit's vision footprint, including its own.
    /// `None` when the unit is absent or off the map.
    fn unit_footprint(&self, id: UnitId) -> Option<AHashSet<TileCoord>> {
        let pos = self.units.get(&id)?.position?;
        if !self.size.contains(pos) {
            return None;
        }
        let mut tiles = grid::tiles_in_range(self.size, pos, 1, self.unit_vision(id));
        tiles.insert(pos);
        Some(tiles)
    }

    pub(crate) fn add_unit_sight(&mut self, id: UnitId) {
        let Some(tiles) = self.unit_footprint(id) else {
            return;
        };
        let army = self.units[&id].army;
        if let Some(army) = self.armies.get_mut(&army) {
            army.vision.add(&tiles);
        }
    }

    pub(crate) fn remove_unit_sight(&mut self, id: UnitId) {
        let Some(tiles) = self.unit_footprint(id) else {
            return;
        };
        let army = self.units[&id].army;
        if let Some(army) = self.armies.get_mut(&army) {
            army.vision.remove(&tiles);
        }
    }

    /// Rebuild every army's cache from its on-map units. Used after bulk
    /// geometry changes (resize, snapshot replay) where incremental
    /// bookkeeping would chase stale footprints.
    pub(crate) fn recompute_vision_caches(&mut self) {
        for army in self.armies.values_mut() {
            army.vision.clear();
        }
        let footprints: Vec<(ArmyId, AHashSet<TileCoord>)> = self
            .units
            .keys()
            .copied()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|id| {
                let tiles = self.unit_footprint(id)?;
                Some((self.units[&id].army, tiles))
            })
            .collect();
        for (army, tiles) in footprints {
            if let Some(army) = self.armies.get_mut(&army) {
                army.vision.add(&tiles);
            }
        }
    }

    /// Whether a tile is revealed to the given army.
    ///
    /// Composes, in precedence order: fog disabled, always-visible terrain,
    /// teammate-owned tile, then the teammates' vision caches (with the
    /// hidden-terrain adjacency exception).
    pub fn is_tile_visible(&self, pos: TileCoord, army: ArmyId) -> bool {
        if !self.size.contains(pos) {
            tracing::error!(
                "is_tile_visible failed: tile {pos} is out of bounds ({})",
                self.size
            );
            return false;
        }
        let Some(observer) = self.armies.get(&army) else {
            tracing::error!("is_tile_visible failed: army {army} does not exist");
            return false;
        };
        if !self.fow {
            return true;
        }
        let Some(tile) = self.tile(pos) else {
            return false;
        };
        let terrain = self.data.terrain_of(tile.tile_type);
        if terrain.fow == crate::catalog::FowVisibility::AlwaysVisible {
            return true;
        }
        let team = observer.team;
        if let Some(owner) = tile.owner {
            if self.armies.get(&owner).map(|a| a.team) == Some(team) {
                return true;
            }
        }
        for ally in self.armies.values() {
            if ally.team != team || !ally.vision.contains(pos) {
                continue;
            }
            if terrain.fow != crate::catalog::FowVisibility::Hidden {
                return true;
            }
            // Hidden terrain stays dark unless the tile itself or an
            // orthogonal neighbour carries a teammate unit.
            let mut nearby = grid::neighbours(self.size, pos);
            nearby.push(pos);
            for tile in nearby {
                if let Some(unit) = self.unit_on_tile(tile) {
                    if self.team_of_unit(unit) == Some(team) {
                        return true;
                    }
                }
            }
            break;
        }
        false
    }

    /// Whether a unit is revealed to the given army: it must be on the map,
    /// and either not hiding, or betrayed by team, tile ownership or an
    /// adjacent teammate.
    pub fn is_unit_visible(&self, unit: UnitId, army: ArmyId) -> bool {
        if !self.units.contains_key(&unit) {
            tracing::error!("is_unit_visible failed: unit {unit} does not exist");
            return false;
        }
        let Some(observer) = self.armies.get(&army) else {
            tracing::error!("is_unit_visible failed: army {army} does not exist");
            return false;
        };
        let Some(pos) = self.units[&unit].position else {
            return false;
        };
        if !self.units[&unit].hiding {
            return true;
        }
        let team = observer.team;
        if self.team_of_unit(unit) == Some(team) {
            return true;
        }
        if let Some(owner) = self.tile(pos).and_then(|t| t.owner) {
            if self.armies.get(&owner).map(|a| a.team) == Some(team) {
                return true;
            }
        }
        for tile in grid::neighbours(self.size, pos) {
            if let Some(nearby) = self.unit_on_tile(tile) {
                if self.team_of_unit(nearby) == Some(team) {
                    return true;
                }
            }
        }
        false
    }
}
