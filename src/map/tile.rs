//! Tiles: type, capture points, ownership, occupancy, multi-tile structures
//! and the bounds-checked geometry queries.

use std::sync::Arc;

use ahash::AHashSet;

use crate::catalog::{GameData, StructureId, TileTypeId};
use crate::core::types::{ArmyId, Hp, TileCoord, UnitId};
use crate::grid::{self, Direction};
use crate::map::journal::MapOperation;
use crate::map::{Map, MapEvent};

/// Membership of a tile in a multi-tile structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileStructure {
    pub structure: StructureId,
    /// Offset from the structure's root tile; `(0, 0)` marks the root.
    pub offset: (i32, i32),
    pub destroyed: bool,
}

/// One cell of the tile grid.
#[derive(Debug, Clone)]
pub struct Tile {
    pub tile_type: TileTypeId,
    /// Capture points, kept within `0..=terrain max`.
    pub hp: Hp,
    pub owner: Option<ArmyId>,
    pub occupant: Option<UnitId>,
    pub structure: Option<TileStructure>,
}

impl Tile {
    pub fn new(data: &GameData, tile_type: TileTypeId) -> Self {
        Self {
            tile_type,
            hp: data.terrain_of(tile_type).max_hp,
            owner: None,
            occupant: None,
            structure: None,
        }
    }
}

impl Map {
    /// Retype a tile. If the tile belongs to a structure the whole structure
    /// is deleted first (each member reverts to its deleted type or is
    /// disowned). The tile's capture points reset to the new terrain's
    /// maximum and its owner is cleared; an occupying unit has its vision
    /// footprint recomputed around the change and any capture interrupted.
    pub fn set_tile_type(&mut self, pos: TileCoord, tile_type: TileTypeId) -> bool {
        if !self.size.contains(pos) {
            tracing::error!(
                "set_tile_type cancelled: cannot retype tile {pos}, out of bounds ({})",
                self.size
            );
            return false;
        }
        // Deliberately no equal-value early return: repainting the same type
        // still tears down an attached structure and resets the tile.
        self.with_memento(MapOperation::TileType, |m| {
            if m.tile(pos).is_some_and(|t| t.structure.is_some()) {
                m.dismantle_structure_at(pos);
            }
            let occupant = m.unit_on_tile(pos);
            if let Some(unit) = occupant {
                m.remove_unit_sight(unit);
            }
            if let Some(unit) = occupant {
                m.interrupt_capture(unit);
            }
            let max_hp = m.data.terrain_of(tile_type).max_hp;
            if let Some(tile) = m.tile_mut(pos) {
                tile.tile_type = tile_type;
                tile.hp = max_hp;
            }
            m.set_tile_owner(pos, None);
            if let Some(unit) = occupant {
                m.add_unit_sight(unit);
            }
            m.push_event(MapEvent::TileChanged(pos));
            true
        })
    }

    pub fn tile_type(&self, pos: TileCoord) -> Option<TileTypeId> {
        match self.tile(pos) {
            Some(t) => Some(t.tile_type),
            None => {
                tracing::error!(
                    "tile_type failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                None
            }
        }
    }

    /// Every tile a `set_tile_type` at this position would touch: the tile
    /// itself plus, when it belongs to a structure, every member of that
    /// structure. The compute half of the two-phase cascade.
    pub fn query_tile_type_change(&self, pos: TileCoord) -> AHashSet<TileCoord> {
        let mut affected = AHashSet::new();
        if !self.size.contains(pos) {
            tracing::error!(
                "query_tile_type_change failed: tile {pos} is out of bounds ({})",
                self.size
            );
            return affected;
        }
        affected.insert(pos);
        if let Some(ts) = self.tile(pos).and_then(|t| t.structure.clone()) {
            if let Some(root) = pos.offset(-ts.offset.0, -ts.offset.1) {
                affected.insert(root);
                for dep in &self.data.structure(ts.structure).dependents {
                    if let Some(member) = root.offset(dep.offset.0, dep.offset.1) {
                        affected.insert(member);
                    }
                }
            }
        }
        affected
    }

    /// Delete the structure the given tile belongs to: every member loses
    /// its structure data, then reverts to its configured deleted type (or
    /// is merely disowned when it has none). The apply half of the cascade.
    fn dismantle_structure_at(&mut self, pos: TileCoord) {
        let Some(ts) = self.tile(pos).and_then(|t| t.structure.clone()) else {
            return;
        };
        let Some(root) = pos.offset(-ts.offset.0, -ts.offset.1) else {
            tracing::warn!("structure at {pos} has an offset pointing off the grid, clearing it");
            self.set_tile_structure_data(pos, None, (0, 0), false);
            return;
        };
        let data = Arc::clone(&self.data);
        let def = data.structure(ts.structure);
        let mut members = vec![(root, def.root.deleted)];
        for dep in &def.dependents {
            if let Some(member) = root.offset(dep.offset.0, dep.offset.1) {
                members.push((member, dep.tiles.deleted));
            }
        }
        for (member, deleted) in members {
            if !self.size.contains(member) {
                continue;
            }
            // Detach first so the recursive retype cannot cascade again.
            self.set_tile_structure_data(member, None, (0, 0), false);
            match deleted {
                Some(tile_type) => {
                    self.set_tile_type(member, tile_type);
                }
                None => self.set_tile_owner(member, None),
            }
        }
    }

    pub fn tile_hp(&self, pos: TileCoord) -> Hp {
        match self.tile(pos) {
            Some(t) => t.hp,
            None => {
                tracing::error!(
                    "tile_hp failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                0
            }
        }
    }

    /// Set a tile's capture points, clamped into `0..=terrain max`.
    pub fn set_tile_hp(&mut self, pos: TileCoord, hp: Hp) {
        let Some(tile) = self.tile(pos) else {
            tracing::error!(
                "set_tile_hp cancelled: tile {pos} is out of bounds ({})",
                self.size
            );
            return;
        };
        let hp = hp.clamp(0, self.data.terrain_of(tile.tile_type).max_hp);
        if tile.hp == hp {
            return;
        }
        self.with_memento(MapOperation::TileHp, |m| {
            if let Some(tile) = m.tile_mut(pos) {
                tile.hp = hp;
            }
            m.push_event(MapEvent::TileChanged(pos));
        });
    }

    pub fn tile_owner(&self, pos: TileCoord) -> Option<ArmyId> {
        match self.tile(pos) {
            Some(t) => t.owner,
            None => {
                tracing::error!(
                    "tile_owner failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                None
            }
        }
    }

    /// Reassign tile ownership, keeping the army owned-tile sets in lock
    /// step. A capture on the tile is interrupted: the owner just changed
    /// out from under it.
    pub fn set_tile_owner(&mut self, pos: TileCoord, owner: Option<ArmyId>) {
        if !self.size.contains(pos) {
            tracing::error!(
                "set_tile_owner cancelled: tile {pos} is out of bounds ({})",
                self.size
            );
            return;
        }
        if let Some(army) = owner {
            if !self.armies.contains_key(&army) {
                tracing::error!("set_tile_owner cancelled: army {army} does not exist");
                return;
            }
        }
        let previous = self.tile(pos).and_then(|t| t.owner);
        if previous == owner {
            return;
        }
        self.with_memento(MapOperation::TileOwner, |m| {
            if let Some(unit) = m.unit_on_tile(pos) {
                m.interrupt_capture(unit);
            }
            if let Some(old) = previous.and_then(|a| m.armies.get_mut(&a)) {
                old.tiles.remove(&pos);
            }
            if let Some(new) = owner.and_then(|a| m.armies.get_mut(&a)) {
                new.tiles.insert(pos);
            }
            if let Some(tile) = m.tile_mut(pos) {
                tile.owner = owner;
            }
            m.push_event(MapEvent::TileChanged(pos));
        });
    }

    /// The unit standing on a tile. Loaded units are invisible here: the
    /// occupant slot only tracks units actually on the map.
    pub fn unit_on_tile(&self, pos: TileCoord) -> Option<UnitId> {
        let Some(tile) = self.tile(pos) else {
            tracing::error!(
                "unit_on_tile failed: tile {pos} is out of bounds ({})",
                self.size
            );
            return None;
        };
        tile.occupant
            .filter(|id| self.units.get(id).is_some_and(|u| u.is_on_map()))
    }

    /// Attach or detach a tile's structure membership record.
    pub fn set_tile_structure_data(
        &mut self,
        pos: TileCoord,
        structure: Option<StructureId>,
        offset: (i32, i32),
        destroyed: bool,
    ) {
        if !self.size.contains(pos) {
            tracing::error!(
                "set_tile_structure_data cancelled: tile {pos} is out of bounds ({})",
                self.size
            );
            return;
        }
        if structure.is_some() {
            let root = pos.offset(-offset.0, -offset.1);
            if !root.is_some_and(|r| self.size.contains(r)) {
                tracing::error!(
                    "set_tile_structure_data cancelled: offset {offset:?} from {pos} places the root off the {} grid",
                    self.size
                );
                return;
            }
        }
        let new_value = structure.map(|structure| TileStructure {
            structure,
            offset,
            destroyed,
        });
        if self.tile(pos).map(|t| t.structure.clone()) == Some(new_value.clone()) {
            return;
        }
        self.with_memento(MapOperation::TileStructure, |m| {
            if let Some(tile) = m.tile_mut(pos) {
                tile.structure = new_value;
            }
            m.push_event(MapEvent::TileChanged(pos));
        });
    }

    pub fn tile_structure(&self, pos: TileCoord) -> Option<StructureId> {
        match self.tile(pos) {
            Some(t) => t.structure.as_ref().map(|s| s.structure),
            None => {
                tracing::error!(
                    "tile_structure failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                None
            }
        }
    }

    pub fn is_tile_a_structure_tile(&self, pos: TileCoord) -> bool {
        self.tile_structure(pos).is_some()
    }

    pub fn tile_structure_offset(&self, pos: TileCoord) -> (i32, i32) {
        match self.tile(pos) {
            Some(t) => t.structure.as_ref().map(|s| s.offset).unwrap_or((0, 0)),
            None => {
                tracing::error!(
                    "tile_structure_offset failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                (0, 0)
            }
        }
    }

    pub fn is_tile_destroyed(&self, pos: TileCoord) -> bool {
        match self.tile(pos) {
            Some(t) => t.structure.as_ref().is_some_and(|s| s.destroyed),
            None => {
                tracing::error!(
                    "is_tile_destroyed failed: tile {pos} is out of bounds ({})",
                    self.size
                );
                false
            }
        }
    }

    /// Whether a structure's full footprint fits with its root at `from`.
    pub fn can_structure_fit(&self, from: TileCoord, structure: StructureId) -> bool {
        if !self.size.contains(from) {
            return false;
        }
        self.data
            .structure(structure)
            .dependents
            .iter()
            .all(|dep| {
                from.offset(dep.offset.0, dep.offset.1)
                    .is_some_and(|t| self.size.contains(t))
            })
    }

    /// Knock a structure down in place: every member flips to its destroyed
    /// tile type and keeps its membership record with the destroyed flag
    /// set.
    pub fn destroy_structure(&mut self, pos: TileCoord) {
        if !self.size.contains(pos) {
            tracing::error!(
                "destroy_structure cancelled: tile {pos} is out of bounds ({})",
                self.size
            );
            return;
        }
        let Some(ts) = self.tile(pos).and_then(|t| t.structure.clone()) else {
            tracing::error!("destroy_structure cancelled: tile {pos} belongs to no structure");
            return;
        };
        let Some(root) = pos.offset(-ts.offset.0, -ts.offset.1) else {
            tracing::error!("destroy_structure cancelled: root of structure at {pos} is off the grid");
            return;
        };
        let data = Arc::clone(&self.data);
        let def = data.structure(ts.structure);
        // Proceed even when already destroyed; the retype is idempotent.
        self.with_memento(MapOperation::DestroyStructure, |m| {
            m.set_tile_type(root, def.root.destroyed);
            m.set_tile_structure_data(root, Some(ts.structure), (0, 0), true);
            for dep in &def.dependents {
                let Some(member) = root.offset(dep.offset.0, dep.offset.1) else {
                    continue;
                };
                m.set_tile_type(member, dep.tiles.destroyed);
                m.set_tile_structure_data(member, Some(ts.structure), dep.offset, true);
            }
        });
    }

    /// Remove a structure outright: members revert to their deleted tile
    /// types (or are disowned) and all membership records are cleared.
    pub fn delete_structure(&mut self, pos: TileCoord) {
        if !self.size.contains(pos) {
            tracing::error!(
                "delete_structure cancelled: tile {pos} is out of bounds ({})",
                self.size
            );
            return;
        }
        if self.tile(pos).is_none_or(|t| t.structure.is_none()) {
            tracing::error!("delete_structure cancelled: tile {pos} belongs to no structure");
            return;
        }
        self.with_memento(MapOperation::DeleteStructure, |m| {
            m.dismantle_structure_at(pos);
        });
    }

    // ------------------------------------------------------------------
    // Geometry queries
    // ------------------------------------------------------------------

    /// In-bounds tiles whose Manhattan distance from `tile` lies in
    /// `start..=end` (the centre tile is never included).
    pub fn available_tiles(&self, tile: TileCoord, start: u32, end: u32) -> AHashSet<TileCoord> {
        if !self.size.contains(tile) {
            tracing::error!(
                "available_tiles failed: tile {tile} is out of bounds ({})",
                self.size
            );
            return AHashSet::new();
        }
        grid::tiles_in_range(self.size, tile, start, end)
    }

    pub fn tiles_in_cone(
        &self,
        tile: TileCoord,
        dir: Direction,
        start: u32,
        end: u32,
    ) -> AHashSet<TileCoord> {
        if !self.size.contains(tile) {
            tracing::error!(
                "tiles_in_cone failed: tile {tile} is out of bounds ({})",
                self.size
            );
            return AHashSet::new();
        }
        grid::tiles_in_cone(self.size, tile, dir, start, end)
    }

    pub fn tiles_in_crosshair(&self, tile: TileCoord) -> AHashSet<TileCoord> {
        if !self.size.contains(tile) {
            tracing::error!(
                "tiles_in_crosshair failed: tile {tile} is out of bounds ({})",
                self.size
            );
            return AHashSet::new();
        }
        grid::tiles_in_crosshair(self.size, tile)
    }

    pub fn tiles_in_line(&self, tile: TileCoord, dir: Direction, distance: u32) -> AHashSet<TileCoord> {
        if !self.size.contains(tile) {
            tracing::error!(
                "tiles_in_line failed: tile {tile} is out of bounds ({})",
                self.size
            );
            return AHashSet::new();
        }
        grid::tiles_in_line(self.size, tile, dir, distance)
    }

    /// Rectangle between two corners, clamped into bounds.
    pub fn tiles_in_area(&self, a: TileCoord, b: TileCoord) -> AHashSet<TileCoord> {
        grid::tiles_in_area(self.size, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::fixtures::{small_map, CITY, PLAINS, ROAD};

    #[test]
    fn test_tile_owner_is_bidirectional() {
        let mut map = small_map(4, 4);
        let orange = map.data().country_id("orange").unwrap();
        let blue = map.data().country_id("blue").unwrap();
        let a = map.create_army(orange).unwrap();
        let b = map.create_army(blue).unwrap();

        let pos = TileCoord::new(1, 2);
        map.set_tile_owner(pos, Some(a));
        assert_eq!(map.tile_owner(pos), Some(a));
        assert!(map.tiles_of_army(a).contains(&pos));

        map.set_tile_owner(pos, Some(b));
        assert!(!map.tiles_of_army(a).contains(&pos));
        assert!(map.tiles_of_army(b).contains(&pos));

        map.set_tile_owner(pos, None);
        assert!(map.tiles_of_army(b).is_empty());
        assert_eq!(map.tile_owner(pos), None);
    }

    #[test]
    fn test_retype_resets_hp_and_owner() {
        let mut map = small_map(4, 4);
        let orange = map.data().country_id("orange").unwrap();
        let a = map.create_army(orange).unwrap();
        let city = map.data().tile_type_id(CITY).unwrap();
        let road = map.data().tile_type_id(ROAD).unwrap();

        let pos = TileCoord::new(0, 0);
        map.set_tile_type(pos, city);
        map.set_tile_owner(pos, Some(a));
        map.set_tile_hp(pos, 7);

        assert!(map.set_tile_type(pos, road));
        assert_eq!(map.tile_type(pos), Some(road));
        assert_eq!(map.tile_hp(pos), 0);
        assert_eq!(map.tile_owner(pos), None);
        assert!(map.tiles_of_army(a).is_empty());
    }

    #[test]
    fn test_tile_hp_is_clamped() {
        let mut map = small_map(3, 3);
        let city = map.data().tile_type_id(CITY).unwrap();
        let pos = TileCoord::new(1, 1);
        map.set_tile_type(pos, city);

        map.set_tile_hp(pos, 500);
        assert_eq!(map.tile_hp(pos), 20);
        map.set_tile_hp(pos, -4);
        assert_eq!(map.tile_hp(pos), 0);
    }

    #[test]
    fn test_structure_placement_and_query() {
        let mut map = small_map(5, 5);
        let fortress = map.data().structure_id("fortress").unwrap();
        let fort = map.data().tile_type_id("fort").unwrap();
        let wing = map.data().tile_type_id("fort_wing").unwrap();

        let root = TileCoord::new(2, 2);
        let arm = TileCoord::new(3, 2);
        assert!(map.can_structure_fit(root, fortress));
        assert!(!map.can_structure_fit(TileCoord::new(4, 4), fortress));

        map.set_tile_type(root, fort);
        map.set_tile_type(arm, wing);
        map.set_tile_structure_data(root, Some(fortress), (0, 0), false);
        map.set_tile_structure_data(arm, Some(fortress), (1, 0), false);

        assert!(map.is_tile_a_structure_tile(arm));
        assert_eq!(map.tile_structure_offset(arm), (1, 0));
        assert!(!map.is_tile_destroyed(arm));

        let affected = map.query_tile_type_change(arm);
        assert_eq!(affected.len(), 2);
        assert!(affected.contains(&root));
        assert!(affected.contains(&arm));
    }

    #[test]
    fn test_retyping_structure_member_deletes_whole_structure() {
        let mut map = small_map(5, 5);
        let orange = map.data().country_id("orange").unwrap();
        let a = map.create_army(orange).unwrap();
        let fortress = map.data().structure_id("fortress").unwrap();
        let fort = map.data().tile_type_id("fort").unwrap();
        let wing = map.data().tile_type_id("fort_wing").unwrap();
        let plains = map.data().tile_type_id(PLAINS).unwrap();
        let road = map.data().tile_type_id(ROAD).unwrap();

        let root = TileCoord::new(2, 2);
        let arm = TileCoord::new(3, 2);
        map.set_tile_type(root, fort);
        map.set_tile_type(arm, wing);
        map.set_tile_structure_data(root, Some(fortress), (0, 0), false);
        map.set_tile_structure_data(arm, Some(fortress), (1, 0), false);
        map.set_tile_owner(root, Some(a));
        map.set_tile_owner(arm, Some(a));

        // Retyping the dependent arm takes the whole fortress with it: the
        // root reverts to its deleted type and both tiles are disowned.
        map.set_tile_type(arm, road);
        assert_eq!(map.tile_type(root), Some(plains));
        assert_eq!(map.tile_type(arm), Some(road));
        assert!(!map.is_tile_a_structure_tile(root));
        assert!(!map.is_tile_a_structure_tile(arm));
        assert_eq!(map.tile_owner(root), None);
        assert!(map.tiles_of_army(a).is_empty());
    }

    #[test]
    fn test_destroy_structure_marks_members_destroyed() {
        let mut map = small_map(5, 5);
        let fortress = map.data().structure_id("fortress").unwrap();
        let fort = map.data().tile_type_id("fort").unwrap();
        let wing = map.data().tile_type_id("fort_wing").unwrap();
        let fort_ruins = map.data().tile_type_id("fort_ruins").unwrap();
        let wing_ruins = map.data().tile_type_id("fort_wing_ruins").unwrap();

        let root = TileCoord::new(1, 1);
        let arm = TileCoord::new(2, 1);
        map.set_tile_type(root, fort);
        map.set_tile_type(arm, wing);
        map.set_tile_structure_data(root, Some(fortress), (0, 0), false);
        map.set_tile_structure_data(arm, Some(fortress), (1, 0), false);

        // Destroying through the dependent arm finds the root on its own.
        map.destroy_structure(arm);
        assert_eq!(map.tile_type(root), Some(fort_ruins));
        assert_eq!(map.tile_type(arm), Some(wing_ruins));
        assert!(map.is_tile_destroyed(root));
        assert!(map.is_tile_destroyed(arm));
        assert_eq!(map.tile_structure(arm), Some(fortress));
    }

    #[test]
    fn test_delete_structure_reverts_members() {
        let mut map = small_map(5, 5);
        let fortress = map.data().structure_id("fortress").unwrap();
        let fort = map.data().tile_type_id("fort").unwrap();
        let wing = map.data().tile_type_id("fort_wing").unwrap();
        let plains = map.data().tile_type_id(PLAINS).unwrap();

        let root = TileCoord::new(1, 1);
        let arm = TileCoord::new(2, 1);
        map.set_tile_type(root, fort);
        map.set_tile_type(arm, wing);
        map.set_tile_structure_data(root, Some(fortress), (0, 0), false);
        map.set_tile_structure_data(arm, Some(fortress), (1, 0), false);

        map.delete_structure(root);
        assert_eq!(map.tile_type(root), Some(plains));
        assert_eq!(map.tile_type(arm), Some(plains));
        assert!(!map.is_tile_a_structure_tile(root));
        assert!(!map.is_tile_a_structure_tile(arm));
    }

    #[test]
    fn test_geometry_wrappers_reject_out_of_bounds() {
        let map = small_map(4, 4);
        assert!(map.available_tiles(TileCoord::new(9, 9), 1, 2).is_empty());
        assert!(map
            .tiles_in_cone(TileCoord::new(9, 9), Direction::Down, 0, 2)
            .is_empty());
        assert!(map.tiles_in_crosshair(TileCoord::new(9, 9)).is_empty());
        assert!(!map.tiles_in_crosshair(TileCoord::new(1, 1)).is_empty());
    }
}
