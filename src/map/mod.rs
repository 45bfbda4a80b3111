//! The map facade: tiles, units and armies behind one mutable surface.
//!
//! Every mutator that changes persisted state runs inside a named memento
//! scope and is responsible for keeping the per-army vision caches and the
//! army/tile/unit back-references consistent. All cross-entity links are
//! plain ids resolved through the tables owned here; nothing outside the
//! facade holds a mutable reference across a mutation boundary.

pub mod army;
pub mod journal;
pub mod path;
pub mod serial;
pub mod tile;
pub mod unit;
pub mod visibility;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;

use crate::catalog::{GameData, TileTypeId};
use crate::core::types::{ArmyId, Day, GridSize, TileCoord, UnitId};

pub use army::Army;
pub use journal::{Journal, MapOperation, Memento, DEFAULT_MEMENTO_LIMIT};
pub use path::PathNode;
pub use serial::{JsonCodec, MapCodec, MapState};
pub use tile::{Tile, TileStructure};
pub use unit::Unit;
pub use visibility::VisionCache;

/// Fire-and-forget notifications for the rendering layer. Queued by the
/// mutators, drained by the caller between frames; they carry no feedback
/// into the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    TileChanged(TileCoord),
    UnitChanged(UnitId),
    UnitDestroyed {
        unit: UnitId,
        position: Option<TileCoord>,
    },
    MementosChanged,
    MapReloaded,
}

/// Externally supplied rules hook consulted by [`Map::periodic`].
pub trait RulesDelegate {
    /// Return `Some(won)` to override the default single-team win condition.
    fn periodic(&mut self, map: &Map) -> Option<bool>;
}

/// The authoritative game state for one match.
pub struct Map {
    data: Arc<GameData>,
    name: String,
    size: GridSize,
    /// Row-major tile grid, indexed `y * width + x`.
    tiles: Vec<Tile>,
    units: AHashMap<UnitId, Unit>,
    /// Keyed by turn-order id; iteration order is turn order.
    armies: BTreeMap<ArmyId, Army>,
    /// Last unit id handed out (0 before the first); the search for a free
    /// id resumes after it and wraps at the id-space ceiling.
    last_unit_id: u32,
    team_counter: u32,
    day: Day,
    fow: bool,
    selected_tile: TileCoord,
    selected_unit: Option<UnitId>,
    changed: bool,
    periodic_enabled: bool,
    filename: Option<PathBuf>,
    journal: Journal,
    codec: Option<Arc<dyn MapCodec>>,
    rules: Option<Box<dyn RulesDelegate>>,
    events: VecDeque<MapEvent>,
}

impl Map {
    pub fn new(data: Arc<GameData>) -> Self {
        Self {
            data,
            name: String::new(),
            size: GridSize::default(),
            tiles: Vec::new(),
            units: AHashMap::new(),
            armies: BTreeMap::new(),
            last_unit_id: 0,
            team_counter: 0,
            day: 0,
            fow: false,
            selected_tile: TileCoord::new(0, 0),
            selected_unit: None,
            changed: false,
            periodic_enabled: true,
            filename: None,
            journal: Journal::default(),
            codec: None,
            rules: None,
            events: VecDeque::new(),
        }
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    /// Configure the serialization codec. Save, load and memento capture
    /// hard-fail until one is set.
    pub fn set_codec(&mut self, codec: Arc<dyn MapCodec>) {
        self.codec = Some(codec);
    }

    /// Install the external rules hook consulted on periodic checks.
    pub fn set_rules(&mut self, rules: Box<dyn RulesDelegate>) {
        self.rules = Some(rules);
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn map_name(&self) -> &str {
        &self.name
    }

    pub fn set_map_name(&mut self, name: &str) {
        if name == self.name {
            return;
        }
        self.with_memento(MapOperation::MapName, |m| {
            m.name = name.to_string();
        });
    }

    pub fn has_army(&self, army: ArmyId) -> bool {
        self.armies.contains_key(&army)
    }

    pub fn has_unit(&self, unit: UnitId) -> bool {
        self.units.contains_key(&unit)
    }

    pub(crate) fn tile(&self, pos: TileCoord) -> Option<&Tile> {
        if !self.size.contains(pos) {
            return None;
        }
        self.tiles
            .get(pos.y as usize * self.size.width as usize + pos.x as usize)
    }

    pub(crate) fn tile_mut(&mut self, pos: TileCoord) -> Option<&mut Tile> {
        if !self.size.contains(pos) {
            return None;
        }
        self.tiles
            .get_mut(pos.y as usize * self.size.width as usize + pos.x as usize)
    }

    /// Resize the tile grid. The overlapping region is preserved; fresh cells
    /// take the given type and owner. Shrinking drops out-of-bounds owned
    /// tiles from every army, deletes every unit stranded out of bounds and
    /// clamps the selection cursor, in that order.
    pub fn set_map_size(&mut self, dim: GridSize, tile_type: TileTypeId, owner: Option<ArmyId>) {
        if dim == self.size {
            return;
        }
        if let Some(owner) = owner {
            if !self.armies.contains_key(&owner) {
                tracing::error!("set_map_size cancelled: owner army {owner} does not exist");
                return;
            }
        }
        self.with_memento(MapOperation::MapSize, |m| {
            let old_size = m.size;
            let old_tiles = std::mem::take(&mut m.tiles);
            let mut fresh = Vec::new();
            let mut tiles = Vec::with_capacity(dim.area());
            for y in 0..dim.height {
                for x in 0..dim.width {
                    let pos = TileCoord::new(x, y);
                    if old_size.contains(pos) {
                        let index = pos.y as usize * old_size.width as usize + pos.x as usize;
                        tiles.push(old_tiles[index].clone());
                    } else {
                        tiles.push(Tile::new(&m.data, tile_type));
                        fresh.push(pos);
                    }
                }
            }
            m.tiles = tiles;
            m.size = dim;
            if owner.is_some() {
                for pos in fresh {
                    m.set_tile_owner(pos, owner);
                }
            }
            let shrunk = dim.width < old_size.width || dim.height < old_size.height;
            if shrunk {
                for army in m.armies.values_mut() {
                    army.tiles.retain(|t| dim.contains(*t));
                }
                let stranded: Vec<UnitId> = m
                    .units
                    .iter()
                    .filter(|(_, u)| u.position.is_some_and(|p| !dim.contains(p)))
                    .map(|(id, _)| *id)
                    .collect();
                // Loaded passengers go down with their transport, so an id
                // may already be gone by the time we reach it.
                for id in stranded {
                    if m.units.contains_key(&id) {
                        m.delete_unit(id);
                    }
                }
                if !dim.contains(m.selected_tile) {
                    m.selected_tile = TileCoord::new(
                        m.selected_tile.x.min(dim.width.saturating_sub(1)),
                        m.selected_tile.y.min(dim.height.saturating_sub(1)),
                    );
                }
            }
            m.recompute_vision_caches();
        });
    }

    /// Retype and reown the whole map in one undo step.
    pub fn fill_map(&mut self, tile_type: TileTypeId, owner: Option<ArmyId>) -> bool {
        if self.size.is_empty() {
            tracing::error!("fill_map failed: the map has no tiles");
            return false;
        }
        let end = TileCoord::new(self.size.width - 1, self.size.height - 1);
        self.rectangle_fill_tiles(TileCoord::new(0, 0), end, tile_type, owner)
    }

    /// Retype and reown every tile in a rectangle in one undo step.
    pub fn rectangle_fill_tiles(
        &mut self,
        start: TileCoord,
        end: TileCoord,
        tile_type: TileTypeId,
        owner: Option<ArmyId>,
    ) -> bool {
        if !self.size.contains(start) || !self.size.contains(end) {
            tracing::error!(
                "rectangle_fill_tiles failed: corner {start} or {end} is out of bounds ({})",
                self.size
            );
            return false;
        }
        self.with_memento(MapOperation::FillTiles, |m| {
            let mut ok = true;
            for x in start.x.min(end.x)..=start.x.max(end.x) {
                for y in start.y.min(end.y)..=start.y.max(end.y) {
                    let pos = TileCoord::new(x, y);
                    if !m.set_tile_type(pos, tile_type) {
                        ok = false;
                    }
                    m.set_tile_owner(pos, owner);
                }
            }
            ok
        })
    }

    /// Place one fresh unit of the given type on every tile in a rectangle,
    /// replacing whatever stood there, in one undo step. The owning army is
    /// created on demand from its country.
    pub fn rectangle_fill_units(
        &mut self,
        start: TileCoord,
        end: TileCoord,
        unit_type: crate::catalog::UnitTypeId,
        army: ArmyId,
    ) -> bool {
        if !self.size.contains(start) || !self.size.contains(end) {
            tracing::error!(
                "rectangle_fill_units failed: corner {start} or {end} is out of bounds ({})",
                self.size
            );
            return false;
        }
        let missing_country = if self.armies.contains_key(&army) {
            None
        } else {
            let country = self
                .data
                .countries()
                .find(|(_, c)| c.turn_order == army.0)
                .map(|(id, _)| id);
            if country.is_none() {
                tracing::error!("rectangle_fill_units failed: no country has turn order {army}");
                return false;
            }
            country
        };
        self.with_memento(MapOperation::FillUnits, |m| {
            if let Some(country) = missing_country {
                m.create_army(country);
            }
            let mut ok = true;
            for x in start.x.min(end.x)..=start.x.max(end.x) {
                for y in start.y.min(end.y)..=start.y.max(end.y) {
                    let pos = TileCoord::new(x, y);
                    if let Some(standing) = m.unit_on_tile(pos) {
                        m.delete_unit(standing);
                    }
                    let unit = match m.create_unit(unit_type, army) {
                        Ok(unit) => unit,
                        Err(e) => {
                            tracing::error!("rectangle_fill_units: unit creation failed: {e}");
                            ok = false;
                            continue;
                        }
                    };
                    m.wait_unit(unit, false);
                    m.replenish_unit(unit, true);
                    m.set_unit_position(unit, Some(pos));
                }
            }
            ok
        })
    }

    /// Delete every unit standing in a rectangle, in one undo step. Returns
    /// how many were removed.
    pub fn rectangle_delete_units(&mut self, start: TileCoord, end: TileCoord) -> usize {
        if !self.size.contains(start) || !self.size.contains(end) {
            tracing::error!(
                "rectangle_delete_units failed: corner {start} or {end} is out of bounds ({})",
                self.size
            );
            return 0;
        }
        self.with_memento(MapOperation::DeleteUnits, |m| {
            let mut count = 0;
            for x in start.x.min(end.x)..=start.x.max(end.x) {
                for y in start.y.min(end.y)..=start.y.max(end.y) {
                    if let Some(unit) = m.unit_on_tile(TileCoord::new(x, y)) {
                        m.delete_unit(unit);
                        count += 1;
                    }
                }
            }
            count
        })
    }

    /// Retype every listed tile currently of type `from` into `to` and hand
    /// it to `transfer`, in one undo step.
    pub fn convert_tiles(
        &mut self,
        tiles: &[TileCoord],
        from: TileTypeId,
        to: TileTypeId,
        transfer: Option<ArmyId>,
    ) {
        if let Some(army) = transfer {
            if !self.armies.contains_key(&army) {
                tracing::error!("convert_tiles failed: transfer army {army} does not exist");
                return;
            }
        }
        self.with_memento(MapOperation::ConvertTiles, |m| {
            for &pos in tiles {
                if !m.size.contains(pos) {
                    tracing::error!("convert_tiles: tile {pos} is out of bounds, skipping");
                    continue;
                }
                if m.tile(pos).map(|t| t.tile_type) == Some(from) {
                    m.set_tile_type(pos, to);
                    m.set_tile_owner(pos, transfer);
                }
            }
        });
    }

    pub fn day(&self) -> Day {
        self.day
    }

    pub fn set_day(&mut self, day: Day) {
        if day == self.day {
            return;
        }
        self.with_memento(MapOperation::Day, |m| {
            m.day = day;
        });
    }

    pub fn is_fow_enabled(&self) -> bool {
        self.fow
    }

    pub fn enable_fow(&mut self, enabled: bool) {
        if enabled == self.fow {
            return;
        }
        self.with_memento(MapOperation::FogOfWar, |m| {
            m.fow = enabled;
        });
    }

    pub fn selected_tile(&self) -> TileCoord {
        self.selected_tile
    }

    /// Move the tile cursor. Runtime-only state: not journaled.
    pub fn set_selected_tile(&mut self, pos: TileCoord) {
        if !self.size.contains(pos) {
            tracing::error!(
                "set_selected_tile failed: {pos} is out of bounds ({})",
                self.size
            );
            return;
        }
        self.selected_tile = pos;
    }

    pub fn selected_unit(&self) -> Option<UnitId> {
        self.selected_unit
    }

    /// Select a unit, or clear the selection. Runtime-only state.
    pub fn set_selected_unit(&mut self, unit: Option<UnitId>) {
        if let Some(id) = unit {
            if !self.units.contains_key(&id) {
                tracing::error!("set_selected_unit failed: unit {id} does not exist");
                return;
            }
        }
        self.selected_unit = unit;
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// True when zero armies remain or every remaining army shares one team.
    pub fn default_win_condition(&self) -> bool {
        let mut teams = self.armies.values().map(|a| a.team);
        match teams.next() {
            None => true,
            Some(first) => teams.all(|t| t == first),
        }
    }

    pub fn enable_periodic(&mut self, enabled: bool) {
        self.periodic_enabled = enabled;
    }

    /// Periodic win check. The rules delegate, when installed, may override
    /// the default single-team condition.
    pub fn periodic(&mut self) -> bool {
        if !self.periodic_enabled {
            return false;
        }
        if let Some(mut rules) = self.rules.take() {
            let verdict = rules.periodic(self);
            self.rules = Some(rules);
            if let Some(won) = verdict {
                return won;
            }
        }
        self.default_win_condition()
    }

    /// Drain the queued visual-update notifications.
    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn push_event(&mut self, event: MapEvent) {
        self.events.push_back(event);
    }

    // ------------------------------------------------------------------
    // Memento scoping
    // ------------------------------------------------------------------

    /// Run a mutation under a named memento scope. Nested scopes collapse
    /// into the snapshot taken when the outermost one closes; early returns
    /// inside the closure still rebalance the counter.
    pub(crate) fn with_memento<R>(
        &mut self,
        op: MapOperation,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.journal.disable();
        let result = f(self);
        if self.journal.enable() {
            self.create_memento(op.name());
        }
        result
    }

    /// Suspend memento capture. Pair with [`Map::enable_mementos`].
    pub fn disable_mementos(&mut self) {
        self.journal.disable();
    }

    /// Rebalance one `disable_mementos` call. When the counter reaches zero
    /// and `name` is non-empty, one memento covering the whole scope is
    /// captured; an empty name discards the scope instead. Returns whether a
    /// memento was created.
    pub fn enable_mementos(&mut self, name: &str) -> bool {
        if self.journal.enable() && !name.is_empty() {
            self.create_memento(name);
            return true;
        }
        false
    }

    /// Names of every stored memento, newest first, plus the index of the
    /// entry representing the current state.
    pub fn memento_names(&self) -> (Vec<String>, usize) {
        self.journal.names()
    }

    pub fn next_undo_memento_name(&self) -> Option<&str> {
        self.journal.next_undo_name()
    }

    pub fn next_redo_memento_name(&self) -> Option<&str> {
        self.journal.next_redo_name()
    }

    // ------------------------------------------------------------------
    // Shared internal helpers
    // ------------------------------------------------------------------

    /// Interrupt a capture in progress: the tile's capture points snap back
    /// to the terrain maximum and the unit stops capturing. Out-of-bounds
    /// positions can occur while a map is shrinking; the tile is gone, so
    /// only the flag is cleared.
    pub(crate) fn interrupt_capture(&mut self, id: UnitId) {
        let capturing = self.units.get(&id).is_some_and(|u| u.capturing);
        if !capturing {
            return;
        }
        let position = self.units.get(&id).and_then(|u| u.position);
        if let Some(pos) = position {
            if let Some(tile) = self.tile(pos) {
                let max_hp = self.data.terrain_of(tile.tile_type).max_hp;
                self.set_tile_hp(pos, max_hp);
            }
        }
        self.set_unit_capturing(id, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::fixtures::{small_map, PLAINS, ROAD};

    #[test]
    fn test_default_win_condition_single_team() {
        let mut map = small_map(5, 5);
        assert!(map.default_win_condition());

        let orange = map.data().country_id("orange").unwrap();
        let blue = map.data().country_id("blue").unwrap();
        let a = map.create_army(orange).unwrap();
        let b = map.create_army(blue).unwrap();
        assert!(!map.default_win_condition());

        let team = map.army_team(a).unwrap();
        map.set_army_team(b, team);
        assert!(map.default_win_condition());
    }

    #[test]
    fn test_periodic_delegate_overrides_default() {
        struct AlwaysWon;
        impl RulesDelegate for AlwaysWon {
            fn periodic(&mut self, _map: &Map) -> Option<bool> {
                Some(true)
            }
        }

        let mut map = small_map(3, 3);
        let orange = map.data().country_id("orange").unwrap();
        let blue = map.data().country_id("blue").unwrap();
        map.create_army(orange);
        map.create_army(blue);
        assert!(!map.periodic());

        map.set_rules(Box::new(AlwaysWon));
        assert!(map.periodic());

        map.enable_periodic(false);
        assert!(!map.periodic());
    }

    #[test]
    fn test_resize_shrink_deletes_stranded_units_and_clamps_selection() {
        let mut map = small_map(5, 5);
        let orange = map.data().country_id("orange").unwrap();
        let army = map.create_army(orange).unwrap();
        let infantry = map.data().unit_type_id("infantry").unwrap();

        let inside = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(inside, Some(TileCoord::new(1, 1)));
        let outside = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(outside, Some(TileCoord::new(4, 4)));
        map.set_selected_tile(TileCoord::new(4, 4));

        let plains = map.data().tile_type_id(PLAINS).unwrap();
        map.set_map_size(GridSize::new(3, 3), plains, None);

        assert!(map.has_unit(inside));
        assert!(!map.has_unit(outside));
        assert_eq!(map.selected_tile(), TileCoord::new(2, 2));
        assert_eq!(map.size(), GridSize::new(3, 3));
    }

    #[test]
    fn test_resize_grow_assigns_owner_to_fresh_tiles() {
        let mut map = small_map(2, 2);
        let orange = map.data().country_id("orange").unwrap();
        let army = map.create_army(orange).unwrap();
        let road = map.data().tile_type_id(ROAD).unwrap();

        map.set_map_size(GridSize::new(3, 2), road, Some(army));

        assert_eq!(map.tile_owner(TileCoord::new(2, 0)), Some(army));
        assert_eq!(map.tile_owner(TileCoord::new(0, 0)), None);
        assert!(map
            .tiles_of_army(army)
            .contains(&TileCoord::new(2, 1)));
    }

    #[test]
    fn test_rectangle_fill_and_delete_units() {
        let mut map = small_map(4, 4);
        let infantry = map.data().unit_type_id("infantry").unwrap();

        let army = ArmyId(0);
        assert!(!map.has_army(army));
        assert!(map.rectangle_fill_units(
            TileCoord::new(0, 0),
            TileCoord::new(1, 1),
            infantry,
            army
        ));
        assert!(map.has_army(army));
        assert_eq!(map.units_of_army(army).len(), 4);
        let country = map.army_country(army).unwrap();
        assert_eq!(map.data().country(country).script_name, "orange");

        let removed = map.rectangle_delete_units(TileCoord::new(0, 0), TileCoord::new(1, 0));
        assert_eq!(removed, 2);
        assert_eq!(map.units_of_army(army).len(), 2);
    }

    #[test]
    fn test_convert_tiles_filters_by_source_type() {
        let mut map = small_map(3, 1);
        let plains = map.data().tile_type_id(PLAINS).unwrap();
        let road = map.data().tile_type_id(ROAD).unwrap();

        map.set_tile_type(TileCoord::new(1, 0), road);
        map.convert_tiles(
            &[TileCoord::new(0, 0), TileCoord::new(1, 0)],
            plains,
            road,
            None,
        );

        assert_eq!(map.tile_type(TileCoord::new(0, 0)), Some(road));
        assert_eq!(map.tile_type(TileCoord::new(2, 0)), Some(plains));
    }

    #[test]
    fn test_equal_value_setters_do_not_journal() {
        let mut map = small_map(3, 3);
        map.add_memento("Baseline").unwrap();
        let before = map.memento_names().0.len();

        map.set_day(map.day());
        map.set_map_name(&map.map_name().to_string());
        map.enable_fow(map.is_fow_enabled());

        assert_eq!(map.memento_names().0.len(), before);
    }
}
