//! Units: creation, deletion, movement, supplies, status flags and
//! transport loading.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::catalog::{GameData, UnitTypeId};
use crate::core::error::{MapError, Result};
use crate::core::types::{Ammo, ArmyId, Fuel, Hp, TeamId, TileCoord, UnitId};
use crate::map::journal::MapOperation;
use crate::map::{Map, MapEvent};

/// One unit on (or off) the map. The unit type and owning army never change
/// after creation.
#[derive(Debug, Clone)]
pub struct Unit {
    pub unit_type: UnitTypeId,
    pub army: ArmyId,
    /// `None` while the unit is loaded onto a transport or newly created.
    pub position: Option<TileCoord>,
    pub hp: Hp,
    pub fuel: Fuel,
    /// Keyed by weapon script name.
    pub ammo: AHashMap<String, Ammo>,
    pub waiting: bool,
    pub capturing: bool,
    pub hiding: bool,
    pub loaded_onto: Option<UnitId>,
    pub loaded_units: AHashSet<UnitId>,
}

impl Unit {
    /// A fresh unit starts fully supplied and off the map.
    pub fn new(data: &GameData, unit_type: UnitTypeId, army: ArmyId) -> Self {
        let def = data.unit_type(unit_type);
        let ammo = def
            .weapons
            .iter()
            .map(|w| (w.script_name.clone(), w.max_ammo))
            .collect();
        Self {
            unit_type,
            army,
            position: None,
            hp: def.max_hp,
            fuel: def.max_fuel,
            ammo,
            waiting: false,
            capturing: false,
            hiding: false,
            loaded_onto: None,
            loaded_units: AHashSet::new(),
        }
    }

    pub fn is_on_map(&self) -> bool {
        self.position.is_some()
    }

    fn replenish(&mut self, data: &GameData, heal: bool) {
        let def = data.unit_type(self.unit_type);
        self.fuel = def.max_fuel;
        for weapon in &def.weapons {
            if weapon.max_ammo >= 0 {
                self.ammo.insert(weapon.script_name.clone(), weapon.max_ammo);
            }
        }
        if heal {
            self.hp = def.max_hp;
        }
    }

    fn is_replenished(&self, data: &GameData, with_hp: bool) -> bool {
        let def = data.unit_type(self.unit_type);
        if self.fuel != def.max_fuel {
            return false;
        }
        if with_hp && self.hp != def.max_hp {
            return false;
        }
        def.weapons
            .iter()
            .filter(|w| w.max_ammo >= 0)
            .all(|w| self.ammo.get(&w.script_name) == Some(&w.max_ammo))
    }
}

impl Map {
    /// Create a unit for an army. The id comes from a dense wraparound
    /// allocator; running out of ids is the one hard capacity failure in the
    /// core and is reported distinctly from a bad army reference.
    pub fn create_unit(&mut self, unit_type: UnitTypeId, army: ArmyId) -> Result<UnitId> {
        if !self.armies.contains_key(&army) {
            tracing::error!(
                "create_unit cancelled: attempted to create \"{}\" for army {army}, which does not exist",
                self.data.unit_type(unit_type).script_name
            );
            return Err(MapError::ArmyNotFound(army));
        }
        let id = match self.find_unit_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("create_unit fatal: could not allocate a unit id: {e}");
                return Err(e);
            }
        };
        self.with_memento(MapOperation::CreateUnit, |m| {
            let unit = Unit::new(m.data.as_ref(), unit_type, army);
            m.units.insert(id, unit);
            if let Some(a) = m.armies.get_mut(&army) {
                a.units.insert(id);
            }
            m.push_event(MapEvent::UnitChanged(id));
            Ok(id)
        })
    }

    fn find_unit_id(&mut self) -> Result<UnitId> {
        if self.units.len() >= u32::MAX as usize - 1 {
            return Err(MapError::UnitIdsExhausted);
        }
        let advance = |id: u32| if id == u32::MAX { UnitId::FIRST.0 } else { id + 1 };
        let mut candidate = advance(self.last_unit_id);
        while self.units.contains_key(&UnitId(candidate)) {
            candidate = advance(candidate);
        }
        self.last_unit_id = candidate;
        Ok(UnitId(candidate))
    }

    /// Delete a unit and everything loaded onto it. Cleans up tile
    /// occupancy, army membership, vision contribution, transport links and
    /// selection, in that order.
    pub fn delete_unit(&mut self, id: UnitId) {
        if !self.units.contains_key(&id) {
            tracing::error!("delete_unit cancelled: unit {id} does not exist");
            return;
        }
        self.with_memento(MapOperation::DeleteUnit, |m| {
            m.interrupt_capture(id);
            m.remove_unit_sight(id);
            let position = m.units.get(&id).and_then(|u| u.position);
            if let Some(pos) = position {
                if let Some(tile) = m.tile_mut(pos) {
                    tile.occupant = None;
                }
            }
            let army = m.units.get(&id).map(|u| u.army);
            match army.and_then(|a| m.armies.get_mut(&a)) {
                Some(a) => {
                    a.units.remove(&id);
                }
                None => tracing::warn!("delete_unit: unit {id} had no valid owning army"),
            }
            let passengers: Vec<UnitId> = m
                .units
                .get(&id)
                .map(|u| u.loaded_units.iter().copied().collect())
                .unwrap_or_default();
            for passenger in passengers {
                m.delete_unit(passenger);
            }
            let transport = m.units.get(&id).and_then(|u| u.loaded_onto);
            if let Some(transport) = transport {
                if let Some(t) = m.units.get_mut(&transport) {
                    t.loaded_units.remove(&id);
                }
            }
            if m.selected_unit == Some(id) {
                m.selected_unit = None;
            }
            m.push_event(MapEvent::UnitDestroyed { unit: id, position });
            m.units.remove(&id);
        });
    }

    pub fn unit_type_of(&self, id: UnitId) -> Option<UnitTypeId> {
        match self.units.get(&id) {
            Some(u) => Some(u.unit_type),
            None => {
                tracing::error!("unit_type_of failed: unit {id} does not exist");
                None
            }
        }
    }

    /// Move a unit onto a tile, or take it off the map with `None`. The
    /// destination must be vacant; moving a unit onto itself is a no-op.
    pub fn set_unit_position(&mut self, id: UnitId, pos: Option<TileCoord>) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_position cancelled: unit {id} does not exist");
            return;
        }
        if let Some(p) = pos {
            if !self.size.contains(p) {
                tracing::error!(
                    "set_unit_position cancelled: {p} is out of bounds ({})",
                    self.size
                );
                return;
            }
            match self.unit_on_tile(p) {
                Some(standing) if standing == id => return,
                Some(standing) => {
                    tracing::error!(
                        "set_unit_position cancelled: tile {p} is already occupied by unit {standing}"
                    );
                    return;
                }
                None => {}
            }
        }
        self.with_memento(MapOperation::UnitPosition, |m| {
            m.interrupt_capture(id);
            m.remove_unit_sight(id);
            if let Some(old) = m.units.get(&id).and_then(|u| u.position) {
                if let Some(tile) = m.tile_mut(old) {
                    tile.occupant = None;
                }
            }
            if let Some(p) = pos {
                if let Some(tile) = m.tile_mut(p) {
                    tile.occupant = Some(id);
                }
            }
            if let Some(unit) = m.units.get_mut(&id) {
                unit.position = pos;
            }
            m.add_unit_sight(id);
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn unit_position(&self, id: UnitId) -> Option<TileCoord> {
        match self.units.get(&id) {
            Some(u) => u.position,
            None => {
                tracing::error!("unit_position failed: unit {id} does not exist");
                None
            }
        }
    }

    pub fn is_unit_on_map(&self, id: UnitId) -> bool {
        match self.units.get(&id) {
            Some(u) => u.is_on_map(),
            None => {
                tracing::error!("is_unit_on_map failed: unit {id} does not exist");
                false
            }
        }
    }

    pub fn unit_hp(&self, id: UnitId) -> Hp {
        match self.units.get(&id) {
            Some(u) => u.hp,
            None => {
                tracing::error!("unit_hp failed: unit {id} does not exist");
                0
            }
        }
    }

    pub fn set_unit_hp(&mut self, id: UnitId, hp: Hp) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_hp cancelled: unit {id} does not exist");
            return;
        }
        if self.units[&id].hp == hp {
            return;
        }
        self.with_memento(MapOperation::UnitHp, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.hp = hp;
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn unit_fuel(&self, id: UnitId) -> Fuel {
        match self.units.get(&id) {
            Some(u) => u.fuel,
            None => {
                tracing::error!("unit_fuel failed: unit {id} does not exist");
                0
            }
        }
    }

    pub fn set_unit_fuel(&mut self, id: UnitId, fuel: Fuel) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_fuel cancelled: unit {id} does not exist");
            return;
        }
        if self.units[&id].fuel == fuel {
            return;
        }
        self.with_memento(MapOperation::UnitFuel, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.fuel = fuel;
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    /// Subtract fuel spent on a move.
    pub fn burn_unit_fuel(&mut self, id: UnitId, amount: Fuel) {
        if !self.units.contains_key(&id) {
            tracing::error!("burn_unit_fuel cancelled: unit {id} does not exist");
            return;
        }
        let fuel = self.units[&id].fuel;
        self.set_unit_fuel(id, fuel - amount);
    }

    pub fn unit_ammo(&self, id: UnitId, weapon: &str) -> Ammo {
        match self.units.get(&id) {
            Some(u) => u.ammo.get(weapon).copied().unwrap_or(0),
            None => {
                tracing::error!("unit_ammo failed: unit {id} does not exist");
                0
            }
        }
    }

    pub fn set_unit_ammo(&mut self, id: UnitId, weapon: &str, ammo: Ammo) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_ammo cancelled: unit {id} does not exist");
            return;
        }
        if self.unit_ammo(id, weapon) == ammo {
            return;
        }
        let weapon = weapon.to_string();
        self.with_memento(MapOperation::UnitAmmo, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.ammo.insert(weapon, ammo);
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    /// Refill fuel and finite ammunition, and optionally heal to full.
    pub fn replenish_unit(&mut self, id: UnitId, heal: bool) {
        if !self.units.contains_key(&id) {
            tracing::error!("replenish_unit cancelled: unit {id} does not exist");
            return;
        }
        if self.is_unit_replenished(id, heal) {
            return;
        }
        self.with_memento(MapOperation::UnitReplenish, |m| {
            let data = Arc::clone(&m.data);
            if let Some(u) = m.units.get_mut(&id) {
                u.replenish(&data, heal);
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn is_unit_replenished(&self, id: UnitId, with_hp: bool) -> bool {
        match self.units.get(&id) {
            Some(u) => u.is_replenished(&self.data, with_hp),
            None => {
                tracing::error!("is_unit_replenished failed: unit {id} does not exist");
                false
            }
        }
    }

    pub fn wait_unit(&mut self, id: UnitId, waiting: bool) {
        if !self.units.contains_key(&id) {
            tracing::error!("wait_unit cancelled: unit {id} does not exist");
            return;
        }
        if self.units[&id].waiting == waiting {
            return;
        }
        self.with_memento(MapOperation::UnitWait, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.waiting = waiting;
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn is_unit_waiting(&self, id: UnitId) -> bool {
        match self.units.get(&id) {
            Some(u) => u.waiting,
            None => {
                tracing::error!("is_unit_waiting failed: unit {id} does not exist");
                false
            }
        }
    }

    pub fn set_unit_capturing(&mut self, id: UnitId, capturing: bool) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_capturing cancelled: unit {id} does not exist");
            return;
        }
        if self.units[&id].capturing == capturing {
            return;
        }
        self.with_memento(MapOperation::UnitCapture, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.capturing = capturing;
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn is_unit_capturing(&self, id: UnitId) -> bool {
        match self.units.get(&id) {
            Some(u) => u.capturing,
            None => {
                tracing::error!("is_unit_capturing failed: unit {id} does not exist");
                false
            }
        }
    }

    /// Hiding only affects unit visibility queries; the army vision cache is
    /// untouched.
    pub fn set_unit_hiding(&mut self, id: UnitId, hiding: bool) {
        if !self.units.contains_key(&id) {
            tracing::error!("set_unit_hiding cancelled: unit {id} does not exist");
            return;
        }
        if self.units[&id].hiding == hiding {
            return;
        }
        self.with_memento(MapOperation::UnitHide, |m| {
            if let Some(u) = m.units.get_mut(&id) {
                u.hiding = hiding;
            }
            m.push_event(MapEvent::UnitChanged(id));
        });
    }

    pub fn is_unit_hiding(&self, id: UnitId) -> bool {
        match self.units.get(&id) {
            Some(u) => u.hiding,
            None => {
                tracing::error!("is_unit_hiding failed: unit {id} does not exist");
                false
            }
        }
    }

    /// Load a unit onto a transport. Single-level loading is the enforced
    /// invariant: a transport that is itself loaded cannot take passengers.
    pub fn load_unit(&mut self, load: UnitId, onto: UnitId) {
        if !self.units.contains_key(&onto) {
            tracing::error!("load_unit cancelled: transport {onto} does not exist");
            return;
        }
        if !self.units.contains_key(&load) {
            tracing::error!("load_unit cancelled: unit {load} does not exist");
            return;
        }
        if load == onto {
            tracing::error!("load_unit cancelled: unit {load} cannot be loaded onto itself");
            return;
        }
        if self.units[&load].loaded_onto.is_some() {
            tracing::warn!("load_unit: unit {load} is already loaded onto a transport");
            return;
        }
        if self.units[&onto].loaded_onto.is_some() {
            tracing::error!(
                "load_unit cancelled: transport {onto} is itself loaded, nested loading is not supported"
            );
            return;
        }
        let limit = self.data.unit_type(self.units[&onto].unit_type).load_limit;
        if self.units[&onto].loaded_units.len() >= limit {
            tracing::error!("load_unit cancelled: transport {onto} is full ({limit} slots)");
            return;
        }
        self.with_memento(MapOperation::UnitLoad, |m| {
            m.interrupt_capture(load);
            m.remove_unit_sight(load);
            if let Some(pos) = m.units.get(&load).and_then(|u| u.position) {
                if let Some(tile) = m.tile_mut(pos) {
                    tile.occupant = None;
                }
            }
            if let Some(u) = m.units.get_mut(&load) {
                u.position = None;
            }
            if let Some(t) = m.units.get_mut(&onto) {
                t.loaded_units.insert(load);
            }
            if let Some(u) = m.units.get_mut(&load) {
                u.loaded_onto = Some(onto);
            }
            m.push_event(MapEvent::UnitChanged(load));
        });
    }

    /// Unload a passenger from its transport onto a vacant tile.
    pub fn unload_unit(&mut self, unload: UnitId, from: UnitId, onto: TileCoord) {
        if !self.units.contains_key(&from) {
            tracing::error!("unload_unit cancelled: transport {from} does not exist");
            return;
        }
        if !self.units.contains_key(&unload) {
            tracing::error!("unload_unit cancelled: unit {unload} does not exist");
            return;
        }
        if !self.size.contains(onto) {
            tracing::error!(
                "unload_unit cancelled: destination {onto} is out of bounds ({})",
                self.size
            );
            return;
        }
        if let Some(standing) = self.unit_on_tile(onto) {
            tracing::error!(
                "unload_unit cancelled: destination {onto} is already occupied by unit {standing}"
            );
            return;
        }
        if !self.units[&from].loaded_units.contains(&unload) {
            tracing::error!("unload_unit failed: unit {unload} is not loaded onto unit {from}");
            return;
        }
        self.with_memento(MapOperation::UnitUnload, |m| {
            if let Some(t) = m.units.get_mut(&from) {
                t.loaded_units.remove(&unload);
            }
            if let Some(u) = m.units.get_mut(&unload) {
                u.loaded_onto = None;
            }
            m.set_unit_position(unload, Some(onto));
        });
    }

    /// The transport this unit is loaded onto, if any.
    pub fn unit_which_contains_unit(&self, id: UnitId) -> Option<UnitId> {
        match self.units.get(&id) {
            Some(u) => u.loaded_onto,
            None => {
                tracing::error!("unit_which_contains_unit failed: unit {id} does not exist");
                None
            }
        }
    }

    /// Walk the transport chain upwards to the unit that actually stands on
    /// the map. Returns the unit itself when it is not loaded.
    pub fn unloaded_unit_which_contains_unit(&self, id: UnitId) -> Option<UnitId> {
        if !self.units.contains_key(&id) {
            tracing::error!(
                "unloaded_unit_which_contains_unit failed: unit {id} does not exist"
            );
            return None;
        }
        let mut cursor = id;
        while let Some(transport) = self.units.get(&cursor).and_then(|u| u.loaded_onto) {
            cursor = transport;
        }
        Some(cursor)
    }

    pub fn is_unit_loaded_onto_unit(&self, unit: UnitId, onto: UnitId) -> bool {
        if !self.units.contains_key(&unit) {
            tracing::error!("is_unit_loaded_onto_unit failed: unit {unit} does not exist");
            return false;
        }
        match self.units.get(&onto) {
            Some(t) => t.loaded_units.contains(&unit),
            None => {
                tracing::error!("is_unit_loaded_onto_unit failed: unit {onto} does not exist");
                false
            }
        }
    }

    pub fn loaded_units(&self, id: UnitId) -> AHashSet<UnitId> {
        match self.units.get(&id) {
            Some(u) => u.loaded_units.clone(),
            None => {
                tracing::error!("loaded_units failed: unit {id} does not exist");
                AHashSet::new()
            }
        }
    }

    pub fn army_of_unit(&self, id: UnitId) -> Option<ArmyId> {
        match self.units.get(&id) {
            Some(u) => Some(u.army),
            None => {
                tracing::error!("army_of_unit failed: unit {id} does not exist");
                None
            }
        }
    }

    pub fn team_of_unit(&self, id: UnitId) -> Option<TeamId> {
        match self.units.get(&id) {
            Some(u) => self.armies.get(&u.army).map(|a| a.team),
            None => {
                tracing::error!("team_of_unit failed: unit {id} does not exist");
                None
            }
        }
    }

    /// Defence stars of the terrain under the unit; zero off the map.
    pub fn unit_defence(&self, id: UnitId) -> u32 {
        let Some(unit) = self.units.get(&id) else {
            tracing::error!("unit_defence failed: unit {id} does not exist");
            return 0;
        };
        match unit.position.and_then(|p| self.tile(p)) {
            Some(tile) => self.data.terrain_of(tile.tile_type).defence,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::fixtures::{small_map, MOUNTAIN};

    fn map_with_army() -> (Map, ArmyId) {
        let mut map = small_map(6, 6);
        let orange = map.data().country_id("orange").unwrap();
        let army = map.create_army(orange).unwrap();
        (map, army)
    }

    #[test]
    fn test_created_unit_starts_off_map_and_supplied() {
        let (mut map, army) = map_with_army();
        let tank = map.data().unit_type_id("tank").unwrap();
        let unit = map.create_unit(tank, army).unwrap();

        assert!(!map.is_unit_on_map(unit));
        assert_eq!(map.unit_position(unit), None);
        assert_eq!(map.unit_hp(unit), 100);
        assert_eq!(map.unit_fuel(unit), 70);
        assert_eq!(map.unit_ammo(unit, "cannon"), 9);
        assert!(map.units_of_army(army).contains(&unit));
    }

    #[test]
    fn test_unit_ids_are_dense() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let a = map.create_unit(infantry, army).unwrap();
        let b = map.create_unit(infantry, army).unwrap();
        assert_eq!(a, UnitId(1));
        assert_eq!(b, UnitId(2));

        map.delete_unit(a);
        let c = map.create_unit(infantry, army).unwrap();
        assert_eq!(c, UnitId(3));
    }

    #[test]
    fn test_create_unit_for_missing_army() {
        let mut map = small_map(3, 3);
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let result = map.create_unit(infantry, ArmyId(7));
        assert!(matches!(result, Err(MapError::ArmyNotFound(ArmyId(7)))));
    }

    #[test]
    fn test_position_occupancy_invariant() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let a = map.create_unit(infantry, army).unwrap();
        let b = map.create_unit(infantry, army).unwrap();

        let pos = TileCoord::new(2, 2);
        map.set_unit_position(a, Some(pos));
        assert_eq!(map.unit_on_tile(pos), Some(a));

        // The tile is taken; the mutation is refused.
        map.set_unit_position(b, Some(pos));
        assert_eq!(map.unit_position(b), None);

        // Moving a unit onto its own tile is a quiet no-op.
        map.set_unit_position(a, Some(pos));
        assert_eq!(map.unit_on_tile(pos), Some(a));

        map.set_unit_position(a, Some(TileCoord::new(3, 3)));
        assert_eq!(map.unit_on_tile(pos), None);
        assert_eq!(map.unit_on_tile(TileCoord::new(3, 3)), Some(a));
    }

    #[test]
    fn test_off_map_matches_position() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let unit = map.create_unit(infantry, army).unwrap();

        assert_eq!(map.is_unit_on_map(unit), map.unit_position(unit).is_some());
        map.set_unit_position(unit, Some(TileCoord::new(0, 0)));
        assert_eq!(map.is_unit_on_map(unit), map.unit_position(unit).is_some());
        map.set_unit_position(unit, None);
        assert!(!map.is_unit_on_map(unit));
    }

    #[test]
    fn test_burn_fuel_and_replenish() {
        let (mut map, army) = map_with_army();
        let tank = map.data().unit_type_id("tank").unwrap();
        let unit = map.create_unit(tank, army).unwrap();

        map.burn_unit_fuel(unit, 30);
        map.set_unit_ammo(unit, "cannon", 2);
        map.set_unit_hp(unit, 40);
        assert_eq!(map.unit_fuel(unit), 40);
        assert!(!map.is_unit_replenished(unit, false));

        map.replenish_unit(unit, false);
        assert_eq!(map.unit_fuel(unit), 70);
        assert_eq!(map.unit_ammo(unit, "cannon"), 9);
        assert_eq!(map.unit_hp(unit), 40);
        assert!(map.is_unit_replenished(unit, false));
        assert!(!map.is_unit_replenished(unit, true));

        map.replenish_unit(unit, true);
        assert_eq!(map.unit_hp(unit), 100);
    }

    #[test]
    fn test_load_and_unload() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let apc_type = map.data().unit_type_id("apc").unwrap();

        let apc = map.create_unit(apc_type, army).unwrap();
        map.set_unit_position(apc, Some(TileCoord::new(1, 1)));
        let grunt = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(grunt, Some(TileCoord::new(1, 2)));

        map.load_unit(grunt, apc);
        assert!(!map.is_unit_on_map(grunt));
        assert!(map.is_unit_loaded_onto_unit(grunt, apc));
        assert_eq!(map.unit_which_contains_unit(grunt), Some(apc));
        assert_eq!(map.unloaded_unit_which_contains_unit(grunt), Some(apc));
        assert_eq!(map.unit_on_tile(TileCoord::new(1, 2)), None);

        // The APC holds one passenger.
        let second = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(second, Some(TileCoord::new(1, 2)));
        map.load_unit(second, apc);
        assert!(!map.is_unit_loaded_onto_unit(second, apc));
        assert!(map.is_unit_on_map(second));

        map.unload_unit(grunt, apc, TileCoord::new(2, 1));
        assert_eq!(map.unit_position(grunt), Some(TileCoord::new(2, 1)));
        assert!(!map.is_unit_loaded_onto_unit(grunt, apc));
        assert_eq!(map.unloaded_unit_which_contains_unit(grunt), Some(grunt));
    }

    #[test]
    fn test_nested_loading_is_rejected() {
        let (mut map, army) = map_with_army();
        let apc_type = map.data().unit_type_id("apc").unwrap();

        let outer = map.create_unit(apc_type, army).unwrap();
        map.set_unit_position(outer, Some(TileCoord::new(0, 0)));
        let middle = map.create_unit(apc_type, army).unwrap();
        map.set_unit_position(middle, Some(TileCoord::new(0, 1)));
        let inner = map.create_unit(apc_type, army).unwrap();
        map.set_unit_position(inner, Some(TileCoord::new(0, 2)));

        map.load_unit(middle, outer);
        map.load_unit(inner, middle);
        assert!(!map.is_unit_loaded_onto_unit(inner, middle));
    }

    #[test]
    fn test_delete_transport_deletes_passengers() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let apc_type = map.data().unit_type_id("apc").unwrap();

        let apc = map.create_unit(apc_type, army).unwrap();
        map.set_unit_position(apc, Some(TileCoord::new(1, 1)));
        let grunt = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(grunt, Some(TileCoord::new(1, 2)));
        map.load_unit(grunt, apc);

        map.delete_unit(apc);
        assert!(!map.has_unit(apc));
        assert!(!map.has_unit(grunt));
        assert_eq!(map.unit_on_tile(TileCoord::new(1, 1)), None);
        assert!(map.units_of_army(army).is_empty());
    }

    #[test]
    fn test_unit_defence_follows_terrain() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let mountain = map.data().tile_type_id(MOUNTAIN).unwrap();
        map.set_tile_type(TileCoord::new(2, 2), mountain);

        let unit = map.create_unit(infantry, army).unwrap();
        assert_eq!(map.unit_defence(unit), 0);
        map.set_unit_position(unit, Some(TileCoord::new(0, 0)));
        assert_eq!(map.unit_defence(unit), 1);
        map.set_unit_position(unit, Some(TileCoord::new(2, 2)));
        assert_eq!(map.unit_defence(unit), 4);
    }

    #[test]
    fn test_capture_interruption_on_move() {
        let (mut map, army) = map_with_army();
        let infantry = map.data().unit_type_id("infantry").unwrap();
        let city = map.data().tile_type_id("city").unwrap();

        let pos = TileCoord::new(1, 1);
        map.set_tile_type(pos, city);
        let grunt = map.create_unit(infantry, army).unwrap();
        map.set_unit_position(grunt, Some(pos));
        map.set_unit_capturing(grunt, true);
        map.set_tile_hp(pos, 5);

        map.set_unit_position(grunt, Some(TileCoord::new(1, 2)));
        assert!(!map.is_unit_capturing(grunt));
        assert_eq!(map.tile_hp(pos), 20);
    }
}
