//! Immutable game definitions: terrains, tile types, unit types, movement
//! types, countries, commanders and multi-tile structures.
//!
//! Definitions are loaded once, stored in arenas and referenced everywhere
//! else by typed index ids. Mutable map state never holds a definition
//! directly, only an id into [`GameData`].

pub mod factions;
pub mod terrain;
pub mod units;

use ahash::AHashMap;

pub use factions::{CommanderDef, CountryDef};
pub use terrain::{
    DependentTile, FowVisibility, StructureDef, StructureTileSpec, TerrainDef, TileTypeDef,
};
pub use units::{MovementTypeDef, UnitTypeDef, WeaponDef};

macro_rules! catalog_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u16);

        impl $name {
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

catalog_id!(
    /// Index into the terrain arena.
    TerrainId
);
catalog_id!(
    /// Index into the tile-type arena.
    TileTypeId
);
catalog_id!(
    /// Index into the movement-type arena.
    MovementTypeId
);
catalog_id!(
    /// Index into the unit-type arena.
    UnitTypeId
);
catalog_id!(
    /// Index into the country arena.
    CountryId
);
catalog_id!(
    /// Index into the commander arena.
    CommanderId
);
catalog_id!(
    /// Index into the structure arena.
    StructureId
);

fn warn_duplicate<T>(previous: Option<T>, kind: &str, name: &str) {
    if previous.is_some() {
        tracing::warn!("duplicate {kind} script name \"{name}\", later definition wins");
    }
}

/// All game definitions for one rule set.
#[derive(Debug, Default)]
pub struct GameData {
    terrains: Vec<TerrainDef>,
    terrain_index: AHashMap<String, TerrainId>,
    tile_types: Vec<TileTypeDef>,
    tile_type_index: AHashMap<String, TileTypeId>,
    movement_types: Vec<MovementTypeDef>,
    movement_type_index: AHashMap<String, MovementTypeId>,
    unit_types: Vec<UnitTypeDef>,
    unit_type_index: AHashMap<String, UnitTypeId>,
    countries: Vec<CountryDef>,
    country_index: AHashMap<String, CountryId>,
    commanders: Vec<CommanderDef>,
    commander_index: AHashMap<String, CommanderId>,
    structures: Vec<StructureDef>,
    structure_index: AHashMap<String, StructureId>,
}

impl GameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_terrain(&mut self, def: TerrainDef) -> TerrainId {
        let id = TerrainId(self.terrains.len() as u16);
        warn_duplicate(self.terrain_index.insert(def.script_name.clone(), id), "terrain", &def.script_name);
        self.terrains.push(def);
        id
    }

    pub fn add_tile_type(&mut self, def: TileTypeDef) -> TileTypeId {
        let id = TileTypeId(self.tile_types.len() as u16);
        warn_duplicate(self.tile_type_index.insert(def.script_name.clone(), id), "tile type", &def.script_name);
        self.tile_types.push(def);
        id
    }

    pub fn add_movement_type(&mut self, def: MovementTypeDef) -> MovementTypeId {
        let id = MovementTypeId(self.movement_types.len() as u16);
        warn_duplicate(
            self.movement_type_index.insert(def.script_name.clone(), id),
            "movement type",
            &def.script_name,
        );
        self.movement_types.push(def);
        id
    }

    pub fn add_unit_type(&mut self, def: UnitTypeDef) -> UnitTypeId {
        let id = UnitTypeId(self.unit_types.len() as u16);
        warn_duplicate(self.unit_type_index.insert(def.script_name.clone(), id), "unit type", &def.script_name);
        self.unit_types.push(def);
        id
    }

    pub fn add_country(&mut self, def: CountryDef) -> CountryId {
        let id = CountryId(self.countries.len() as u16);
        warn_duplicate(self.country_index.insert(def.script_name.clone(), id), "country", &def.script_name);
        self.countries.push(def);
        id
    }

    pub fn add_commander(&mut self, def: CommanderDef) -> CommanderId {
        let id = CommanderId(self.commanders.len() as u16);
        warn_duplicate(self.commander_index.insert(def.script_name.clone(), id), "commander", &def.script_name);
        self.commanders.push(def);
        id
    }

    pub fn add_structure(&mut self, def: StructureDef) -> StructureId {
        let id = StructureId(self.structures.len() as u16);
        warn_duplicate(self.structure_index.insert(def.script_name.clone(), id), "structure", &def.script_name);
        self.structures.push(def);
        id
    }

    pub fn terrain(&self, id: TerrainId) -> &TerrainDef {
        &self.terrains[id.index()]
    }

    pub fn tile_type(&self, id: TileTypeId) -> &TileTypeDef {
        &self.tile_types[id.index()]
    }

    pub fn movement_type(&self, id: MovementTypeId) -> &MovementTypeDef {
        &self.movement_types[id.index()]
    }

    pub fn unit_type(&self, id: UnitTypeId) -> &UnitTypeDef {
        &self.unit_types[id.index()]
    }

    pub fn country(&self, id: CountryId) -> &CountryDef {
        &self.countries[id.index()]
    }

    pub fn commander(&self, id: CommanderId) -> &CommanderDef {
        &self.commanders[id.index()]
    }

    pub fn structure(&self, id: StructureId) -> &StructureDef {
        &self.structures[id.index()]
    }

    /// Terrain definition behind a tile type.
    pub fn terrain_of(&self, tile_type: TileTypeId) -> &TerrainDef {
        self.terrain(self.tile_type(tile_type).terrain)
    }

    pub fn terrain_id(&self, script_name: &str) -> Option<TerrainId> {
        self.terrain_index.get(script_name).copied()
    }

    pub fn tile_type_id(&self, script_name: &str) -> Option<TileTypeId> {
        self.tile_type_index.get(script_name).copied()
    }

    pub fn movement_type_id(&self, script_name: &str) -> Option<MovementTypeId> {
        self.movement_type_index.get(script_name).copied()
    }

    pub fn unit_type_id(&self, script_name: &str) -> Option<UnitTypeId> {
        self.unit_type_index.get(script_name).copied()
    }

    pub fn country_id(&self, script_name: &str) -> Option<CountryId> {
        self.country_index.get(script_name).copied()
    }

    pub fn commander_id(&self, script_name: &str) -> Option<CommanderId> {
        self.commander_index.get(script_name).copied()
    }

    pub fn structure_id(&self, script_name: &str) -> Option<StructureId> {
        self.structure_index.get(script_name).copied()
    }

    /// Structure whose root tile type matches the given type, if any.
    pub fn structure_with_root(&self, tile_type: TileTypeId) -> Option<StructureId> {
        self.structures
            .iter()
            .position(|s| s.root.normal == tile_type)
            .map(|i| StructureId(i as u16))
    }

    pub fn countries(&self) -> impl Iterator<Item = (CountryId, &CountryDef)> {
        self.countries
            .iter()
            .enumerate()
            .map(|(i, c)| (CountryId(i as u16), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_script_name() {
        let mut data = GameData::new();
        let plains = data.add_terrain(TerrainDef::new("plains", "Plains"));
        let id = data.add_tile_type(TileTypeDef::new("plains_tile", plains));

        assert_eq!(data.tile_type_id("plains_tile"), Some(id));
        assert_eq!(data.tile_type_id("missing"), None);
        assert_eq!(data.terrain_of(id).script_name, "plains");
    }

    #[test]
    fn test_countries_iterate_in_insertion_order() {
        let mut data = GameData::new();
        data.add_country(CountryDef::new("red", "Red Star", 0));
        data.add_country(CountryDef::new("blue", "Blue Moon", 1));

        let orders: Vec<u32> = data.countries().map(|(_, c)| c.turn_order).collect();
        assert_eq!(orders, vec![0, 1]);
    }
}
