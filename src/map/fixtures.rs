//! Shared fixtures for the map test suites: a compact rule set with enough
//! terrain and unit variety to exercise movement, fog and structures.

use std::sync::Arc;

use crate::catalog::{
    CommanderDef, CountryDef, FowVisibility, GameData, MovementTypeDef, StructureDef,
    StructureTileSpec, TerrainDef, TileTypeDef, UnitTypeDef, WeaponDef,
};
use crate::core::types::GridSize;
use crate::map::{JsonCodec, Map};

pub const PLAINS: &str = "plains";
pub const ROAD: &str = "road";
pub const WOODS: &str = "woods";
pub const MOUNTAIN: &str = "mountain";
pub const SEA: &str = "sea";
pub const BEACON: &str = "beacon";
pub const CITY: &str = "city";

pub fn game_data() -> Arc<GameData> {
    let mut data = GameData::new();

    let foot = data.add_movement_type(MovementTypeDef::new("foot", "Foot"));
    let tread = data.add_movement_type(MovementTypeDef::new("tread", "Tread"));

    let plains = data.add_terrain(
        TerrainDef::new(PLAINS, "Plains")
            .with_defence(1)
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );
    let road = data.add_terrain(
        TerrainDef::new(ROAD, "Road")
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );
    let woods = data.add_terrain(
        TerrainDef::new(WOODS, "Woods")
            .with_defence(2)
            .with_fow(FowVisibility::Hidden)
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 2),
    );
    let mountain = data.add_terrain(
        TerrainDef::new(MOUNTAIN, "Mountain")
            .with_defence(4)
            .with_vision_offset(2)
            .with_move_cost(foot, 2),
    );
    let sea = data.add_terrain(TerrainDef::new(SEA, "Sea"));
    let beacon = data.add_terrain(
        TerrainDef::new(BEACON, "Beacon")
            .with_fow(FowVisibility::AlwaysVisible)
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );
    let city = data.add_terrain(
        TerrainDef::new(CITY, "City")
            .with_defence(3)
            .with_max_hp(20)
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );
    let fort = data.add_terrain(
        TerrainDef::new("fort", "Fortress")
            .with_defence(4)
            .with_max_hp(40)
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );
    let ruins = data.add_terrain(
        TerrainDef::new("ruins", "Ruins")
            .with_move_cost(foot, 1)
            .with_move_cost(tread, 1),
    );

    let plains_tile = data.add_tile_type(TileTypeDef::new(PLAINS, plains));
    data.add_tile_type(TileTypeDef::new(ROAD, road));
    data.add_tile_type(TileTypeDef::new(WOODS, woods));
    data.add_tile_type(TileTypeDef::new(MOUNTAIN, mountain));
    data.add_tile_type(TileTypeDef::new(SEA, sea));
    data.add_tile_type(TileTypeDef::new(BEACON, beacon));
    data.add_tile_type(TileTypeDef::new(CITY, city));
    let fort_tile = data.add_tile_type(TileTypeDef::new("fort", fort));
    let fort_wing_tile = data.add_tile_type(TileTypeDef::new("fort_wing", fort));
    let fort_ruins_tile = data.add_tile_type(TileTypeDef::new("fort_ruins", ruins));
    let fort_wing_ruins_tile = data.add_tile_type(TileTypeDef::new("fort_wing_ruins", ruins));

    data.add_structure(
        StructureDef::new(
            "fortress",
            "Fortress",
            StructureTileSpec {
                normal: fort_tile,
                destroyed: fort_ruins_tile,
                deleted: Some(plains_tile),
            },
        )
        .with_dependent(
            (1, 0),
            StructureTileSpec {
                normal: fort_wing_tile,
                destroyed: fort_wing_ruins_tile,
                deleted: Some(plains_tile),
            },
        ),
    );

    data.add_unit_type(
        UnitTypeDef::new("infantry", "Infantry", foot)
            .with_move_points(3)
            .with_max_fuel(99)
            .with_vision(2),
    );
    data.add_unit_type(
        UnitTypeDef::new("tank", "Tank", tread)
            .with_move_points(6)
            .with_max_fuel(70)
            .with_vision(3)
            .with_weapon(WeaponDef::new("cannon", 9))
            .with_weapon(WeaponDef::new("mg", -1)),
    );
    data.add_unit_type(
        UnitTypeDef::new("apc", "APC", tread)
            .with_move_points(6)
            .with_max_fuel(70)
            .with_vision(1)
            .with_load_limit(1),
    );

    data.add_country(CountryDef::new("orange", "Orange Star", 0));
    data.add_country(CountryDef::new("blue", "Blue Moon", 1));
    data.add_country(CountryDef::new("green", "Green Earth", 2));

    data.add_commander(CommanderDef::new("nova", "Nova"));
    data.add_commander(CommanderDef::new("rex", "Rex"));

    Arc::new(data)
}

/// A plains-filled map with the fixture rule set and the JSON codec
/// installed.
pub fn small_map(width: u32, height: u32) -> Map {
    let data = game_data();
    let plains = data.tile_type_id(PLAINS).expect("fixture tile type");
    let mut map = Map::new(data);
    map.set_codec(Arc::new(JsonCodec));
    map.set_map_size(GridSize::new(width, height), plains, None);
    map
}
