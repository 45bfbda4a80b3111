//! End-to-end scenarios driving the map core through its public surface:
//! a short skirmish with movement, fog, capturing, undo and a save/load
//! round trip.

use std::sync::Arc;

use ahash::AHashSet;
use warfield::catalog::{
    CountryDef, FowVisibility, GameData, MovementTypeDef, TerrainDef, TileTypeDef, UnitTypeDef,
};
use warfield::core::types::{ArmyId, GridSize, TileCoord};
use warfield::map::{JsonCodec, Map, MapEvent};

fn rule_set() -> Arc<GameData> {
    let mut data = GameData::new();
    let foot = data.add_movement_type(MovementTypeDef::new("foot", "Foot"));

    let plains = data.add_terrain(
        TerrainDef::new("plains", "Plains")
            .with_defence(1)
            .with_move_cost(foot, 1),
    );
    let swamp = data.add_terrain(
        TerrainDef::new("swamp", "Swamp")
            .with_fow(FowVisibility::Hidden)
            .with_move_cost(foot, 2),
    );
    let hq = data.add_terrain(
        TerrainDef::new("hq", "Headquarters")
            .with_defence(4)
            .with_max_hp(20)
            .with_move_cost(foot, 1),
    );
    let ridge = data.add_terrain(TerrainDef::new("ridge", "Ridge"));

    data.add_tile_type(TileTypeDef::new("plains", plains));
    data.add_tile_type(TileTypeDef::new("swamp", swamp));
    data.add_tile_type(TileTypeDef::new("hq", hq));
    data.add_tile_type(TileTypeDef::new("ridge", ridge));

    data.add_unit_type(
        UnitTypeDef::new("scout", "Scout", foot)
            .with_move_points(4)
            .with_max_fuel(40)
            .with_vision(2),
    );

    data.add_country(CountryDef::new("amber", "Amber Corps", 0));
    data.add_country(CountryDef::new("cobalt", "Cobalt Guard", 1));
    Arc::new(data)
}

fn battlefield() -> (Map, ArmyId, ArmyId) {
    let data = rule_set();
    let plains = data.tile_type_id("plains").unwrap();
    let amber = data.country_id("amber").unwrap();
    let cobalt = data.country_id("cobalt").unwrap();

    let mut map = Map::new(data);
    map.set_codec(Arc::new(JsonCodec));
    map.set_map_size(GridSize::new(8, 6), plains, None);
    map.set_map_name("Amber Crossing");

    let a = map.create_army(amber).unwrap();
    let b = map.create_army(cobalt).unwrap();
    map.add_memento("Deployment").unwrap();
    (map, a, b)
}

#[test]
fn scouting_under_fog_reveals_and_conceals() {
    let (mut map, a, b) = battlefield();
    map.enable_fow(true);
    let scout = map.data().unit_type_id("scout").unwrap();
    let swamp = map.data().tile_type_id("swamp").unwrap();
    map.set_tile_type(TileCoord::new(4, 2), swamp);

    let recon = map.create_unit(scout, a).unwrap();
    map.set_unit_position(recon, Some(TileCoord::new(2, 2)));

    assert!(map.is_tile_visible(TileCoord::new(3, 2), a));
    // The swamp is in range but too far to peer into.
    assert!(!map.is_tile_visible(TileCoord::new(4, 2), a));
    assert!(!map.is_tile_visible(TileCoord::new(3, 2), b));

    map.set_unit_position(recon, Some(TileCoord::new(3, 2)));
    assert!(map.is_tile_visible(TileCoord::new(4, 2), a));

    map.delete_unit(recon);
    assert!(!map.is_tile_visible(TileCoord::new(3, 2), a));
}

#[test]
fn planned_move_respects_fuel_and_is_interrupted_by_ambush() {
    let (mut map, a, b) = battlefield();
    let scout = map.data().unit_type_id("scout").unwrap();

    let runner = map.create_unit(scout, a).unwrap();
    map.set_unit_position(runner, Some(TileCoord::new(0, 0)));
    map.set_unit_fuel(runner, 3);

    let foot = map.data().movement_type_id("foot").unwrap();
    let team = map.army_team(a).unwrap();
    let path = map.find_path(
        TileCoord::new(0, 0),
        TileCoord::new(3, 0),
        foot,
        Some(4),
        Some(map.unit_fuel(runner)),
        Some(team),
        Some(a),
        false,
        false,
        &AHashSet::new(),
    );
    assert_eq!(path.len(), 4);
    assert_eq!(path.last().unwrap().g, 3);

    // An enemy submerged on the route interrupts the move at its tile.
    let lurker = map.create_unit(scout, b).unwrap();
    map.set_unit_position(lurker, Some(TileCoord::new(2, 0)));
    map.set_unit_hiding(lurker, true);
    assert_eq!(map.scan_path(&path, runner, 0), Some(2));

    // Out of fuel, the same destination is unreachable.
    map.set_unit_fuel(runner, 2);
    let dry = map.find_path(
        TileCoord::new(0, 0),
        TileCoord::new(3, 0),
        foot,
        Some(4),
        Some(map.unit_fuel(runner)),
        Some(team),
        Some(a),
        false,
        false,
        &AHashSet::new(),
    );
    assert!(dry.is_empty());
}

#[test]
fn capture_interrupted_by_owner_change_and_undone() {
    let (mut map, a, b) = battlefield();
    let scout = map.data().unit_type_id("scout").unwrap();
    let hq = map.data().tile_type_id("hq").unwrap();
    let post = TileCoord::new(5, 5);

    map.set_tile_type(post, hq);
    map.set_tile_owner(post, Some(b));

    let raider = map.create_unit(scout, a).unwrap();
    map.set_unit_position(raider, Some(post));
    map.set_unit_capturing(raider, true);
    map.set_tile_hp(post, 6);

    // The defenders retake the post; the capture resets.
    map.set_tile_owner(post, Some(b));
    assert_eq!(map.tile_hp(post), 6);
    map.set_tile_owner(post, None);
    assert!(!map.is_unit_capturing(raider));
    assert_eq!(map.tile_hp(post), 20);

    // The whole exchange unwinds one memento at a time, all the way back
    // to the freshly sized grid, and replays forward again.
    while map.undo(0).unwrap() {}
    assert_eq!(map.army_count(), 0);
    assert_eq!(map.size(), GridSize::new(8, 6));
    assert!(map.tile_owner(post).is_none());

    while map.redo(0).unwrap() {}
    assert_eq!(map.army_count(), 2);
    assert!(!map.is_unit_capturing(raider));
    assert_eq!(map.tile_hp(post), 20);
}

#[test]
fn save_load_and_journal_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("crossing.map");

    let (mut map, a, _) = battlefield();
    let scout = map.data().unit_type_id("scout").unwrap();
    let patrol = map.create_unit(scout, a).unwrap();
    map.set_unit_position(patrol, Some(TileCoord::new(1, 1)));
    map.set_army_funds(a, 9000);
    map.save(&file, 0).unwrap();

    map.rectangle_delete_units(TileCoord::new(0, 0), TileCoord::new(7, 5));
    map.set_army_funds(a, 0);
    assert!(!map.has_unit(patrol));

    map.load(&file, 0).unwrap();
    assert!(map.has_unit(patrol));
    assert_eq!(map.unit_position(patrol), Some(TileCoord::new(1, 1)));
    assert_eq!(map.army_funds(a), Some(9000));
    assert_eq!(map.map_name(), "Amber Crossing");

    // Equal-value writes leave no undo step behind.
    let entries = map.memento_names().0.len();
    map.set_army_funds(a, map.army_funds(a).unwrap());
    map.set_unit_hp(patrol, map.unit_hp(patrol));
    assert_eq!(map.memento_names().0.len(), entries);
}

#[test]
fn mutations_queue_render_notifications() {
    let (mut map, a, _) = battlefield();
    map.drain_events();

    let scout = map.data().unit_type_id("scout").unwrap();
    let unit = map.create_unit(scout, a).unwrap();
    map.set_unit_position(unit, Some(TileCoord::new(0, 3)));
    map.set_tile_owner(TileCoord::new(4, 4), Some(a));
    map.delete_unit(unit);

    let events = map.drain_events();
    assert!(events.contains(&MapEvent::UnitChanged(unit)));
    assert!(events.contains(&MapEvent::TileChanged(TileCoord::new(4, 4))));
    assert!(events.contains(&MapEvent::UnitDestroyed {
        unit,
        position: Some(TileCoord::new(0, 3)),
    }));
    assert!(map.drain_events().is_empty());
}
