//! The serialization boundary: full-state snapshots, the codec trait that
//! owns the byte layout, and the save/load/undo/redo round trips built on
//! top of it.
//!
//! Snapshots reference definitions by script name so they survive catalog
//! reloads, and all derived state (owned-tile sets, occupancy, transport
//! links, vision caches) is rebuilt on apply. Equal map states therefore
//! serialize byte-identically.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{MapError, Result};
use crate::core::types::{Ammo, ArmyId, Day, Funds, Fuel, GridSize, Hp, TeamId, TileCoord, UnitId};
use crate::map::army::Army;
use crate::map::journal::Memento;
use crate::map::tile::{Tile, TileStructure};
use crate::map::unit::Unit;
use crate::map::{Map, MapEvent};

/// Newest stream format version understood by [`JsonCodec`]. Version 0 in a
/// call means "the latest".
pub const FORMAT_VERSION: u8 = 1;

/// Serialized persisted state of a whole map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    pub name: String,
    pub day: Day,
    pub fow: bool,
    pub size: GridSize,
    /// Row-major, `y * width + x`.
    pub tiles: Vec<TileState>,
    /// Sorted by army id (turn order).
    pub armies: Vec<ArmyState>,
    /// Sorted by unit id.
    pub units: Vec<UnitState>,
    pub last_unit_id: u32,
    pub team_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileState {
    pub tile_type: String,
    pub hp: Hp,
    pub owner: Option<ArmyId>,
    pub structure: Option<StructureState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    pub structure: String,
    pub offset: (i32, i32),
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmyState {
    pub id: ArmyId,
    pub country: String,
    pub team: TeamId,
    pub funds: Funds,
    pub commander: Option<String>,
    pub tag_commander: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub id: UnitId,
    pub unit_type: String,
    pub army: ArmyId,
    pub position: Option<TileCoord>,
    pub hp: Hp,
    pub fuel: Fuel,
    /// Sorted by weapon name for a stable byte layout.
    pub ammo: BTreeMap<String, Ammo>,
    pub waiting: bool,
    pub capturing: bool,
    pub hiding: bool,
    pub loaded_onto: Option<UnitId>,
}

/// Produces and consumes the version-tagged opaque stream. The byte layout
/// belongs entirely to the codec; the core only hands it [`MapState`]
/// values.
pub trait MapCodec {
    fn encode(&self, state: &MapState, version: u8) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8], version: u8) -> Result<MapState>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u8,
    state: &'a MapState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u8,
    state: MapState,
}

/// Built-in JSON stream codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MapCodec for JsonCodec {
    fn encode(&self, state: &MapState, version: u8) -> Result<Vec<u8>> {
        let version = if version == 0 { FORMAT_VERSION } else { version };
        if version > FORMAT_VERSION {
            return Err(MapError::Codec(format!(
                "cannot write unknown format version {version}"
            )));
        }
        Ok(serde_json::to_vec(&EnvelopeRef { version, state })?)
    }

    fn decode(&self, bytes: &[u8], version: u8) -> Result<MapState> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.version == 0 || envelope.version > FORMAT_VERSION {
            return Err(MapError::Codec(format!(
                "unsupported format version {}",
                envelope.version
            )));
        }
        if version != 0 && envelope.version != version {
            return Err(MapError::Codec(format!(
                "expected format version {version}, found {}",
                envelope.version
            )));
        }
        Ok(envelope.state)
    }
}

/// Fully validated tables, built before anything touches the live map.
struct RestoredTables {
    tiles: Vec<Tile>,
    armies: BTreeMap<ArmyId, Army>,
    units: AHashMap<UnitId, Unit>,
}

impl Map {
    /// Capture the persisted state. Pure read; derived caches are not
    /// serialized.
    pub fn snapshot(&self) -> MapState {
        let data = &self.data;
        let tiles = self
            .tiles
            .iter()
            .map(|t| TileState {
                tile_type: data.tile_type(t.tile_type).script_name.clone(),
                hp: t.hp,
                owner: t.owner,
                structure: t.structure.as_ref().map(|s| StructureState {
                    structure: data.structure(s.structure).script_name.clone(),
                    offset: s.offset,
                    destroyed: s.destroyed,
                }),
            })
            .collect();
        let armies = self
            .armies
            .iter()
            .map(|(id, a)| ArmyState {
                id: *id,
                country: data.country(a.country).script_name.clone(),
                team: a.team,
                funds: a.funds,
                commander: a.commander.map(|c| data.commander(c).script_name.clone()),
                tag_commander: a
                    .tag_commander
                    .map(|c| data.commander(c).script_name.clone()),
            })
            .collect();
        let mut unit_ids: Vec<UnitId> = self.units.keys().copied().collect();
        unit_ids.sort();
        let units = unit_ids
            .into_iter()
            .map(|id| {
                let u = &self.units[&id];
                UnitState {
                    id,
                    unit_type: data.unit_type(u.unit_type).script_name.clone(),
                    army: u.army,
                    position: u.position,
                    hp: u.hp,
                    fuel: u.fuel,
                    ammo: u.ammo.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                    waiting: u.waiting,
                    capturing: u.capturing,
                    hiding: u.hiding,
                    loaded_onto: u.loaded_onto,
                }
            })
            .collect();
        MapState {
            name: self.name.clone(),
            day: self.day,
            fow: self.fow,
            size: self.size,
            tiles,
            armies,
            units,
            last_unit_id: self.last_unit_id,
            team_counter: self.team_counter,
        }
    }

    /// Resolve and validate a snapshot into fresh tables without touching
    /// the live state. All-or-nothing: any unknown name or broken invariant
    /// fails before a single field is committed.
    fn build_tables(&self, state: &MapState) -> Result<RestoredTables> {
        if state.tiles.len() != state.size.area() {
            return Err(MapError::InvalidSnapshot(format!(
                "{} tiles for a {} grid",
                state.tiles.len(),
                state.size
            )));
        }
        let data = &self.data;

        let mut armies: BTreeMap<ArmyId, Army> = BTreeMap::new();
        for a in &state.armies {
            let country = data
                .country_id(&a.country)
                .ok_or_else(|| MapError::UnknownDefinition(a.country.clone()))?;
            if data.country(country).turn_order != a.id.0 {
                return Err(MapError::InvalidSnapshot(format!(
                    "army {} does not match country \"{}\" turn order",
                    a.id, a.country
                )));
            }
            let mut army = Army::new(country, a.team);
            army.funds = a.funds.max(0);
            army.commander = a
                .commander
                .as_deref()
                .map(|name| {
                    data.commander_id(name)
                        .ok_or_else(|| MapError::UnknownDefinition(name.to_string()))
                })
                .transpose()?;
            army.tag_commander = a
                .tag_commander
                .as_deref()
                .map(|name| {
                    data.commander_id(name)
                        .ok_or_else(|| MapError::UnknownDefinition(name.to_string()))
                })
                .transpose()?;
            if armies.insert(a.id, army).is_some() {
                return Err(MapError::InvalidSnapshot(format!("duplicate army {}", a.id)));
            }
        }

        let mut tiles = Vec::with_capacity(state.tiles.len());
        for (index, t) in state.tiles.iter().enumerate() {
            let tile_type = data
                .tile_type_id(&t.tile_type)
                .ok_or_else(|| MapError::UnknownDefinition(t.tile_type.clone()))?;
            let structure = t
                .structure
                .as_ref()
                .map(|s| {
                    data.structure_id(&s.structure)
                        .map(|structure| TileStructure {
                            structure,
                            offset: s.offset,
                            destroyed: s.destroyed,
                        })
                        .ok_or_else(|| MapError::UnknownDefinition(s.structure.clone()))
                })
                .transpose()?;
            let coord = TileCoord::new(
                (index as u32) % state.size.width,
                (index as u32) / state.size.width,
            );
            if let Some(owner) = t.owner {
                let Some(army) = armies.get_mut(&owner) else {
                    return Err(MapError::InvalidSnapshot(format!(
                        "tile {coord} is owned by missing army {owner}"
                    )));
                };
                army.tiles.insert(coord);
            }
            let max_hp = data.terrain_of(tile_type).max_hp;
            tiles.push(Tile {
                tile_type,
                hp: t.hp.clamp(0, max_hp),
                owner: t.owner,
                occupant: None,
                structure,
            });
        }

        let mut units: AHashMap<UnitId, Unit> = AHashMap::new();
        for u in &state.units {
            let unit_type = data
                .unit_type_id(&u.unit_type)
                .ok_or_else(|| MapError::UnknownDefinition(u.unit_type.clone()))?;
            let Some(army) = armies.get_mut(&u.army) else {
                return Err(MapError::InvalidSnapshot(format!(
                    "unit {} belongs to missing army {}",
                    u.id, u.army
                )));
            };
            let mut unit = Unit::new(data, unit_type, u.army);
            unit.position = u.position;
            unit.hp = u.hp;
            unit.fuel = u.fuel;
            unit.ammo = u.ammo.iter().map(|(k, v)| (k.clone(), *v)).collect();
            unit.waiting = u.waiting;
            unit.capturing = u.capturing;
            unit.hiding = u.hiding;
            unit.loaded_onto = u.loaded_onto;
            if let Some(pos) = u.position {
                if !state.size.contains(pos) {
                    return Err(MapError::InvalidSnapshot(format!(
                        "unit {} stands out of bounds at {pos}",
                        u.id
                    )));
                }
                if u.loaded_onto.is_some() {
                    return Err(MapError::InvalidSnapshot(format!(
                        "unit {} is both on the map and loaded",
                        u.id
                    )));
                }
                let index = pos.y as usize * state.size.width as usize + pos.x as usize;
                if let Some(standing) = tiles[index].occupant {
                    return Err(MapError::InvalidSnapshot(format!(
                        "units {standing} and {} share tile {pos}",
                        u.id
                    )));
                }
                tiles[index].occupant = Some(u.id);
            }
            army.units.insert(u.id);
            if units.insert(u.id, unit).is_some() {
                return Err(MapError::InvalidSnapshot(format!("duplicate unit {}", u.id)));
            }
        }
        for u in &state.units {
            let Some(transport) = u.loaded_onto else {
                continue;
            };
            if transport == u.id {
                return Err(MapError::InvalidSnapshot(format!(
                    "unit {} is loaded onto itself",
                    u.id
                )));
            }
            let Some(carrier) = units.get(&transport) else {
                return Err(MapError::InvalidSnapshot(format!(
                    "unit {} is loaded onto missing unit {transport}",
                    u.id
                )));
            };
            if carrier.loaded_onto.is_some() {
                return Err(MapError::InvalidSnapshot(format!(
                    "unit {} is loaded onto unit {transport}, which is itself loaded",
                    u.id
                )));
            }
            if let Some(carrier) = units.get_mut(&transport) {
                carrier.loaded_units.insert(u.id);
            }
        }

        Ok(RestoredTables {
            tiles,
            armies,
            units,
        })
    }

    /// Replace the live state with validated tables. Runtime-only state
    /// (selection, vision caches) is reset or rebuilt.
    fn commit_state(&mut self, state: &MapState, tables: RestoredTables) {
        self.name = state.name.clone();
        self.day = state.day;
        self.fow = state.fow;
        self.size = state.size;
        self.tiles = tables.tiles;
        self.armies = tables.armies;
        self.units = tables.units;
        self.last_unit_id = state.last_unit_id;
        self.team_counter = state.team_counter;
        self.selected_tile = TileCoord::new(0, 0);
        self.selected_unit = None;
        self.recompute_vision_caches();
        self.push_event(MapEvent::MapReloaded);
    }

    /// Clear every table, counter and the journal back to the uninitialized
    /// state.
    fn reset(&mut self) {
        self.name.clear();
        self.size = GridSize::default();
        self.tiles.clear();
        self.units.clear();
        self.armies.clear();
        self.last_unit_id = 0;
        self.team_counter = 0;
        self.day = 0;
        self.fow = false;
        self.selected_tile = TileCoord::new(0, 0);
        self.selected_unit = None;
        self.changed = false;
        self.filename = None;
        self.journal.clear();
        self.events = VecDeque::new();
    }

    /// Serialize the current state to a file. The live map is not mutated;
    /// encode or IO failure leaves everything untouched.
    pub fn save(&mut self, path: &Path, version: u8) -> Result<()> {
        let codec = self.codec.clone().ok_or(MapError::CodecNotSet)?;
        let state = self.snapshot();
        let bytes = codec.encode(&state, version).inspect_err(|e| {
            tracing::error!("save failed: could not encode map \"{}\": {e}", self.name);
        })?;
        std::fs::write(path, bytes).inspect_err(|e| {
            tracing::error!("save failed: could not write \"{}\": {e}", path.display());
        })?;
        self.filename = Some(path.to_path_buf());
        self.changed = false;
        Ok(())
    }

    /// Replace all state from a file. The previous state is discarded
    /// unconditionally, even on failure: a failed load leaves the
    /// freshly-reset empty map, not the old one. On success the journal is
    /// reinitialized with a single load memento and the changed flag is
    /// cleared.
    pub fn load(&mut self, path: &Path, version: u8) -> Result<()> {
        let codec = self.codec.clone().ok_or(MapError::CodecNotSet)?;
        self.reset();
        let state = std::fs::read(path)
            .map_err(MapError::from)
            .and_then(|bytes| codec.decode(&bytes, version))
            .and_then(|state| {
                let tables = self.build_tables(&state)?;
                Ok((state, tables))
            });
        match state {
            Ok((state, tables)) => {
                self.journal.set_hard_disabled(true);
                self.commit_state(&state, tables);
                self.journal.set_hard_disabled(false);
                self.filename = Some(path.to_path_buf());
                self.create_memento(crate::map::MapOperation::LoadMap.name());
                self.changed = false;
                Ok(())
            }
            Err(e) => {
                tracing::error!("load failed: could not load \"{}\": {e}", path.display());
                Err(e)
            }
        }
    }

    /// Path of the last successful save or load.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Capture one memento now. Hard-fails without a codec; silently skipped
    /// while capture is suspended.
    pub fn add_memento(&mut self, name: &str) -> Result<()> {
        if self.codec.is_none() {
            return Err(MapError::CodecNotSet);
        }
        if !self.journal.is_enabled() || self.journal.is_hard_disabled() {
            return Ok(());
        }
        self.create_memento(name);
        Ok(())
    }

    /// Snapshot the map into the journal. Capture faults are logged and the
    /// journal is left untouched.
    pub(crate) fn create_memento(&mut self, name: &str) {
        if self.journal.is_hard_disabled() {
            return;
        }
        let Some(codec) = self.codec.clone() else {
            tracing::debug!("no codec configured, skipping memento \"{name}\"");
            return;
        };
        self.journal.set_hard_disabled(true);
        let state = self.snapshot();
        let encoded = codec.encode(&state, 0);
        self.journal.set_hard_disabled(false);
        match encoded {
            Ok(bytes) => {
                self.journal.push(Memento {
                    name: name.to_string(),
                    bytes,
                });
                self.changed = true;
                self.push_event(MapEvent::MementosChanged);
            }
            Err(e) => tracing::error!("failed to capture memento \"{name}\": {e}"),
        }
    }

    /// Step `1 + additional` snapshots back and replay the state the map
    /// had then. `additional` is clamped (with a warning) to what the undo
    /// history allows; returns whether anything was undone.
    pub fn undo(&mut self, additional: usize) -> Result<bool> {
        if self.journal.undo_len() <= 1 {
            return Ok(false);
        }
        let max_additional = self.journal.undo_len() - 2;
        let additional = if additional > max_additional {
            tracing::warn!(
                "undo: {additional} additional steps requested, clamping to {max_additional}"
            );
            max_additional
        } else {
            additional
        };
        let steps = additional + 1;
        let Some(memento) = self.journal.undo_get(steps) else {
            return Ok(false);
        };
        let bytes = memento.bytes.clone();
        self.apply_memento_bytes(&bytes)?;
        self.journal.shift_to_redo(steps);
        self.push_event(MapEvent::MementosChanged);
        Ok(true)
    }

    /// Step `1 + additional` snapshots forward again. Clamped like
    /// [`Map::undo`]; returns whether anything was redone.
    pub fn redo(&mut self, additional: usize) -> Result<bool> {
        if self.journal.redo_len() == 0 {
            return Ok(false);
        }
        let max_additional = self.journal.redo_len() - 1;
        let additional = if additional > max_additional {
            tracing::warn!(
                "redo: {additional} additional steps requested, clamping to {max_additional}"
            );
            max_additional
        } else {
            additional
        };
        let steps = additional + 1;
        let Some(memento) = self.journal.redo_get(steps - 1) else {
            return Ok(false);
        };
        let bytes = memento.bytes.clone();
        self.apply_memento_bytes(&bytes)?;
        self.journal.shift_to_undo(steps);
        self.push_event(MapEvent::MementosChanged);
        Ok(true)
    }

    /// Decode and commit a stored snapshot. Strong guarantee: any decode or
    /// validation failure leaves the live map unchanged. The journal is
    /// hard-disabled around the commit so replay can never snapshot itself.
    fn apply_memento_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let codec = self.codec.clone().ok_or(MapError::CodecNotSet)?;
        let state = codec.decode(bytes, 0)?;
        let tables = self.build_tables(&state)?;
        self.journal.set_hard_disabled(true);
        self.commit_state(&state, tables);
        self.journal.set_hard_disabled(false);
        Ok(())
    }
}
