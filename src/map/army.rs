//! Armies: creation, deletion, teams, funds, commanders and the owned
//! unit/tile sets.

use ahash::AHashSet;

use crate::catalog::{CommanderId, CountryId, TerrainId};
use crate::core::types::{ArmyId, Funds, TeamId, TileCoord, UnitId};
use crate::map::journal::MapOperation;
use crate::map::visibility::VisionCache;
use crate::map::Map;

/// A player-controlled faction. Owned unit/tile sets are maintained by the
/// map facade; the vision cache is updated on its behalf whenever a unit's
/// footprint changes.
#[derive(Debug, Clone)]
pub struct Army {
    pub country: CountryId,
    pub team: TeamId,
    pub funds: Funds,
    pub commander: Option<CommanderId>,
    pub tag_commander: Option<CommanderId>,
    pub units: AHashSet<UnitId>,
    pub tiles: AHashSet<TileCoord>,
    pub vision: VisionCache,
}

impl Army {
    pub fn new(country: CountryId, team: TeamId) -> Self {
        Self {
            country,
            team,
            funds: 0,
            commander: None,
            tag_commander: None,
            units: AHashSet::new(),
            tiles: AHashSet::new(),
            vision: VisionCache::new(),
        }
    }
}

impl Map {
    /// Create the army for a country. Its id is the country's turn-order
    /// value and its team comes from a wrapping counter. At most one army
    /// per country may exist on a map.
    pub fn create_army(&mut self, country: CountryId) -> Option<ArmyId> {
        let id = ArmyId(self.data.country(country).turn_order);
        if self.armies.contains_key(&id) {
            tracing::error!(
                "create_army cancelled: an army for country \"{}\" already exists",
                self.data.country(country).script_name
            );
            return None;
        }
        self.with_memento(MapOperation::CreateArmy, |m| {
            let team = TeamId(m.team_counter);
            m.team_counter = m.team_counter.wrapping_add(1);
            m.armies.insert(id, Army::new(country, team));
            Some(id)
        })
    }

    /// Delete an army: every unit it owns dies (ordinary recursive unit
    /// deletion), every owned tile is handed to `transfer` or disowned, and
    /// only then is the army itself erased.
    pub fn delete_army(&mut self, army: ArmyId, transfer: Option<ArmyId>) {
        if !self.armies.contains_key(&army) {
            tracing::error!("delete_army cancelled: army {army} does not exist");
            return;
        }
        if let Some(target) = transfer {
            if target == army {
                tracing::error!(
                    "delete_army cancelled: army {army} cannot transfer its tiles to itself"
                );
                return;
            }
            if !self.armies.contains_key(&target) {
                tracing::error!(
                    "delete_army cancelled: cannot transfer army {army}'s tiles to army {target}, which does not exist"
                );
                return;
            }
        }
        self.with_memento(MapOperation::DeleteArmy, |m| {
            let units: Vec<UnitId> = m.armies[&army].units.iter().copied().collect();
            // Recursive deletion may have taken a passenger out already.
            for unit in units {
                if m.units.contains_key(&unit) {
                    m.delete_unit(unit);
                }
            }
            let tiles: Vec<TileCoord> = m.armies[&army].tiles.iter().copied().collect();
            for tile in tiles {
                m.set_tile_owner(tile, transfer);
            }
            m.armies.remove(&army);
        });
    }

    pub fn army_count(&self) -> usize {
        self.armies.len()
    }

    /// Army ids in turn order.
    pub fn army_ids(&self) -> Vec<ArmyId> {
        self.armies.keys().copied().collect()
    }

    pub fn army_team(&self, army: ArmyId) -> Option<TeamId> {
        match self.armies.get(&army) {
            Some(a) => Some(a.team),
            None => {
                tracing::error!("army_team failed: army {army} does not exist");
                None
            }
        }
    }

    /// Reassign an army's team. Every capture the army's units were working
    /// on, and every capture happening on its tiles, is interrupted: the
    /// ally/enemy partition just changed under them.
    pub fn set_army_team(&mut self, army: ArmyId, team: TeamId) {
        if !self.armies.contains_key(&army) {
            tracing::error!("set_army_team cancelled: army {army} does not exist");
            return;
        }
        if self.armies[&army].team == team {
            return;
        }
        self.with_memento(MapOperation::ArmyTeam, |m| {
            if let Some(a) = m.armies.get_mut(&army) {
                a.team = team;
            }
            let units: Vec<UnitId> = m.armies[&army].units.iter().copied().collect();
            for unit in units {
                m.interrupt_capture(unit);
            }
            let tiles: Vec<TileCoord> = m.armies[&army].tiles.iter().copied().collect();
            for tile in tiles {
                if let Some(unit) = m.unit_on_tile(tile) {
                    m.interrupt_capture(unit);
                }
            }
        });
    }

    pub fn army_funds(&self, army: ArmyId) -> Option<Funds> {
        match self.armies.get(&army) {
            Some(a) => Some(a.funds),
            None => {
                tracing::error!("army_funds failed: army {army} does not exist");
                None
            }
        }
    }

    /// Set an army's funds, clamped at zero.
    pub fn set_army_funds(&mut self, army: ArmyId, funds: Funds) {
        if !self.armies.contains_key(&army) {
            tracing::error!("set_army_funds cancelled: army {army} does not exist");
            return;
        }
        let funds = funds.max(0);
        if self.armies[&army].funds == funds {
            return;
        }
        self.with_memento(MapOperation::ArmyFunds, |m| {
            if let Some(a) = m.armies.get_mut(&army) {
                a.funds = funds;
            }
        });
    }

    pub fn offset_army_funds(&mut self, army: ArmyId, delta: Funds) {
        match self.army_funds(army) {
            Some(funds) => self.set_army_funds(army, funds.saturating_add(delta)),
            None => {
                tracing::error!("offset_army_funds cancelled: army {army} does not exist");
            }
        }
    }

    pub fn army_country(&self, army: ArmyId) -> Option<CountryId> {
        match self.armies.get(&army) {
            Some(a) => Some(a.country),
            None => {
                tracing::error!("army_country failed: army {army} does not exist");
                None
            }
        }
    }

    /// Assign the army's commanders. At least one must be given; a lone tag
    /// commander is promoted to the main slot with a warning.
    pub fn set_army_commanders(
        &mut self,
        army: ArmyId,
        mut commander: Option<CommanderId>,
        mut tag: Option<CommanderId>,
    ) {
        if !self.armies.contains_key(&army) {
            tracing::error!("set_army_commanders cancelled: army {army} does not exist");
            return;
        }
        if commander.is_none() && tag.is_none() {
            tracing::error!("set_army_commanders cancelled: army {army} was given no commanders");
            return;
        }
        if commander.is_none() && tag.is_some() {
            tracing::warn!(
                "set_army_commanders: army {army} was given only a tag commander, promoting it to the main slot"
            );
            commander = tag.take();
        }
        {
            let current = &self.armies[&army];
            if current.commander == commander && current.tag_commander == tag {
                return;
            }
        }
        self.with_memento(MapOperation::ArmyCommanders, |m| {
            if let Some(a) = m.armies.get_mut(&army) {
                a.commander = commander;
                a.tag_commander = tag;
            }
        });
    }

    /// Swap the main and tag commanders.
    pub fn tag_army_commanders(&mut self, army: ArmyId) {
        let Some(a) = self.armies.get(&army) else {
            tracing::error!("tag_army_commanders cancelled: army {army} does not exist");
            return;
        };
        if a.tag_commander.is_none() {
            tracing::error!(
                "tag_army_commanders cancelled: army {army} has no tag commander to swap in"
            );
            return;
        }
        self.with_memento(MapOperation::TagCommanders, |m| {
            if let Some(a) = m.armies.get_mut(&army) {
                std::mem::swap(&mut a.commander, &mut a.tag_commander);
            }
        });
    }

    pub fn army_commander(&self, army: ArmyId) -> Option<CommanderId> {
        match self.armies.get(&army) {
            Some(a) => a.commander,
            None => {
                tracing::error!("army_commander failed: army {army} does not exist");
                None
            }
        }
    }

    pub fn army_tag_commander(&self, army: ArmyId) -> Option<CommanderId> {
        match self.armies.get(&army) {
            Some(a) => a.tag_commander,
            None => {
                tracing::error!("army_tag_commander failed: army {army} does not exist");
                None
            }
        }
    }

    pub fn has_tag_commander(&self, army: ArmyId) -> bool {
        self.army_tag_commander(army).is_some()
    }

    /// Tiles owned by an army.
    pub fn tiles_of_army(&self, army: ArmyId) -> AHashSet<TileCoord> {
        match self.armies.get(&army) {
            Some(a) => a.tiles.clone(),
            None => {
                tracing::error!("tiles_of_army failed: army {army} does not exist");
                AHashSet::new()
            }
        }
    }

    /// Tiles owned by an army, restricted to the given terrains.
    pub fn tiles_of_army_filtered(
        &self,
        army: ArmyId,
        terrains: &AHashSet<TerrainId>,
    ) -> AHashSet<TileCoord> {
        let tiles = self.tiles_of_army(army);
        if terrains.is_empty() {
            return tiles;
        }
        tiles
            .into_iter()
            .filter(|pos| {
                self.tile(*pos)
                    .is_some_and(|t| terrains.contains(&self.data.tile_type(t.tile_type).terrain))
            })
            .collect()
    }

    /// Units owned by an army.
    pub fn units_of_army(&self, army: ArmyId) -> AHashSet<UnitId> {
        match self.armies.get(&army) {
            Some(a) => a.units.clone(),
            None => {
                tracing::error!("units_of_army failed: army {army} does not exist");
                AHashSet::new()
            }
        }
    }
}
