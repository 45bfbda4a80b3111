//! Undo/redo journal over full-state snapshots.
//!
//! The front of the undo deque always holds the current state, so undoing is
//! only possible once at least two snapshots exist. Mutators never talk to
//! the journal directly: they open a named disable/enable scope on the map,
//! and the snapshot is captured exactly once when the outermost scope closes.

use std::collections::VecDeque;

/// How many undo steps are retained before the oldest is evicted.
pub const DEFAULT_MEMENTO_LIMIT: usize = 50;

/// Operation names attached to mementos, one per primitive or compound
/// mutation on the map facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOperation {
    LoadMap,
    MapName,
    MapSize,
    FillTiles,
    FillUnits,
    DeleteUnits,
    ConvertTiles,
    Day,
    FogOfWar,
    CreateArmy,
    DeleteArmy,
    ArmyTeam,
    ArmyFunds,
    ArmyCommanders,
    TagCommanders,
    CreateUnit,
    DeleteUnit,
    UnitPosition,
    UnitHp,
    UnitFuel,
    UnitAmmo,
    UnitReplenish,
    UnitWait,
    UnitCapture,
    UnitHide,
    UnitLoad,
    UnitUnload,
    TileType,
    TileHp,
    TileOwner,
    TileStructure,
    DestroyStructure,
    DeleteStructure,
}

impl MapOperation {
    /// Human-readable name stored alongside the snapshot.
    pub fn name(self) -> &'static str {
        match self {
            MapOperation::LoadMap => "Load Map",
            MapOperation::MapName => "Map Name",
            MapOperation::MapSize => "Map Size",
            MapOperation::FillTiles => "Fill Tiles",
            MapOperation::FillUnits => "Fill Units",
            MapOperation::DeleteUnits => "Delete Units",
            MapOperation::ConvertTiles => "Convert Tiles",
            MapOperation::Day => "Day",
            MapOperation::FogOfWar => "Fog of War",
            MapOperation::CreateArmy => "Create Army",
            MapOperation::DeleteArmy => "Delete Army",
            MapOperation::ArmyTeam => "Army Team",
            MapOperation::ArmyFunds => "Army Funds",
            MapOperation::ArmyCommanders => "Army Commanders",
            MapOperation::TagCommanders => "Tag Commanders",
            MapOperation::CreateUnit => "Create Unit",
            MapOperation::DeleteUnit => "Delete Unit",
            MapOperation::UnitPosition => "Unit Position",
            MapOperation::UnitHp => "Unit HP",
            MapOperation::UnitFuel => "Unit Fuel",
            MapOperation::UnitAmmo => "Unit Ammo",
            MapOperation::UnitReplenish => "Replenish Unit",
            MapOperation::UnitWait => "Unit Waiting",
            MapOperation::UnitCapture => "Unit Capturing",
            MapOperation::UnitHide => "Unit Hiding",
            MapOperation::UnitLoad => "Load Unit",
            MapOperation::UnitUnload => "Unload Unit",
            MapOperation::TileType => "Tile Type",
            MapOperation::TileHp => "Tile HP",
            MapOperation::TileOwner => "Tile Owner",
            MapOperation::TileStructure => "Tile Structure",
            MapOperation::DestroyStructure => "Destroy Structure",
            MapOperation::DeleteStructure => "Delete Structure",
        }
    }
}

/// An opaque full-state snapshot plus the operation that produced it.
#[derive(Debug, Clone)]
pub struct Memento {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Bounded undo/redo deques plus the nested disable counter.
#[derive(Debug)]
pub struct Journal {
    undo: VecDeque<Memento>,
    redo: VecDeque<Memento>,
    disable_depth: u32,
    hard_disabled: bool,
    limit: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(DEFAULT_MEMENTO_LIMIT)
    }
}

impl Journal {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            disable_depth: 0,
            hard_disabled: false,
            limit: limit.max(2),
        }
    }

    /// Increment the disable counter.
    pub fn disable(&mut self) {
        self.disable_depth += 1;
    }

    /// Decrement the disable counter, returning true when the journal has
    /// just become enabled again (a snapshot should be captured now).
    pub fn enable(&mut self) -> bool {
        if self.disable_depth == 0 {
            tracing::warn!("memento enable without a matching disable, counter stays at zero");
            return false;
        }
        self.disable_depth -= 1;
        self.disable_depth == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.disable_depth == 0
    }

    /// Orthogonal kill switch used while a snapshot is being captured or
    /// replayed, so the round trip can never snapshot recursively.
    pub fn set_hard_disabled(&mut self, disabled: bool) {
        self.hard_disabled = disabled;
    }

    pub fn is_hard_disabled(&self) -> bool {
        self.hard_disabled
    }

    /// Push a fresh snapshot from an organic mutation: the redo history dies
    /// and the oldest undo entry past the cap is evicted.
    pub fn push(&mut self, memento: Memento) {
        self.undo.push_front(memento);
        self.redo.clear();
        while self.undo.len() > self.limit {
            self.undo.pop_back();
        }
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_get(&self, index: usize) -> Option<&Memento> {
        self.undo.get(index)
    }

    pub fn redo_get(&self, index: usize) -> Option<&Memento> {
        self.redo.get(index)
    }

    /// Move `count` snapshots from the undo front onto the redo front.
    pub fn shift_to_redo(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(m) = self.undo.pop_front() {
                self.redo.push_front(m);
            }
        }
    }

    /// Move `count` snapshots from the redo front back onto the undo front.
    pub fn shift_to_undo(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(m) = self.redo.pop_front() {
                self.undo.push_front(m);
            }
        }
    }

    /// Names of every stored memento, most recent redo entry first, then the
    /// undo history. Also reports how many entries precede the current state.
    pub fn names(&self) -> (Vec<String>, usize) {
        let mut names: Vec<String> = self.redo.iter().rev().map(|m| m.name.clone()).collect();
        let current = names.len();
        names.extend(self.undo.iter().map(|m| m.name.clone()));
        (names, current)
    }

    pub fn next_undo_name(&self) -> Option<&str> {
        self.undo.front().map(|m| m.name.as_str())
    }

    pub fn next_redo_name(&self) -> Option<&str> {
        self.redo.front().map(|m| m.name.as_str())
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.disable_depth = 0;
        self.hard_disabled = false;
    }
}
