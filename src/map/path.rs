//! Constrained shortest-path search and path obstruction scanning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};

use crate::catalog::MovementTypeId;
use crate::core::types::{ArmyId, Fuel, TeamId, TileCoord, UnitId};
use crate::grid;
use crate::map::Map;

/// One step of a computed path: the tile and the cumulative movement cost
/// spent reaching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNode {
    pub tile: TileCoord,
    pub g: i32,
}

/// Open-set entry. The heap pops the lowest estimated total cost first;
/// ties are broken by the lowest `(y, x)` coordinate so equal-cost searches
/// are deterministic.
#[derive(Debug, PartialEq, Eq)]
struct OpenNode {
    f: i32,
    tile: TileCoord,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| (other.tile.y, other.tile.x).cmp(&(self.tile.y, self.tile.x)))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Map {
    /// A* over the grid with the Manhattan-distance heuristic. The edge
    /// weight into a tile is its terrain's cost for `movement`; impassable
    /// terrain is never expanded.
    ///
    /// Each constraint is enforced only when given: cumulative cost must
    /// stay within `fuel` (unless `infinite_fuel`) and `move_points`, and an
    /// occupied tile blocks the path unless its occupant is explicitly
    /// ignored, invisible to `army`, on the given `team`, or occupancy
    /// checks are bypassed altogether. With no `army` given, occupancy never
    /// blocks: there is nobody the blocker could be visible to.
    ///
    /// Returns the tiles from origin to destination with cumulative costs,
    /// or an empty path when unreachable or the inputs are invalid (logged).
    #[allow(clippy::too_many_arguments)]
    pub fn find_path(
        &self,
        origin: TileCoord,
        dest: TileCoord,
        movement: MovementTypeId,
        move_points: Option<u32>,
        fuel: Option<Fuel>,
        team: Option<TeamId>,
        army: Option<ArmyId>,
        infinite_fuel: bool,
        ignore_unit_checks: bool,
        ignored_units: &AHashSet<UnitId>,
    ) -> Vec<PathNode> {
        if !self.size.contains(origin) || !self.size.contains(dest) {
            tracing::error!(
                "find_path failed: origin {origin} or destination {dest} is out of bounds ({})",
                self.size
            );
            return Vec::new();
        }
        if let Some(a) = army {
            if !self.armies.contains_key(&a) {
                tracing::error!("find_path failed: army {a} does not exist");
                return Vec::new();
            }
        }

        let mut open = BinaryHeap::new();
        let mut closed: AHashSet<TileCoord> = AHashSet::new();
        let mut came_from: AHashMap<TileCoord, TileCoord> = AHashMap::new();
        let mut g_score: AHashMap<TileCoord, i32> = AHashMap::new();
        g_score.insert(origin, 0);
        open.push(OpenNode {
            f: origin.distance(&dest) as i32,
            tile: origin,
        });

        while let Some(current) = open.pop() {
            if current.tile == dest {
                let mut path = vec![PathNode {
                    tile: dest,
                    g: g_score[&dest],
                }];
                let mut cursor = dest;
                while let Some(&previous) = came_from.get(&cursor) {
                    path.push(PathNode {
                        tile: previous,
                        g: g_score[&previous],
                    });
                    cursor = previous;
                }
                path.reverse();
                return path;
            }
            if !closed.insert(current.tile) {
                continue;
            }

            for adjacent in grid::neighbours(self.size, current.tile) {
                let terrain = self
                    .tile(adjacent)
                    .map(|t| self.data.terrain_of(t.tile_type));
                let Some(cost) = terrain.and_then(|t| t.move_cost(movement)) else {
                    continue;
                };
                let tentative = g_score[&current.tile] + cost;

                let fuel_ok =
                    infinite_fuel || fuel.map_or(true, |available| tentative <= available);
                let points_ok =
                    move_points.map_or(true, |available| tentative <= available as i32);
                let occupancy_ok = ignore_unit_checks
                    || match self.unit_on_tile(adjacent) {
                        None => true,
                        Some(standing) => {
                            ignored_units.contains(&standing)
                                || army.is_none_or(|a| !self.is_unit_visible(standing, a))
                                || (team.is_some() && self.team_of_unit(standing) == team)
                        }
                    };
                if !(fuel_ok && points_ok && occupancy_ok) {
                    continue;
                }
                if tentative < g_score.get(&adjacent).copied().unwrap_or(i32::MAX) {
                    came_from.insert(adjacent, current.tile);
                    g_score.insert(adjacent, tentative);
                    open.push(OpenNode {
                        f: tentative + adjacent.distance(&dest) as i32,
                        tile: adjacent,
                    });
                }
            }
        }

        Vec::new()
    }

    /// Scan a previously computed path for the first tile occupied by a unit
    /// the moving unit's army cannot see, skipping `ignores` such
    /// obstructions first. Used to interrupt a queued move mid-animation.
    pub fn scan_path(&self, path: &[PathNode], unit: UnitId, mut ignores: usize) -> Option<usize> {
        let Some(army) = self.units.get(&unit).map(|u| u.army) else {
            tracing::error!("scan_path failed: unit {unit} does not exist");
            return None;
        };
        for (index, node) in path.iter().enumerate() {
            let Some(standing) = self.unit_on_tile(node.tile) else {
                continue;
            };
            if self.is_unit_visible(standing, army) {
                continue;
            }
            if ignores == 0 {
                return Some(index);
            }
            ignores -= 1;
        }
        None
    }
}
