//! Pure tile-set geometry over the rectangular grid.
//!
//! Every function here is stateless: it takes the grid dimensions and
//! coordinates and produces a set of in-bounds tiles. Bounds diagnostics for
//! caller mistakes live on the map facade, not here.

use ahash::AHashSet;

use crate::core::types::{GridSize, TileCoord};

/// One of the four orthogonal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit step for this direction. Up decreases `y`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// The four orthogonal neighbours of a tile that fall inside the grid.
pub fn neighbours(size: GridSize, tile: TileCoord) -> Vec<TileCoord> {
    [(0, -1), (0, 1), (-1, 0), (1, 0)]
        .into_iter()
        .filter_map(|(dx, dy)| tile.offset(dx, dy))
        .filter(|t| size.contains(*t))
        .collect()
}

/// Diamond annulus: every in-bounds tile whose Manhattan distance from
/// `center` lies in `start..=end`.
///
/// `start` is clamped to at least 1, so the centre tile is never included.
pub fn tiles_in_range(size: GridSize, center: TileCoord, start: u32, end: u32) -> AHashSet<TileCoord> {
    let mut tiles = AHashSet::new();
    if !size.contains(center) {
        return tiles;
    }
    let start = start.max(1);
    if start > end {
        return tiles;
    }
    let min_x = center.x.saturating_sub(end);
    let max_x = center.x.saturating_add(end).min(size.width - 1);
    let min_y = center.y.saturating_sub(end);
    let max_y = center.y.saturating_add(end).min(size.height - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let tile = TileCoord::new(x, y);
            let d = tile.distance(&center);
            if d >= start && d <= end {
                tiles.insert(tile);
            }
        }
    }
    tiles
}

/// Cone expanding from `from` in `dir`: the strip at distance `d` spans the
/// perpendicular range `-d..=d`. Stops early once an entire strip falls
/// outside the grid.
pub fn tiles_in_cone(
    size: GridSize,
    from: TileCoord,
    dir: Direction,
    start: u32,
    end: u32,
) -> AHashSet<TileCoord> {
    let mut tiles = AHashSet::new();
    if !size.contains(from) || start > end {
        return tiles;
    }
    let (dx, dy) = dir.delta();
    // Perpendicular axis of the strip.
    let (px, py) = (dy.abs(), dx.abs());
    for d in start..=end {
        let mut added = false;
        let reach = d as i32;
        for off in -reach..=reach {
            let tile = from
                .offset(dx * reach + px * off, dy * reach + py * off)
                .filter(|t| size.contains(*t));
            if let Some(tile) = tile {
                tiles.insert(tile);
                added = true;
            }
        }
        if !added {
            break;
        }
    }
    tiles
}

/// The full row and column through `tile`.
pub fn tiles_in_crosshair(size: GridSize, tile: TileCoord) -> AHashSet<TileCoord> {
    let mut tiles = AHashSet::new();
    if !size.contains(tile) {
        return tiles;
    }
    for x in 0..size.width {
        tiles.insert(TileCoord::new(x, tile.y));
    }
    for y in 0..size.height {
        tiles.insert(TileCoord::new(tile.x, y));
    }
    tiles
}

/// Straight line from `from` in `dir`, including the starting tile.
///
/// A distance of 0 extends the line to the grid edge; a longer distance is
/// truncated (with a warning) at the boundary.
pub fn tiles_in_line(
    size: GridSize,
    from: TileCoord,
    dir: Direction,
    distance: u32,
) -> AHashSet<TileCoord> {
    let mut tiles = AHashSet::new();
    if !size.contains(from) {
        return tiles;
    }
    let distance = if distance == 0 {
        match dir {
            Direction::Up => from.y,
            Direction::Down => size.height - from.y - 1,
            Direction::Left => from.x,
            Direction::Right => size.width - from.x - 1,
        }
    } else {
        distance
    };
    let (dx, dy) = dir.delta();
    tiles.insert(from);
    let mut cursor = from;
    for _ in 0..distance {
        match cursor.offset(dx, dy).filter(|t| size.contains(*t)) {
            Some(next) => {
                tiles.insert(next);
                cursor = next;
            }
            None => {
                tracing::warn!(
                    "line from {from} would leave the {size} grid after {distance} tiles, truncating"
                );
                break;
            }
        }
    }
    tiles
}

/// Every tile in the rectangle spanned by two corners, both clamped into
/// bounds first.
pub fn tiles_in_area(size: GridSize, a: TileCoord, b: TileCoord) -> AHashSet<TileCoord> {
    let mut tiles = AHashSet::new();
    if size.is_empty() {
        return tiles;
    }
    let ax = a.x.min(size.width - 1);
    let ay = a.y.min(size.height - 1);
    let bx = b.x.min(size.width - 1);
    let by = b.y.min(size.height - 1);
    for x in ax.min(bx)..=ax.max(bx) {
        for y in ay.min(by)..=ay.max(by) {
            tiles.insert(TileCoord::new(x, y));
        }
    }
    tiles
}
