// Ring search for the closest free tile around a requested spawn point.

use crate::domain::world_map::{Tile, WorldMap};

/// Returns `start` when it is open, otherwise the first open tile found while
/// walking square rings of radius `1..=max_radius` around it.
///
/// Each ring starts at its top-left corner and walks the top edge rightwards,
/// then the right edge down, the bottom edge left and the left edge up.
/// `occupied` reports tiles already held by an actor.
pub fn find_nearest_open_tile<F>(
    map: &WorldMap,
    start: Tile,
    max_radius: i32,
    occupied: F,
) -> Option<Tile>
where
    F: Fn(Tile) -> bool,
{
    let is_open = |tile: Tile| !map.is_solid_at(tile) && !occupied(tile);

    if is_open(start) {
        return Some(start);
    }

    // Walked in i64: stored positions can sit at the edge of the i32 range.
    for r in 1..=i64::from(max_radius) {
        let (mut x, mut y) = (i64::from(start.x) - r, i64::from(start.y) - r);
        for (dx, dy) in [(1, 0), (0, 1), (-1, 0), (0, -1)] {
            for _ in 0..2 * r {
                x += dx;
                y += dy;
                let (Ok(tx), Ok(ty)) = (i32::try_from(x), i32::try_from(y)) else {
                    continue;
                };
                let tile = Tile::new(tx, ty);
                if is_open(tile) {
                    return Some(tile);
                }
            }
        }
    }

    None
}
