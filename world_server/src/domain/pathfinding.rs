// A* search over the tile grid (4-neighbour, unit step cost, Manhattan heuristic).

use crate::domain::world_map::{Tile, WorldMap};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Search node. Identity is the tile; costs and parent are bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct PathNode {
    pub tile: Tile,
    /// Cost from start.
    pub g: i32,
    /// Heuristic to goal.
    pub h: i32,
    /// Index of the predecessor in the search arena.
    pub parent: Option<usize>,
}

impl PathNode {
    pub fn f(&self) -> i32 {
        self.g + self.h
    }
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.tile == other.tile
    }
}

impl Eq for PathNode {}

impl Hash for PathNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile.hash(state);
    }
}

// Up, down, left, right.
const NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Returns the steps from `start` to `goal`, excluding `start`.
///
/// An empty result means the goal is solid, unreachable, or equal to `start`.
/// Occupancy is not considered here; callers re-validate each step when they
/// execute it.
pub fn find_path(map: &WorldMap, start: Tile, goal: Tile) -> Vec<Tile> {
    if map.is_solid_at(goal) {
        return Vec::new();
    }

    let mut arena: Vec<PathNode> = Vec::new();
    let mut index: HashMap<Tile, usize> = HashMap::new();
    let mut closed: HashSet<Tile> = HashSet::new();
    // (f, insertion sequence, arena index); the sequence keeps ties first-in-first-out.
    let mut open: BinaryHeap<Reverse<(i32, u64, usize)>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    arena.push(PathNode {
        tile: start,
        g: 0,
        h: start.manhattan(goal),
        parent: None,
    });
    index.insert(start, 0);
    open.push(Reverse((arena[0].f(), seq, 0)));

    while let Some(Reverse((f, _, current))) = open.pop() {
        let node = arena[current];
        // Skip superseded heap entries.
        if closed.contains(&node.tile) || f != node.f() {
            continue;
        }
        closed.insert(node.tile);

        if node.tile == goal {
            return reconstruct(&arena, current);
        }

        for (dx, dy) in NEIGHBOURS {
            let tile = Tile::new(node.tile.x + dx, node.tile.y + dy);
            if closed.contains(&tile) || map.is_solid_at(tile) {
                continue;
            }

            let g = node.g + 1;
            let slot = match index.get(&tile) {
                Some(&known) if g >= arena[known].g => continue,
                Some(&known) => {
                    arena[known].g = g;
                    arena[known].parent = Some(current);
                    known
                }
                None => {
                    arena.push(PathNode {
                        tile,
                        g,
                        h: tile.manhattan(goal),
                        parent: Some(current),
                    });
                    index.insert(tile, arena.len() - 1);
                    arena.len() - 1
                }
            };

            seq += 1;
            open.push(Reverse((arena[slot].f(), seq, slot)));
        }
    }

    Vec::new()
}

fn reconstruct(arena: &[PathNode], goal: usize) -> Vec<Tile> {
    let mut path = Vec::new();
    let mut cursor = Some(goal);
    while let Some(i) = cursor {
        path.push(arena[i].tile);
        cursor = arena[i].parent;
    }
    path.reverse();
    // Drop the start tile.
    path.remove(0);
    path
}
