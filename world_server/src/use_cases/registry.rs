// Registry of live actors keyed by connection session.

use crate::domain::errors::JoinError;
use crate::domain::spawn::find_nearest_open_tile;
use crate::domain::{Actor, CharacterRecord, SessionId, Tile, WorldMap};
use std::collections::BTreeMap;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Actors ordered by session id, which is also the per-tick advance order.
pub type Actors = BTreeMap<SessionId, Actor>;

/// Outcome of placing a character into the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Spawned(Tile),
    // The session already owns an actor; nothing changed.
    AlreadyPresent(Tile),
}

/// Thread-safe actor table.
///
/// Connection code only adds or removes whole entries. Actor contents are
/// mutated through [`ActorRegistry::lock_for_tick`], which only the tick
/// engine uses.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: RwLock<Actors>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `actor` unless the session already exists. Returns whether it was inserted.
    pub async fn add(&self, session_id: SessionId, actor: Actor) -> bool {
        let mut actors = self.actors.write().await;
        if actors.contains_key(&session_id) {
            return false;
        }
        actors.insert(session_id, actor);
        true
    }

    /// Finds a spawn tile near the character's stored position and inserts the
    /// actor there, all under one write lock so concurrent joins cannot pick
    /// the same tile.
    pub async fn add_spawned(
        &self,
        session_id: SessionId,
        record: CharacterRecord,
        map: &WorldMap,
        max_radius: i32,
    ) -> Result<Placement, JoinError> {
        let mut actors = self.actors.write().await;
        if let Some(existing) = actors.get(&session_id) {
            return Ok(Placement::AlreadyPresent(existing.tile()));
        }

        let start = record.position.tile();
        let spawn = find_nearest_open_tile(map, start, max_radius, |tile| {
            actors.values().any(|a| a.tile() == tile)
        })
        .ok_or(JoinError::WorldFull)?;

        actors.insert(session_id, Actor::spawn(record, spawn));
        Ok(Placement::Spawned(spawn))
    }

    /// Removes the session's actor. Idempotent.
    pub async fn remove(&self, session_id: SessionId) -> Option<Actor> {
        self.actors.write().await.remove(&session_id)
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Actor> {
        self.actors.read().await.get(&session_id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, session_id: SessionId) -> bool {
        self.actors.read().await.contains_key(&session_id)
    }

    /// Point-in-time copy of every actor, in session order.
    pub async fn all_actors(&self) -> Vec<(SessionId, Actor)> {
        self.actors
            .read()
            .await
            .iter()
            .map(|(id, actor)| (*id, actor.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.actors.read().await.len()
    }

    pub(crate) async fn lock_for_tick(&self) -> RwLockWriteGuard<'_, Actors> {
        self.actors.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;
    use crate::domain::world_map::{GRASS, WALL};
    use uuid::Uuid;

    fn record(name: &str, x: i32, y: i32) -> CharacterRecord {
        CharacterRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            race_id: None,
            class_id: None,
            gender_id: None,
            level: 1,
            health: 100,
            color: "red".to_string(),
            bg: "black".to_string(),
            position: Position { x, y, z: 0 },
        }
    }

    #[tokio::test]
    async fn add_is_a_no_op_for_an_existing_session() {
        let registry = ActorRegistry::new();

        assert!(registry.add(1, Actor::spawn(record("A", 0, 0), Tile::new(0, 0))).await);
        assert!(!registry.add(1, Actor::spawn(record("B", 1, 1), Tile::new(1, 1))).await);

        assert_eq!(registry.len().await, 1);
        let actor = registry.get(1).await.expect("actor should exist");
        assert_eq!(actor.name, "A");
    }

    #[tokio::test]
    async fn remove_twice_is_idempotent() {
        let registry = ActorRegistry::new();
        registry.add(7, Actor::spawn(record("A", 0, 0), Tile::new(0, 0))).await;

        assert!(registry.remove(7).await.is_some());
        assert!(registry.remove(7).await.is_none());
        assert!(!registry.contains(7).await);
    }

    #[tokio::test]
    async fn all_actors_is_ordered_by_session() {
        let registry = ActorRegistry::new();
        registry.add(9, Actor::spawn(record("C", 2, 0), Tile::new(2, 0))).await;
        registry.add(3, Actor::spawn(record("A", 0, 0), Tile::new(0, 0))).await;
        registry.add(5, Actor::spawn(record("B", 1, 0), Tile::new(1, 0))).await;

        let sessions: Vec<SessionId> = registry.all_actors().await.into_iter().map(|(s, _)| s).collect();
        assert_eq!(sessions, vec![3, 5, 9]);
    }

    #[tokio::test]
    async fn add_spawned_moves_off_an_occupied_tile() {
        let map = WorldMap::from_rows(vec![vec![GRASS; 3]; 3]).expect("valid map");
        let registry = ActorRegistry::new();

        let first = registry
            .add_spawned(1, record("A", 1, 1), &map, 2)
            .await
            .expect("first join should spawn");
        let second = registry
            .add_spawned(2, record("B", 1, 1), &map, 2)
            .await
            .expect("second join should spawn");

        assert_eq!(first, Placement::Spawned(Tile::new(1, 1)));
        assert_eq!(second, Placement::Spawned(Tile::new(1, 0)));
    }

    #[tokio::test]
    async fn add_spawned_reports_world_full_without_inserting() {
        let map = WorldMap::from_rows(vec![vec![WALL; 3]; 3]).expect("valid map");
        let registry = ActorRegistry::new();

        let result = registry.add_spawned(1, record("A", 1, 1), &map, 3).await;

        assert!(matches!(result, Err(JoinError::WorldFull)));
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn add_spawned_keeps_the_existing_entry() {
        let map = WorldMap::from_rows(vec![vec![GRASS; 3]; 3]).expect("valid map");
        let registry = ActorRegistry::new();
        registry.add_spawned(4, record("A", 0, 0), &map, 1).await.expect("spawn");

        let again = registry
            .add_spawned(4, record("A", 2, 2), &map, 1)
            .await
            .expect("rejoin should not fail");

        assert_eq!(again, Placement::AlreadyPresent(Tile::new(0, 0)));
        assert_eq!(registry.len().await, 1);
    }
}
