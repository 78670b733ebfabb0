// Fixed-period simulation loop: drain intents, resolve, advance paths, broadcast.

use crate::domain::pathfinding::find_path;
use crate::domain::ports::Broadcaster;
use crate::domain::state::now_millis;
use crate::domain::{
    AcceptedMove, ActorSnapshot, ChatMessage, EngineState, Intent, IntentKind, SessionId,
    Snapshot, Tile, WorldMap,
};
use crate::use_cases::persistence::MoveOutbox;
use crate::use_cases::queue::{ActionQueue, ActionSender};
use crate::use_cases::registry::{ActorRegistry, Actors};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

const OVERRUN_LOG_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub tick_interval: Duration,
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub resolved: usize,
    pub rejected: usize,
    pub steps: usize,
    pub replanned: usize,
    pub faults: usize,
}

#[derive(Debug)]
pub enum ResolveError {
    UnknownSession(SessionId),
    RequeueClosed(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Applied,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Idle,
    Moved,
    Replanned,
}

/// Sole writer of actor state. Connection code only enqueues intents and
/// adds/removes registry entries.
pub struct TickEngine<B> {
    map: Arc<WorldMap>,
    registry: Arc<ActorRegistry>,
    queue: ActionQueue,
    // Used to re-plan obstructed paths on the next tick.
    requeue: ActionSender,
    broadcaster: B,
    outbox: MoveOutbox,
    state_tx: watch::Sender<EngineState>,
    settings: EngineSettings,
    tick: u64,
}

impl<B: Broadcaster> TickEngine<B> {
    pub fn new(
        map: Arc<WorldMap>,
        registry: Arc<ActorRegistry>,
        queue: ActionQueue,
        requeue: ActionSender,
        broadcaster: B,
        outbox: MoveOutbox,
        settings: EngineSettings,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(EngineState::Stopped);
        Self {
            map,
            registry,
            queue,
            requeue,
            broadcaster,
            outbox,
            state_tx,
            settings,
            tick: 0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn pending_intents(&self) -> usize {
        self.queue.len()
    }

    /// Runs ticks until `shutdown` is notified. The stop signal is checked once per tick.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        self.state_tx.send_replace(EngineState::Running);
        info!(
            tick_interval_ms = self.settings.tick_interval.as_millis() as u64,
            "tick engine running"
        );

        let mut last_overrun_log = Instant::now() - OVERRUN_LOG_THROTTLE;
        loop {
            let started = Instant::now();
            let report = self.tick().await;
            let elapsed = started.elapsed();

            if report.faults > 0 || report.replanned > 0 {
                debug!(?report, "tick finished with faults or re-plans");
            }

            let wait = self.settings.tick_interval.saturating_sub(elapsed);
            if wait.is_zero() && last_overrun_log.elapsed() >= OVERRUN_LOG_THROTTLE {
                last_overrun_log = Instant::now();
                warn!(
                    tick = report.tick,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tick overran its budget"
                );
            }

            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.state_tx.send_replace(EngineState::Stopped);
        info!(tick = self.tick, "tick engine stopped");
    }

    /// Executes one full tick and broadcasts the resulting snapshot.
    pub async fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        let intents = self.queue.drain_all();
        let registry = Arc::clone(&self.registry);
        let snapshot = {
            let mut actors = registry.lock_for_tick().await;

            for intent in intents {
                match self.resolve_intent(&mut actors, intent) {
                    Ok(Resolution::Applied) => report.resolved += 1,
                    Ok(Resolution::Rejected) => report.rejected += 1,
                    Err(error) => {
                        report.faults += 1;
                        log_fault(&error);
                    }
                }
            }

            self.advance_paths(&mut actors, &mut report);
            self.update_world(&mut actors);

            Snapshot {
                tick: self.tick,
                timestamp_ms: now_millis(),
                map: Arc::clone(&self.map),
                actors: actors.iter().map(ActorSnapshot::from).collect(),
            }
        };

        self.broadcaster.push_snapshot(snapshot);
        report
    }

    fn resolve_intent(
        &self,
        actors: &mut Actors,
        intent: Intent,
    ) -> Result<Resolution, ResolveError> {
        let session_id = intent.session_id;
        let Some(actor) = actors.get(&session_id) else {
            return Err(ResolveError::UnknownSession(session_id));
        };

        match intent.kind {
            IntentKind::Move { direction } => {
                let (dx, dy) = direction.offset();
                let target = Tile::new(actor.position.x + dx, actor.position.y + dy);
                if self.map.is_solid_at(target) || occupied_by_other(actors, session_id, target) {
                    debug!(session_id, ?direction, x = target.x, y = target.y, "move rejected");
                    return Ok(Resolution::Rejected);
                }
                self.commit_position(actors, session_id, target);
                Ok(Resolution::Applied)
            }
            IntentKind::Message { text } => {
                self.broadcaster.push_message(ChatMessage {
                    timestamp_ms: now_millis(),
                    sender_name: actor.name.clone(),
                    text,
                });
                Ok(Resolution::Applied)
            }
            IntentKind::Pathfind { dest } => {
                let steps = find_path(&self.map, actor.tile(), dest);
                let found = !steps.is_empty();
                if let Some(actor) = actors.get_mut(&session_id) {
                    actor.path.clear();
                    actor.path.extend(steps);
                    actor.walking = found;
                }
                if found {
                    Ok(Resolution::Applied)
                } else {
                    debug!(session_id, x = dest.x, y = dest.y, "no path to destination");
                    Ok(Resolution::Rejected)
                }
            }
            // Extension points: accepted, nothing to resolve yet.
            IntentKind::Attack | IntentKind::UseItem => Ok(Resolution::Applied),
        }
    }

    fn advance_paths(&self, actors: &mut Actors, report: &mut TickReport) {
        let walking: Vec<SessionId> = actors
            .iter()
            .filter(|(_, actor)| actor.walking && !actor.path.is_empty())
            .map(|(session_id, _)| *session_id)
            .collect();

        for session_id in walking {
            match self.advance_actor(actors, session_id) {
                Ok(Advance::Moved) => report.steps += 1,
                Ok(Advance::Replanned) => report.replanned += 1,
                Ok(Advance::Idle) => {}
                Err(error) => {
                    report.faults += 1;
                    log_fault(&error);
                }
            }
        }
    }

    fn advance_actor(
        &self,
        actors: &mut Actors,
        session_id: SessionId,
    ) -> Result<Advance, ResolveError> {
        let Some(next) = actors
            .get(&session_id)
            .and_then(|actor| actor.path.front().copied())
        else {
            return Ok(Advance::Idle);
        };

        // Re-validate at execution time; the path was planned ignoring other actors.
        let blocked = self.map.is_solid_at(next) || occupied_by_other(actors, session_id, next);
        if !blocked {
            self.commit_position(actors, session_id, next);
            if let Some(actor) = actors.get_mut(&session_id) {
                actor.path.pop_front();
                if actor.path.is_empty() {
                    actor.walking = false;
                }
            }
            return Ok(Advance::Moved);
        }

        let Some(actor) = actors.get_mut(&session_id) else {
            return Ok(Advance::Idle);
        };
        let dest = actor.path.back().copied().unwrap_or(next);
        actor.path.clear();
        actor.walking = false;
        debug!(session_id, x = next.x, y = next.y, "path step blocked; re-planning next tick");

        self.requeue
            .enqueue(Intent::new(session_id, IntentKind::Pathfind { dest }))
            .map_err(|_| ResolveError::RequeueClosed(session_id))?;
        Ok(Advance::Replanned)
    }

    // Hook for non-player entities.
    fn update_world(&self, _actors: &mut Actors) {}

    fn commit_position(&self, actors: &mut Actors, session_id: SessionId, tile: Tile) {
        let Some(actor) = actors.get_mut(&session_id) else {
            return;
        };
        actor.position.x = tile.x;
        actor.position.y = tile.y;
        self.outbox.publish(AcceptedMove {
            character_id: actor.character_id,
            x: tile.x,
            y: tile.y,
        });
    }
}

fn occupied_by_other(actors: &Actors, session_id: SessionId, tile: Tile) -> bool {
    actors
        .iter()
        .any(|(other, actor)| *other != session_id && actor.tile() == tile)
}

fn log_fault(error: &ResolveError) {
    match error {
        // Expected when a client leaves with intents still queued.
        ResolveError::UnknownSession(session_id) => {
            debug!(session_id, "intent for unknown session dropped")
        }
        ResolveError::RequeueClosed(session_id) => {
            warn!(session_id, "action queue closed; path re-plan lost")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::world_map::{GRASS, WALL};
    use crate::domain::{Actor, CharacterRecord, Direction, Position};
    use crate::use_cases::queue::action_queue;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingBroadcaster {
        snapshots: Mutex<Vec<Snapshot>>,
        messages: Mutex<Vec<ChatMessage>>,
    }

    impl Broadcaster for RecordingBroadcaster {
        fn push_snapshot(&self, snapshot: Snapshot) {
            self.snapshots.lock().expect("snapshots mutex poisoned").push(snapshot);
        }

        fn push_message(&self, message: ChatMessage) {
            self.messages.lock().expect("messages mutex poisoned").push(message);
        }
    }

    struct Harness {
        engine: TickEngine<Arc<RecordingBroadcaster>>,
        sender: ActionSender,
        registry: Arc<ActorRegistry>,
        broadcaster: Arc<RecordingBroadcaster>,
        moves: mpsc::UnboundedReceiver<AcceptedMove>,
    }

    impl Harness {
        fn new(map: WorldMap) -> Self {
            let (sender, queue) = action_queue();
            let registry = Arc::new(ActorRegistry::new());
            let broadcaster = Arc::new(RecordingBroadcaster::default());
            let (outbox, moves) = MoveOutbox::channel();
            let engine = TickEngine::new(
                Arc::new(map),
                registry.clone(),
                queue,
                sender.clone(),
                broadcaster.clone(),
                outbox,
                EngineSettings {
                    tick_interval: Duration::from_millis(5),
                },
            );
            Self {
                engine,
                sender,
                registry,
                broadcaster,
                moves,
            }
        }

        async fn spawn(&self, session_id: SessionId, name: &str, x: i32, y: i32) {
            let record = CharacterRecord {
                id: Uuid::new_v4(),
                name: name.to_string(),
                race_id: None,
                class_id: None,
                gender_id: None,
                level: 1,
                health: 100,
                color: "blue".to_string(),
                bg: "white".to_string(),
                position: Position { x, y, z: 0 },
            };
            assert!(
                self.registry
                    .add(session_id, Actor::spawn(record, Tile::new(x, y)))
                    .await
            );
        }

        fn send(&self, session_id: SessionId, kind: IntentKind) {
            self.sender
                .enqueue(Intent::new(session_id, kind))
                .expect("queue open");
        }

        async fn actor(&self, session_id: SessionId) -> Actor {
            self.registry.get(session_id).await.expect("actor should exist")
        }

        fn drain_moves(&mut self) -> Vec<AcceptedMove> {
            let mut out = Vec::new();
            while let Ok(event) = self.moves.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn map(width: usize, height: usize, solid: &[(usize, usize)]) -> WorldMap {
        let mut rows = vec![vec![GRASS; width]; height];
        for &(x, y) in solid {
            rows[y][x] = WALL;
        }
        WorldMap::from_rows(rows).expect("valid map")
    }

    fn right() -> IntentKind {
        IntentKind::Move {
            direction: Direction::Right,
        }
    }

    #[tokio::test]
    async fn moves_into_solid_tiles_are_rejected() {
        let mut h = Harness::new(map(5, 5, &[(2, 2)]));
        h.spawn(1, "Aria", 0, 2).await;

        h.send(1, right());
        h.send(1, right());
        let report = h.engine.tick().await;
        assert_eq!(h.actor(1).await.tile(), Tile::new(1, 2));
        assert_eq!(report.resolved, 1);
        assert_eq!(report.rejected, 1);

        h.send(1, right());
        h.engine.tick().await;
        assert_eq!(h.actor(1).await.tile(), Tile::new(1, 2));

        let moves = h.drain_moves();
        assert_eq!(moves.len(), 1);
        assert_eq!((moves[0].x, moves[0].y), (1, 2));
    }

    #[tokio::test]
    async fn moves_onto_another_actor_are_rejected() {
        let mut h = Harness::new(map(3, 1, &[]));
        h.spawn(1, "A", 0, 0).await;
        h.spawn(2, "B", 1, 0).await;

        h.send(1, right());
        let report = h.engine.tick().await;

        assert_eq!(report.rejected, 1);
        assert_eq!(h.actor(1).await.tile(), Tile::new(0, 0));
        assert!(h.drain_moves().is_empty());
    }

    #[tokio::test]
    async fn pathfind_walks_one_step_per_tick_around_the_wall() {
        let mut h = Harness::new(map(5, 5, &[(2, 2)]));
        h.spawn(1, "Aria", 0, 0).await;

        h.send(
            1,
            IntentKind::Pathfind {
                dest: Tile::new(4, 4),
            },
        );
        let report = h.engine.tick().await;
        assert_eq!(report.steps, 1);
        let actor = h.actor(1).await;
        assert!(actor.walking);
        assert_eq!(actor.path.len(), 7);

        for _ in 0..7 {
            h.engine.tick().await;
            assert_ne!(h.actor(1).await.tile(), Tile::new(2, 2));
        }

        let actor = h.actor(1).await;
        assert_eq!(actor.tile(), Tile::new(4, 4));
        assert!(!actor.walking);
        assert!(actor.path.is_empty());
        assert_eq!(h.drain_moves().len(), 8);
    }

    #[tokio::test]
    async fn pathfind_to_a_solid_tile_clears_the_current_path() {
        let mut h = Harness::new(map(5, 5, &[(2, 2)]));
        h.spawn(1, "Aria", 0, 0).await;

        h.send(
            1,
            IntentKind::Pathfind {
                dest: Tile::new(4, 0),
            },
        );
        h.engine.tick().await;
        assert!(h.actor(1).await.walking);

        h.send(
            1,
            IntentKind::Pathfind {
                dest: Tile::new(2, 2),
            },
        );
        let report = h.engine.tick().await;

        let actor = h.actor(1).await;
        assert_eq!(report.rejected, 1);
        assert!(!actor.walking);
        assert!(actor.path.is_empty());
        assert_eq!(actor.tile(), Tile::new(1, 0));
    }

    #[tokio::test]
    async fn contested_tile_goes_to_the_first_actor_and_the_second_replans() {
        let mut h = Harness::new(map(5, 1, &[]));
        h.spawn(1, "A", 0, 0).await;
        h.spawn(2, "B", 4, 0).await;
        let goal = Tile::new(2, 0);

        h.send(1, IntentKind::Pathfind { dest: goal });
        h.send(2, IntentKind::Pathfind { dest: goal });
        h.engine.tick().await;
        assert_eq!(h.actor(1).await.tile(), Tile::new(1, 0));
        assert_eq!(h.actor(2).await.tile(), Tile::new(3, 0));

        let report = h.engine.tick().await;
        assert_eq!(report.steps, 1);
        assert_eq!(report.replanned, 1);

        let first = h.actor(1).await;
        let second = h.actor(2).await;
        assert_eq!(first.tile(), goal);
        assert_eq!(second.tile(), Tile::new(3, 0));
        assert!(!second.walking);
        assert!(second.path.is_empty());
        // The fresh Pathfind waits for the next tick.
        assert_eq!(h.engine.pending_intents(), 1);

        let report = h.engine.tick().await;
        assert_eq!(report.resolved, 1);
        assert_ne!(h.actor(2).await.tile(), goal);
    }

    #[tokio::test]
    async fn chat_is_pushed_immediately_with_the_sender_name() {
        let mut h = Harness::new(map(3, 3, &[]));
        h.spawn(1, "Aria", 1, 1).await;

        h.send(
            1,
            IntentKind::Message {
                text: "hello".to_string(),
            },
        );
        h.engine.tick().await;

        let messages = h.broadcaster.messages.lock().expect("lock");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_name, "Aria");
        assert_eq!(messages[0].text, "hello");
        assert_eq!(h.actor(1).await.tile(), Tile::new(1, 1));
    }

    #[tokio::test]
    async fn a_bad_intent_does_not_stop_the_rest_of_the_tick() {
        let mut h = Harness::new(map(3, 1, &[]));
        h.spawn(1, "A", 0, 0).await;

        h.send(99, right());
        h.send(1, IntentKind::Attack);
        h.send(1, IntentKind::UseItem);
        h.send(1, right());
        let report = h.engine.tick().await;

        assert_eq!(report.faults, 1);
        assert_eq!(report.resolved, 3);
        assert_eq!(h.actor(1).await.tile(), Tile::new(1, 0));
    }

    #[tokio::test]
    async fn every_tick_broadcasts_a_snapshot_with_all_actors() {
        let mut h = Harness::new(map(3, 3, &[]));
        h.spawn(1, "A", 0, 0).await;
        h.spawn(2, "B", 2, 2).await;

        h.engine.tick().await;
        h.engine.tick().await;

        let snapshots = h.broadcaster.snapshots.lock().expect("lock");
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].tick, 2);
        assert_eq!(snapshots[1].actors.len(), 2);
        assert_eq!(snapshots[1].actors[1].name, "B");
        assert_eq!(snapshots[1].map.width(), 3);
    }

    // Deterministic xorshift so failures reproduce.
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn below(&mut self, n: u64) -> u64 {
            self.next() % n
        }
    }

    #[tokio::test]
    async fn random_worlds_keep_actors_on_open_distinct_tiles() {
        for seed in 1..=20u64 {
            let mut rng = Rng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let mut rows = vec![vec![GRASS; 8]; 8];
            for row in rows.iter_mut() {
                for tile in row.iter_mut() {
                    if rng.below(4) == 0 {
                        *tile = WALL;
                    }
                }
            }
            let world = WorldMap::from_rows(rows).expect("valid map");
            let mut h = Harness::new(world.clone());

            for session_id in 1..=4u64 {
                let record = CharacterRecord {
                    id: Uuid::new_v4(),
                    name: format!("P{session_id}"),
                    race_id: None,
                    class_id: None,
                    gender_id: None,
                    level: 1,
                    health: 100,
                    color: String::new(),
                    bg: String::new(),
                    position: Position {
                        x: rng.below(8) as i32,
                        y: rng.below(8) as i32,
                        z: 0,
                    },
                };
                let _ = h.registry.add_spawned(session_id, record, &world, 8).await;
            }

            for _ in 0..60 {
                for _ in 0..3 {
                    let session_id = 1 + rng.below(4);
                    let kind = match rng.below(3) {
                        0 => IntentKind::Pathfind {
                            dest: Tile::new(rng.below(8) as i32, rng.below(8) as i32),
                        },
                        _ => IntentKind::Move {
                            direction: [Direction::Up, Direction::Down, Direction::Left, Direction::Right]
                                [rng.below(4) as usize],
                        },
                    };
                    h.send(session_id, kind);
                }
                h.engine.tick().await;

                let actors = h.registry.all_actors().await;
                for (i, (_, a)) in actors.iter().enumerate() {
                    assert!(!world.is_solid_at(a.tile()), "seed {seed}: actor on solid tile");
                    for (_, b) in actors.iter().skip(i + 1) {
                        assert_ne!(a.tile(), b.tile(), "seed {seed}: actors overlap");
                    }
                }
            }
            h.drain_moves();
        }
    }

    #[tokio::test]
    async fn run_reports_running_then_stopped_on_shutdown() {
        let h = Harness::new(map(3, 3, &[]));
        let broadcaster = h.broadcaster.clone();
        let mut state_rx = h.engine.subscribe_state();
        assert_eq!(*state_rx.borrow(), EngineState::Stopped);

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(h.engine.run(shutdown.clone()));

        tokio::time::timeout(
            Duration::from_secs(2),
            state_rx.wait_for(|s| *s == EngineState::Running),
        )
        .await
        .expect("engine should start")
        .expect("state channel open");

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("engine should stop")
            .expect("engine task");

        assert_eq!(*state_rx.borrow(), EngineState::Stopped);
        assert!(!broadcaster.snapshots.lock().expect("lock").is_empty());
    }
}
