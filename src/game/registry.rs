//! Room registry: match ownership, session bindings and per-room timers

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, GameStateSnapshot, Role, ServerMsg};

use super::physics::{PhysicsSystem, TickOutcome};
use super::snapshot::SnapshotBuilder;
use super::state::{Direction, Match, Side, LOCAL_ROOM_ID};

/// Delay between a point and the next serve
pub const SERVE_DELAY: Duration = Duration::from_secs(1);

/// Transport state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closed,
}

/// One connected channel bound (or about to be bound) to a room
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub player_id: String,
    pub role: Role,
    pub state: SessionState,
    /// Outbound text frames, drained by the connection's writer task
    tx: mpsc::Sender<String>,
}

impl SessionHandle {
    pub fn new(player_id: String, tx: mpsc::Sender<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            player_id,
            role: Role::Spectator,
            state: SessionState::Connecting,
            tx,
        }
    }

    /// Queue a frame without waiting. Returns false if the channel is full
    /// or closed.
    fn try_send(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(session_id = %self.session_id, "Session not writable, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Result of binding a session to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub role: Role,
    /// Both paddles now have an owner
    pub ready: bool,
}

/// Per-tick delivery report for one room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub delivered: usize,
    pub dropped: usize,
}

/// Mutable room state, guarded by the room mutex
struct RoomEntry {
    game: Match,
    sessions: HashMap<Uuid, SessionHandle>,
    created_at: Instant,
    ever_joined: bool,
    ai_enabled: bool,
    serve_task: Option<JoinHandle<()>>,
    eviction_task: Option<JoinHandle<()>>,
    /// AI loop with the generation that armed it
    ai_task: Option<(u64, JoinHandle<()>)>,
}

impl RoomEntry {
    fn new(id: &str) -> Self {
        Self {
            game: Match::new(id),
            sessions: HashMap::new(),
            created_at: Instant::now(),
            ever_joined: false,
            ai_enabled: false,
            serve_task: None,
            eviction_task: None,
            ai_task: None,
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
        if let Some(task) = self.eviction_task.take() {
            task.abort();
        }
        if let Some((_, task)) = self.ai_task.take() {
            task.abort();
        }
        self.ai_enabled = false;
    }

    fn seat_taken(&self, role: Role) -> bool {
        self.sessions.values().any(|s| s.role == role)
    }

    fn is_ready(&self) -> bool {
        self.seat_taken(Role::Left) && (self.seat_taken(Role::Right) || self.ai_enabled)
    }

    /// Send to every joined session, skipping any that cannot take the frame
    fn send_all(&self, text: &str) -> (usize, usize) {
        let mut delivered = 0;
        let mut dropped = 0;
        for session in self.sessions.values() {
            if session.state != SessionState::Joined {
                continue;
            }
            if session.try_send(text.to_owned()) {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }
        (delivered, dropped)
    }

    fn notify(&self, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(text) => {
                self.send_all(&text);
            }
            Err(e) => warn!(error = %e, "Failed to serialize room notification"),
        }
    }
}

impl Drop for RoomEntry {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// A room: one match plus the sessions watching it
pub struct Room {
    id: String,
    entry: Mutex<RoomEntry>,
}

impl Room {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            entry: Mutex::new(RoomEntry::new(id)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run a closure against the match under the room lock
    pub fn with_match<R>(&self, f: impl FnOnce(&mut Match) -> R) -> R {
        f(&mut self.entry.lock().game)
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        SnapshotBuilder::build(&self.entry.lock().game)
    }

    pub fn session_count(&self) -> usize {
        self.entry.lock().sessions.len()
    }

    pub fn is_ai_enabled(&self) -> bool {
        self.entry.lock().ai_enabled
    }

    /// Both paddles have an owner
    pub fn is_full(&self) -> bool {
        self.entry.lock().is_ready()
    }

    pub fn has_pending_eviction(&self) -> bool {
        self.entry.lock().eviction_task.is_some()
    }

    /// Time since this room's match state was first created
    pub fn age(&self) -> Duration {
        self.entry.lock().created_at.elapsed()
    }

    pub fn move_paddle(&self, side: Side, direction: Direction) {
        PhysicsSystem::move_paddle(&mut self.entry.lock().game, side, direction);
    }

    /// Apply a client input command on behalf of a session. Returns whether a
    /// paddle moved.
    pub fn apply_input(&self, session_id: Uuid, msg: &ClientMsg) -> bool {
        let mut entry = self.entry.lock();
        let Some(role) = entry.sessions.get(&session_id).map(|s| s.role) else {
            return false;
        };

        let (requested, direction) = match msg {
            ClientMsg::MoveUp { side } => (*side, Direction::Up),
            ClientMsg::MoveDown { side } => (*side, Direction::Down),
        };

        let side = match role {
            Role::Local => requested,
            Role::Left | Role::Right => role.side(),
            Role::Spectator => None,
        };
        // The AI owns the right paddle while it is armed
        let side = side.filter(|side| !(entry.ai_enabled && *side == Side::Right));

        let Some(side) = side else {
            return false;
        };
        if entry.game.is_frozen() {
            return false;
        }

        PhysicsSystem::move_paddle(&mut entry.game, side, direction);
        true
    }

    /// Advance one tick and fan the snapshot out to joined sessions
    pub fn tick(self: &Arc<Self>) -> TickReport {
        let mut entry = self.entry.lock();
        let outcome = PhysicsSystem::advance(&mut entry.game);

        if let TickOutcome::Scored {
            scorer,
            serve_pending,
        } = outcome
        {
            info!(
                room_id = %self.id,
                scorer = ?scorer,
                left = entry.game.score.left,
                right = entry.game.score.right,
                "Point scored"
            );
            if serve_pending {
                self.schedule_serve(&mut entry, SERVE_DELAY);
            } else {
                info!(room_id = %self.id, "Match ended");
            }
        }

        let (delivered, dropped) = match SnapshotBuilder::encode(&entry.game) {
            Ok(text) => entry.send_all(&text),
            Err(e) => {
                warn!(room_id = %self.id, error = %e, "Failed to encode snapshot");
                (0, 0)
            }
        };

        TickReport {
            outcome,
            delivered,
            dropped,
        }
    }

    /// Clear the pause flag, serving a docked ball if nothing else will
    pub fn resume(self: &Arc<Self>) {
        let mut entry = self.entry.lock();
        entry.game.paused = false;
        self.serve_if_idle(&mut entry);
        entry.notify(&ServerMsg::GamePaused { paused: false });
    }

    /// Flip the pause flag. Returns the new value.
    pub fn toggle_pause(self: &Arc<Self>) -> bool {
        let mut entry = self.entry.lock();
        entry.game.paused = !entry.game.paused;
        let paused = entry.game.paused;
        if !paused {
            self.serve_if_idle(&mut entry);
        }
        entry.notify(&ServerMsg::GamePaused { paused });
        paused
    }

    /// Replace the match with a fresh one; sessions stay bound
    fn reset(&self) {
        let mut entry = self.entry.lock();
        if let Some(task) = entry.serve_task.take() {
            task.abort();
        }
        entry.game = Match::new(self.id.as_str());
        info!(room_id = %self.id, "Match reset");
    }

    fn serve_if_idle(&self, entry: &mut RoomEntry) {
        if entry.serve_task.is_none() && entry.game.ball.is_docked() && !entry.game.terminal {
            PhysicsSystem::serve(&mut entry.game);
        }
    }

    fn schedule_serve(self: &Arc<Self>, entry: &mut RoomEntry, delay: Duration) {
        if let Some(task) = entry.serve_task.take() {
            task.abort();
        }

        let room = Arc::downgrade(self);
        entry.serve_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(room) = room.upgrade() {
                let mut entry = room.entry.lock();
                entry.serve_task = None;
                PhysicsSystem::serve(&mut entry.game);
            }
        }));
    }

    fn bind(&self, mut session: SessionHandle) -> JoinOutcome {
        let mut entry = self.entry.lock();
        entry.ever_joined = true;

        let role = if entry.game.is_local() {
            Role::Local
        } else if !entry.seat_taken(Role::Left) {
            Role::Left
        } else if !entry.seat_taken(Role::Right) && !entry.ai_enabled {
            Role::Right
        } else {
            Role::Spectator
        };

        session.role = role;
        session.state = SessionState::Joined;
        let joined = ServerMsg::RoomJoined {
            room_id: self.id.clone(),
            role,
        };
        if let Ok(text) = serde_json::to_string(&joined) {
            session.try_send(text);
        }

        info!(
            room_id = %self.id,
            session_id = %session.session_id,
            player_id = %session.player_id,
            role = ?role,
            "Session joined room"
        );
        entry.sessions.insert(session.session_id, session);

        let ready = !entry.game.is_local() && entry.is_ready();
        if ready && role != Role::Spectator {
            entry.notify(&ServerMsg::GameReady {
                room_id: self.id.clone(),
            });
        }

        JoinOutcome { role, ready }
    }

    fn unbind(&self, session_id: Uuid) -> Option<SessionHandle> {
        let mut entry = self.entry.lock();
        let mut session = entry.sessions.remove(&session_id)?;
        session.state = SessionState::Closed;

        if !entry.game.is_local() && session.role.side().is_some() {
            entry.notify(&ServerMsg::OpponentDisconnected {
                room_id: self.id.clone(),
            });
        }

        Some(session)
    }

    fn cancel_eviction(&self) -> bool {
        match self.entry.lock().eviction_task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Arm the AI loop spawned by `spawn`, replacing any previous one. The
    /// lock is held while spawning so the loop cannot observe the room before
    /// its handle is stored.
    pub fn attach_ai(&self, generation: u64, spawn: impl FnOnce() -> JoinHandle<()>) {
        let mut entry = self.entry.lock();
        if let Some((_, previous)) = entry.ai_task.take() {
            previous.abort();
        }
        entry.ai_enabled = true;
        entry.ai_task = Some((generation, spawn()));
    }

    /// Called by an AI loop that stopped on its own
    pub fn detach_ai(&self, generation: u64) {
        let mut entry = self.entry.lock();
        if matches!(entry.ai_task, Some((current, _)) if current == generation) {
            entry.ai_task = None;
            entry.ai_enabled = false;
        }
    }

    fn teardown(&self) {
        let mut entry = self.entry.lock();
        entry.abort_tasks();
        // Dropping the senders ends each connection's writer
        entry.sessions.clear();
    }
}

/// Registry of all rooms, including the shared local match
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    local: Arc<Room>,
    /// Public room waiting for its second player
    lobby: Mutex<Option<String>>,
    rooms_created: AtomicU64,
    this: Weak<RoomRegistry>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            rooms: DashMap::new(),
            local: Arc::new(Room::new(LOCAL_ROOM_ID)),
            lobby: Mutex::new(None),
            rooms_created: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Get a room, creating it if absent
    pub fn get(&self, room_id: &str) -> Arc<Room> {
        self.with_room(room_id, Arc::clone)
    }

    /// Get a room only if it exists
    pub fn lookup(&self, room_id: &str) -> Option<Arc<Room>> {
        if room_id == LOCAL_ROOM_ID {
            return Some(self.local.clone());
        }
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    /// Replace a room's match with a fresh one
    pub fn reset(&self, room_id: &str) -> Arc<Room> {
        self.with_room(room_id, |room| {
            room.reset();
            room.clone()
        })
    }

    /// Bind a session to a room, creating the room if needed
    pub fn join(&self, room_id: &str, session: SessionHandle) -> JoinOutcome {
        let outcome = self.with_room(room_id, |room| room.bind(session));
        // A timer that fires before this sees `ever_joined` and skips
        self.cancel_eviction(room_id);
        if outcome.ready {
            self.close_lobby(room_id);
        }
        outcome
    }

    /// Unbind a session. Never evicts the room.
    pub fn leave(&self, room_id: &str, session_id: Uuid) -> Option<SessionHandle> {
        let room = self.lookup(room_id)?;
        let session = room.unbind(session_id)?;
        info!(
            room_id = %room_id,
            session_id = %session_id,
            remaining = room.session_count(),
            "Session left room"
        );
        Some(session)
    }

    /// Arm a one-shot eviction timer. The room is dropped when it fires unless
    /// some session joined in the meantime.
    pub fn schedule_eviction_if_empty(&self, room_id: &str, delay: Duration) {
        if room_id == LOCAL_ROOM_ID {
            return;
        }
        let Some(room) = self.lookup(room_id) else {
            return;
        };

        let mut entry = room.entry.lock();
        if entry.ever_joined || entry.eviction_task.is_some() {
            return;
        }

        let registry = self.this.clone();
        let id = room_id.to_string();
        entry.eviction_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = registry.upgrade() {
                registry.evict_if_unjoined(&id);
            }
        }));
        debug!(room_id = %room_id, delay_ms = delay.as_millis() as u64, "Eviction scheduled");
    }

    /// Disarm a pending eviction timer
    pub fn cancel_eviction(&self, room_id: &str) -> bool {
        let cancelled = self
            .lookup(room_id)
            .map(|room| room.cancel_eviction())
            .unwrap_or(false);
        if cancelled {
            debug!(room_id = %room_id, "Eviction cancelled");
        }
        cancelled
    }

    /// Drop a room on behalf of the owning collaborator. The local match
    /// cannot be removed.
    pub fn remove(&self, room_id: &str) -> bool {
        if room_id == LOCAL_ROOM_ID {
            return false;
        }
        match self.rooms.remove(room_id) {
            Some((_, room)) => {
                room.teardown();
                info!(room_id = %room_id, "Room removed");
                true
            }
            None => false,
        }
    }

    /// Pick a public room for a session that did not ask for one. Pairs
    /// consecutive callers into the same room.
    pub fn open_public_room(&self) -> String {
        let mut lobby = self.lobby.lock();
        if let Some(room_id) = lobby.take() {
            if let Some(room) = self.lookup(&room_id) {
                if !room.is_ai_enabled() && !room.is_full() {
                    return room_id;
                }
            }
        }

        let room_id = self.create_room();
        *lobby = Some(room_id.clone());
        room_id
    }

    /// Create a room under a fresh id, outside matchmaking
    pub fn create_room(&self) -> String {
        let room_id = Uuid::new_v4().to_string();
        self.get(&room_id);
        room_id
    }

    /// Stop offering a room to matchmaking once both seats are taken
    fn close_lobby(&self, room_id: &str) {
        let mut lobby = self.lobby.lock();
        if lobby.as_deref() == Some(room_id) {
            *lobby = None;
            debug!(room_id = %room_id, "Public room filled, lobby closed");
        }
    }

    /// Rooms with at least one bound session
    pub fn active_rooms(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.push(self.local.clone());
        rooms.retain(|room| room.session_count() > 0);
        rooms
    }

    /// Number of rooms, the local match included
    pub fn room_count(&self) -> usize {
        self.rooms.len() + 1
    }

    pub fn session_count(&self) -> usize {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.iter().map(|room| room.session_count()).sum::<usize>() + self.local.session_count()
    }

    pub fn rooms_created(&self) -> u64 {
        self.rooms_created.load(Ordering::Relaxed)
    }

    /// Abort every scheduled task. Match state is left in place.
    pub fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        for room in rooms.iter().chain(std::iter::once(&self.local)) {
            room.entry.lock().abort_tasks();
        }
        info!(rooms = rooms.len() + 1, "Room registry shut down");
    }

    /// Run `f` while holding the map entry for `room_id`, creating the room if
    /// absent. Serializes create/join/reset against eviction for the same id.
    fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&Arc<Room>) -> R) -> R {
        if room_id == LOCAL_ROOM_ID {
            return f(&self.local);
        }

        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                self.rooms_created.fetch_add(1, Ordering::Relaxed);
                info!(room_id = %room_id, "Room created");
                Arc::new(Room::new(room_id))
            });
        f(entry.value())
    }

    fn evict_if_unjoined(&self, room_id: &str) {
        let evicted = self
            .rooms
            .remove_if(room_id, |_, room| !room.entry.lock().ever_joined);

        match evicted {
            Some((_, room)) => {
                // This task is the eviction timer; don't abort it from inside
                room.entry.lock().eviction_task.take();
                room.teardown();
                info!(room_id = %room_id, age_ms = room.age().as_millis() as u64, "Room evicted, no player joined");
            }
            None => {
                if let Some(room) = self.lookup(room_id) {
                    room.entry.lock().eviction_task.take();
                }
                debug!(room_id = %room_id, "Eviction skipped, room has had players");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{BALL_SPEED_X, PADDLE_SPEED};

    fn session(capacity: usize) -> (SessionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SessionHandle::new("player".to_string(), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn get_creates_once_and_lookup_does_not_create() {
        let registry = RoomRegistry::new();
        assert!(registry.lookup("r1").is_none());

        let a = registry.get("r1");
        let b = registry.get("r1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.rooms_created(), 1);
        assert_eq!(registry.room_count(), 2);
    }

    #[tokio::test]
    async fn local_room_is_a_singleton() {
        let registry = RoomRegistry::new();
        let a = registry.get(LOCAL_ROOM_ID);
        let b = registry.reset(LOCAL_ROOM_ID);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.rooms_created(), 0);
        assert!(!registry.remove(LOCAL_ROOM_ID));
    }

    #[tokio::test]
    async fn reset_twice_gives_identical_fresh_state() {
        let registry = RoomRegistry::new();
        let room = registry.get("r1");
        room.with_match(|game| {
            game.score.left = 4;
            game.left.y = 0.0;
            game.paused = true;
            game.ball.dx = BALL_SPEED_X;
        });

        let view = |g: &mut Match| {
            (
                g.left.clone(),
                g.right.clone(),
                g.ball.clone(),
                g.score.clone(),
                g.terminal,
                g.paused,
            )
        };
        let first = registry.reset("r1").with_match(view);
        let second = registry.reset("r1").with_match(view);
        assert_eq!(first, second);
        assert_eq!(first.3.left, 0);
        assert!(!first.5);
    }

    #[tokio::test(start_paused = true)]
    async fn unjoined_room_is_evicted() {
        let registry = RoomRegistry::new();
        registry.get("r1");
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(60_000));
        assert!(registry.get("r1").has_pending_eviction());

        tokio::time::sleep(Duration::from_millis(59_999)).await;
        assert!(registry.lookup("r1").is_some());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(registry.lookup("r1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn join_before_deadline_keeps_room() {
        let registry = RoomRegistry::new();
        registry.get("r1");
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(60_000));

        tokio::time::sleep(Duration::from_millis(59_000)).await;
        let (handle, _rx) = session(8);
        registry.join("r1", handle);
        let room = registry.lookup("r1").unwrap();
        assert!(!room.has_pending_eviction());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(registry.lookup("r1").is_some());

        // Rooms that have had a player are never armed again
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(10));
        assert!(!room.has_pending_eviction());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_rearm_is_idempotent() {
        let registry = RoomRegistry::new();
        registry.get("r1");
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(1_000));
        tokio::time::sleep(Duration::from_millis(500)).await;
        // Second call must not push the deadline back
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(1_000));

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert!(registry.lookup("r1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_eviction_never_fires() {
        let registry = RoomRegistry::new();
        registry.get("r1");
        registry.schedule_eviction_if_empty("r1", Duration::from_millis(1_000));
        assert!(registry.cancel_eviction("r1"));
        assert!(!registry.cancel_eviction("r1"));

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(registry.lookup("r1").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_share_one_match() {
        let registry = RoomRegistry::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let registry = registry.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = session(8);
                barrier.wait().await;
                (registry.join("r2", handle), rx)
            }));
        }

        let mut roles = Vec::new();
        for task in tasks {
            let (outcome, _rx) = task.await.unwrap();
            roles.push(outcome.role);
        }

        assert_eq!(registry.rooms_created(), 1);
        assert_eq!(registry.lookup("r2").unwrap().session_count(), 2);
        roles.sort_by_key(|r| format!("{:?}", r));
        assert_eq!(roles, vec![Role::Left, Role::Right]);
    }

    #[tokio::test]
    async fn roles_fill_left_right_then_spectators() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = session(8);
        let (b, _rx_b) = session(8);
        let (c, _rx_c) = session(8);

        let first = registry.join("r1", a);
        assert_eq!(first, JoinOutcome { role: Role::Left, ready: false });
        let second = registry.join("r1", b);
        assert_eq!(second, JoinOutcome { role: Role::Right, ready: true });
        assert_eq!(registry.join("r1", c).role, Role::Spectator);

        let events: Vec<String> = drain(&mut rx_a)
            .iter()
            .map(|m| m["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(events, vec!["roomJoined", "gameReady"]);
    }

    #[tokio::test]
    async fn local_sessions_share_the_local_role() {
        let registry = RoomRegistry::new();
        let (a, _rx) = session(8);
        let outcome = registry.join(LOCAL_ROOM_ID, a);
        assert_eq!(outcome, JoinOutcome { role: Role::Local, ready: false });
    }

    #[tokio::test]
    async fn side_player_leaving_notifies_room() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = session(8);
        let (b, mut rx_b) = session(8);
        let a_id = a.session_id;
        registry.join("r1", a);
        registry.join("r1", b);
        drain(&mut rx_b);

        let left = registry.leave("r1", a_id).unwrap();
        assert_eq!(left.state, SessionState::Closed);
        assert!(registry.lookup("r1").is_some());

        let msgs = drain(&mut rx_b);
        assert_eq!(msgs[0]["event"], "opponentDisconnected");
        assert_eq!(msgs[0]["data"]["roomId"], "r1");
    }

    #[tokio::test]
    async fn input_moves_only_the_owned_paddle() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = session(8);
        let (b, _rx_b) = session(8);
        let (c, _rx_c) = session(8);
        let (a_id, b_id, c_id) = (a.session_id, b.session_id, c.session_id);
        registry.join("r1", a);
        registry.join("r1", b);
        registry.join("r1", c);
        let room = registry.lookup("r1").unwrap();

        // Left player cannot steer the right paddle
        assert!(room.apply_input(a_id, &ClientMsg::MoveUp { side: Some(Side::Right) }));
        assert!(room.apply_input(b_id, &ClientMsg::MoveDown { side: None }));
        assert!(!room.apply_input(c_id, &ClientMsg::MoveUp { side: Some(Side::Left) }));

        room.with_match(|g| {
            assert_eq!(g.left.y, 250.0 - PADDLE_SPEED);
            assert_eq!(g.right.y, 250.0 + PADDLE_SPEED);
        });

        room.with_match(|g| g.paused = true);
        assert!(!room.apply_input(a_id, &ClientMsg::MoveUp { side: None }));
    }

    #[tokio::test]
    async fn armed_ai_owns_the_right_paddle() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = session(8);
        let (b, _rx_b) = session(8);
        let (a_id, b_id) = (a.session_id, b.session_id);
        registry.join("r1", a);
        assert_eq!(registry.join("r1", b).role, Role::Right);
        let room = registry.lookup("r1").unwrap();

        room.attach_ai(1, || tokio::spawn(async {}));
        assert!(!room.apply_input(b_id, &ClientMsg::MoveUp { side: None }));
        assert!(room.apply_input(a_id, &ClientMsg::MoveDown { side: None }));
        room.with_match(|g| {
            assert_eq!(g.left.y, 250.0 + PADDLE_SPEED);
            assert_eq!(g.right.y, 250.0);
        });

        // Same rule for the shared local match
        let (c, _rx_c) = session(8);
        let c_id = c.session_id;
        registry.join(LOCAL_ROOM_ID, c);
        let local = registry.get(LOCAL_ROOM_ID);
        local.attach_ai(2, || tokio::spawn(async {}));
        assert!(!local.apply_input(c_id, &ClientMsg::MoveUp { side: Some(Side::Right) }));
        assert!(local.apply_input(c_id, &ClientMsg::MoveUp { side: Some(Side::Left) }));
        local.with_match(|g| assert_eq!(g.right.y, 250.0));

        // Detaching hands the paddle back
        room.detach_ai(1);
        assert!(room.apply_input(b_id, &ClientMsg::MoveUp { side: None }));
    }

    #[tokio::test]
    async fn local_input_uses_requested_side() {
        let registry = RoomRegistry::new();
        let (a, _rx) = session(8);
        let a_id = a.session_id;
        registry.join(LOCAL_ROOM_ID, a);
        let room = registry.get(LOCAL_ROOM_ID);

        assert!(room.apply_input(a_id, &ClientMsg::MoveUp { side: Some(Side::Right) }));
        assert!(!room.apply_input(a_id, &ClientMsg::MoveUp { side: None }));
        room.with_match(|g| {
            assert_eq!(g.left.y, 250.0);
            assert_eq!(g.right.y, 250.0 - PADDLE_SPEED);
        });
    }

    #[tokio::test]
    async fn tick_drops_frames_for_full_sessions() {
        let registry = RoomRegistry::new();
        let (a, mut rx) = session(2);
        registry.join("r1", a);
        let room = registry.lookup("r1").unwrap();

        // roomJoined already holds one slot
        let first = room.tick();
        assert_eq!((first.delivered, first.dropped), (1, 0));
        let second = room.tick();
        assert_eq!((second.delivered, second.dropped), (0, 1));

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1]["event"], "gameState");
    }

    #[tokio::test]
    async fn closed_channel_is_skipped() {
        let registry = RoomRegistry::new();
        let (a, rx) = session(4);
        registry.join("r1", a);
        drop(rx);

        let report = registry.lookup("r1").unwrap().tick();
        assert_eq!((report.delivered, report.dropped), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn point_serves_after_delay() {
        let registry = RoomRegistry::new();
        let room = registry.get("r1");
        room.with_match(|g| {
            g.ball.x = 3.0;
            g.ball.y = 100.0;
            g.ball.dx = -BALL_SPEED_X;
        });

        let report = room.tick();
        assert!(matches!(report.outcome, TickOutcome::Scored { scorer: Side::Right, serve_pending: true }));
        assert!(room.with_match(|g| g.ball.is_docked()));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(room.with_match(|g| g.ball.is_docked()));

        tokio::time::sleep(Duration::from_millis(2)).await;
        room.with_match(|g| {
            assert_eq!(g.ball.dx, -BALL_SPEED_X);
            assert_eq!(g.ball.serve_toward, None);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_pending_serve() {
        let registry = RoomRegistry::new();
        let room = registry.get("r1");
        room.with_match(|g| {
            g.ball.x = 797.0;
            g.ball.dx = BALL_SPEED_X;
        });
        room.tick();
        registry.reset("r1");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(room.with_match(|g| g.ball.is_docked()));
    }

    #[tokio::test]
    async fn resume_serves_and_toggle_flips() {
        let registry = RoomRegistry::new();
        let (a, mut rx) = session(8);
        registry.join("r1", a);
        let room = registry.lookup("r1").unwrap();

        assert!(room.toggle_pause());
        assert!(room.with_match(|g| g.ball.is_docked()));

        room.resume();
        room.with_match(|g| {
            assert!(!g.paused);
            assert!(!g.ball.is_docked());
        });

        let pauses: Vec<bool> = drain(&mut rx)
            .iter()
            .filter(|m| m["event"] == "gamePaused")
            .map(|m| m["data"]["paused"].as_bool().unwrap())
            .collect();
        assert_eq!(pauses, vec![true, false]);
    }

    #[tokio::test]
    async fn public_rooms_pair_consecutive_players() {
        let registry = RoomRegistry::new();
        let first = registry.open_public_room();
        let second = registry.open_public_room();
        let third = registry.open_public_room();

        assert_eq!(first, second);
        assert_ne!(second, third);
        assert_eq!(registry.rooms_created(), 2);
    }

    #[tokio::test]
    async fn created_rooms_are_distinct_and_not_matchmade() {
        let registry = RoomRegistry::new();
        let a = registry.create_room();
        let b = registry.create_room();
        assert_ne!(a, b);
        assert_eq!(registry.rooms_created(), 2);

        let public = registry.open_public_room();
        assert_ne!(public, a);
        assert_ne!(public, b);
    }

    #[tokio::test]
    async fn filled_public_room_leaves_the_lobby() {
        let registry = RoomRegistry::new();
        let public = registry.open_public_room();

        // Both seats taken by explicit joins
        let (a, _rx_a) = session(8);
        let (b, _rx_b) = session(8);
        registry.join(&public, a);
        assert!(registry.join(&public, b).ready);

        let next = registry.open_public_room();
        assert_ne!(next, public);
        let (c, _rx_c) = session(8);
        assert_eq!(registry.join(&next, c).role, Role::Left);
    }

    #[tokio::test]
    async fn remove_closes_sessions() {
        let registry = RoomRegistry::new();
        let (a, mut rx) = session(8);
        registry.join("r1", a);
        drain(&mut rx);

        assert!(registry.remove("r1"));
        assert!(registry.lookup("r1").is_none());
        assert!(rx.recv().await.is_none());
        assert!(!registry.remove("r1"));
    }

    #[tokio::test]
    async fn active_rooms_only_lists_rooms_with_sessions() {
        let registry = RoomRegistry::new();
        registry.get("empty");
        let (a, _rx) = session(8);
        registry.join("busy", a);

        let ids: Vec<String> = registry.active_rooms().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["busy".to_string()]);
        assert_eq!(registry.session_count(), 1);
    }
}
