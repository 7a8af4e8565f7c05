//! Room task and registry of live rooms

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RoomSettings;
use crate::util::time::tick_duration;
use crate::ws::protocol::{ClientMsg, MatchPhase, ServerMsg};

use super::broadcast::{send_now, Members};
use super::entities::ConnId;
use super::r#match::{JoinOutcome, RoomSim, RoomStatus};

/// Inbox capacity of a room task
const ROOM_INBOX_CAPACITY: usize = 256;

/// Commands accepted by a room task
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a connection; the reply is dropped if the room is shutting down
    Join {
        conn_id: ConnId,
        outbound: mpsc::Sender<ServerMsg>,
        reply: oneshot::Sender<JoinOutcome>,
    },
    /// Remove a connection; acknowledged once processed
    Leave {
        conn_id: ConnId,
        ack: oneshot::Sender<()>,
    },
    /// Fire-and-forget intent from a member
    Intent { conn_id: ConnId, msg: ClientMsg },
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    /// Instance id, distinguishes a recreated room from its predecessor
    pub id: Uuid,
    pub name: Arc<str>,
    pub capacity: usize,
    pub input_tx: mpsc::Sender<RoomCommand>,
    status: Arc<RwLock<RoomStatus>>,
}

impl RoomHandle {
    pub fn status(&self) -> RoomStatus {
        self.status.read().clone()
    }

    pub fn player_count(&self) -> usize {
        self.status.read().player_count
    }
}

/// Registry of all live rooms, keyed by name
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.get(name).map(|r| r.value().clone())
    }

    /// Existing room for `name`, or the one built by `create`
    pub fn get_or_insert_with(&self, name: &str, create: impl FnOnce() -> RoomHandle) -> RoomHandle {
        self.rooms
            .entry(name.to_string())
            .or_insert_with(create)
            .value()
            .clone()
    }

    /// Remove `name` only if it still refers to room instance `id`
    pub fn remove_instance(&self, name: &str, id: Uuid) -> bool {
        self.rooms.remove_if(name, |_, handle| handle.id == id).is_some()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    pub fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative room task
pub struct Room {
    id: Uuid,
    sim: RoomSim,
    input_rx: mpsc::Receiver<RoomCommand>,
    members: Members,
    status: Arc<RwLock<RoomStatus>>,
    registry: Arc<RoomRegistry>,
    closing: bool,
}

impl Room {
    /// Create a room; the caller spawns [`Room::run`]
    pub fn new(
        name: &str,
        settings: RoomSettings,
        seed: u64,
        registry: Arc<RoomRegistry>,
    ) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(ROOM_INBOX_CAPACITY);
        let id = Uuid::new_v4();
        let sim = RoomSim::new(name, settings, seed);
        let capacity = sim.capacity();
        let status = Arc::new(RwLock::new(sim.status()));

        let handle = RoomHandle {
            id,
            name: Arc::from(name),
            capacity,
            input_tx,
            status: status.clone(),
        };

        let room = Self {
            id,
            sim,
            input_rx,
            members: Members::default(),
            status,
            registry,
            closing: false,
        };

        (room, handle)
    }

    /// Spawn a room task and return its handle
    pub fn spawn(name: &str, settings: RoomSettings, registry: Arc<RoomRegistry>) -> RoomHandle {
        let seed = rand::random::<u64>();
        let (room, handle) = Self::new(name, settings, seed, registry);
        tokio::spawn(room.run());
        handle
    }

    /// Run the room until its last player leaves
    pub async fn run(mut self) {
        info!(room = %self.sim.name(), room_id = %self.id, "Room created");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.input_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = tick_interval.tick() => self.sim.tick(),
            }

            self.flush();

            if self.closing {
                break;
            }
        }

        self.drain_after_close();
        info!(room = %self.sim.name(), room_id = %self.id, "Room closed");
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn_id,
                outbound,
                reply,
            } => {
                let outcome = self.sim.join(conn_id);
                match outcome {
                    JoinOutcome::Joined => self.members.insert(conn_id, outbound),
                    JoinOutcome::Full { capacity } => send_now(
                        conn_id,
                        &outbound,
                        ServerMsg::RoomFull {
                            room: self.sim.name().to_string(),
                            capacity,
                        },
                    ),
                }
                self.flush();
                let _ = reply.send(outcome);
            }
            RoomCommand::Leave { conn_id, ack } => {
                self.members.remove(&conn_id);
                if self.sim.leave(conn_id) && self.sim.is_empty() {
                    self.close();
                }
                self.flush();
                let _ = ack.send(());
            }
            RoomCommand::Intent { conn_id, msg } => self.sim.handle_intent(conn_id, msg),
        }
    }

    /// Deliver pending messages and publish status. Runs before any reply so
    /// a caller woken by the reply observes the updated counts.
    fn flush(&mut self) {
        for outbound in self.sim.take_outbound() {
            self.members.deliver(outbound);
        }
        *self.status.write() = self.sim.status();
    }

    /// Leave the registry and stop accepting commands
    fn close(&mut self) {
        self.registry.remove_instance(self.sim.name(), self.id);
        self.input_rx.close();
        self.closing = true;
    }

    /// Resolve commands that raced with shutdown. Dropped join replies tell
    /// the sender to retry on a fresh room.
    fn drain_after_close(&mut self) {
        while let Ok(cmd) = self.input_rx.try_recv() {
            match cmd {
                RoomCommand::Join { conn_id, .. } => {
                    debug!(room = %self.sim.name(), player_id = %conn_id, "Join raced room shutdown");
                }
                RoomCommand::Leave { ack, .. } => {
                    let _ = ack.send(());
                }
                RoomCommand::Intent { .. } => {}
            }
        }
    }
}

impl RoomStatus {
    pub fn is_active(&self) -> bool {
        self.state == MatchPhase::Playing && !self.game_over
    }
}
