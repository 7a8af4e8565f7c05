//! Room manager - creates rooms on demand and routes connections to them

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RoomSettings;
use crate::game::{ConnId, JoinOutcome, Room, RoomCommand, RoomHandle, RoomRegistry};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Attempts before giving up on a room that keeps shutting down under us
const JOIN_ATTEMPTS: usize = 3;

/// Room manager errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Connection is not in a room")]
    NotInRoom,

    #[error("Room {0} is closed")]
    Closed(String),

    #[error("Room {0} could not be reached")]
    Unavailable(String),
}

/// Routes each connection to exactly one room
pub struct RoomManager {
    settings: RoomSettings,
    registry: Arc<RoomRegistry>,
    /// Map of connection -> current room name
    memberships: DashMap<ConnId, String>,
}

impl RoomManager {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            registry: Arc::new(RoomRegistry::new()),
            memberships: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Normalize a requested room name, blank means the default room
    pub fn room_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.settings.default_room)
            .to_string()
    }

    /// Room the connection currently belongs to
    pub fn current_room(&self, conn_id: &ConnId) -> Option<String> {
        self.memberships.get(conn_id).map(|r| r.value().clone())
    }

    /// Move a connection into `requested`, then leave its previous room.
    ///
    /// The target room decides capacity. A full room answers with a
    /// `room_full` notice on `outbound` and the connection stays where it was.
    pub async fn join_room(
        &self,
        conn_id: ConnId,
        requested: Option<&str>,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<JoinOutcome, RoomError> {
        let name = self.room_name(requested);

        for _ in 0..JOIN_ATTEMPTS {
            let handle = self.room_for(&name);
            let (reply_tx, reply_rx) = oneshot::channel();
            let join = RoomCommand::Join {
                conn_id,
                outbound: outbound.clone(),
                reply: reply_tx,
            };

            if handle.input_tx.send(join).await.is_err() {
                self.registry.remove_instance(&name, handle.id);
                continue;
            }

            match reply_rx.await {
                Ok(JoinOutcome::Joined) => {
                    let previous = self.memberships.insert(conn_id, name.clone());
                    if let Some(previous) = previous.filter(|p| *p != name) {
                        self.send_leave(conn_id, &previous).await;
                    }
                    return Ok(JoinOutcome::Joined);
                }
                Ok(full @ JoinOutcome::Full { .. }) => {
                    info!(room = %name, player_id = %conn_id, "Join rejected, room full");
                    return Ok(full);
                }
                Err(_) => {
                    debug!(room = %name, player_id = %conn_id, "Room closed during join, retrying");
                    self.registry.remove_instance(&name, handle.id);
                }
            }
        }

        warn!(room = %name, player_id = %conn_id, "Giving up on join");
        Err(RoomError::Unavailable(name))
    }

    /// Existing room, or a freshly spawned one
    fn room_for(&self, name: &str) -> RoomHandle {
        let registry = self.registry.clone();
        let settings = self.settings.clone();
        self.registry
            .get_or_insert_with(name, || Room::spawn(name, settings, registry))
    }

    /// Remove a connection from its room, returns false if it was in none.
    /// Resolves once the room has processed the leave.
    pub async fn leave_room(&self, conn_id: ConnId) -> bool {
        let Some((_, name)) = self.memberships.remove(&conn_id) else {
            return false;
        };

        self.send_leave(conn_id, &name).await;
        true
    }

    async fn send_leave(&self, conn_id: ConnId, name: &str) {
        let Some(handle) = self.registry.get(name) else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let leave = RoomCommand::Leave {
            conn_id,
            ack: ack_tx,
        };
        if handle.input_tx.send(leave).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Forward an intent to the connection's room
    pub async fn dispatch(&self, conn_id: ConnId, msg: ClientMsg) -> Result<(), RoomError> {
        let name = self.current_room(&conn_id).ok_or(RoomError::NotInRoom)?;
        let handle = self
            .registry
            .get(&name)
            .ok_or_else(|| RoomError::Closed(name.clone()))?;

        handle
            .input_tx
            .send(RoomCommand::Intent { conn_id, msg })
            .await
            .map_err(|_| RoomError::Closed(name))
    }

    pub fn active_rooms(&self) -> usize {
        self.registry.active_rooms()
    }

    pub fn total_players(&self) -> usize {
        self.registry.total_players()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::MatchPhase;
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct Client {
        id: ConnId,
        tx: mpsc::Sender<ServerMsg>,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Client {
        fn new() -> Self {
            let (tx, rx) = mpsc::channel(1024);
            Self {
                id: Uuid::new_v4(),
                tx,
                rx,
            }
        }

        /// Wait for the first message matching `pred`
        async fn expect<F: Fn(&ServerMsg) -> bool>(&mut self, pred: F) -> ServerMsg {
            timeout(Duration::from_secs(2), async {
                loop {
                    match self.rx.recv().await {
                        Some(msg) if pred(&msg) => return msg,
                        Some(_) => continue,
                        None => panic!("outbound channel closed"),
                    }
                }
            })
            .await
            .expect("expected message never arrived")
        }
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn join(manager: &RoomManager, client: &Client, room: &str) -> JoinOutcome {
        manager
            .join_room(client.id, Some(room), client.tx.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_join_creates_room_and_confirms() {
        let manager = RoomManager::new(RoomSettings::default());
        let mut client = Client::new();

        assert_eq!(join(&manager, &client, "alpha").await, JoinOutcome::Joined);
        assert_eq!(manager.active_rooms(), 1);
        assert_eq!(manager.current_room(&client.id).as_deref(), Some("alpha"));

        let msg = client
            .expect(|m| matches!(m, ServerMsg::RoomJoined { .. }))
            .await;
        assert!(matches!(msg, ServerMsg::RoomJoined { room, player_id } if room == "alpha" && player_id == client.id));
    }

    #[tokio::test]
    async fn blank_name_joins_default_room() {
        let manager = RoomManager::new(RoomSettings::default());
        let client = Client::new();

        manager
            .join_room(client.id, Some("   "), client.tx.clone())
            .await
            .unwrap();
        assert_eq!(manager.current_room(&client.id).as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn join_beyond_capacity_is_rejected() {
        let manager = RoomManager::new(RoomSettings::default());
        let members: Vec<Client> = (0..5).map(|_| Client::new()).collect();
        for member in &members {
            assert_eq!(join(&manager, member, "alpha").await, JoinOutcome::Joined);
        }

        let mut late = Client::new();
        assert_eq!(
            join(&manager, &late, "alpha").await,
            JoinOutcome::Full { capacity: 5 }
        );
        late.expect(|m| matches!(m, ServerMsg::RoomFull { capacity: 5, .. }))
            .await;
        assert_eq!(manager.current_room(&late.id), None);
        assert_eq!(manager.total_players(), 5);
    }

    #[tokio::test]
    async fn full_room_keeps_caller_in_current_room() {
        let settings = RoomSettings {
            capacity: 1,
            ..RoomSettings::default()
        };
        let manager = RoomManager::new(settings);
        let first = Client::new();
        let second = Client::new();

        join(&manager, &first, "alpha").await;
        join(&manager, &second, "beta").await;
        assert_eq!(
            join(&manager, &second, "alpha").await,
            JoinOutcome::Full { capacity: 1 }
        );
        assert_eq!(manager.current_room(&second.id).as_deref(), Some("beta"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_joins_into_full_room_keep_losers_home() {
        let settings = RoomSettings {
            capacity: 2,
            ..RoomSettings::default()
        };

        for round in 0..50 {
            let manager = Arc::new(RoomManager::new(settings.clone()));
            let resident = Client::new();
            join(&manager, &resident, "alpha").await;

            let joiners: Vec<Client> = (0..4).map(|_| Client::new()).collect();
            for (i, joiner) in joiners.iter().enumerate() {
                join(&manager, joiner, &format!("home-{}", i)).await;
            }

            let tasks: Vec<_> = joiners
                .iter()
                .map(|joiner| {
                    let manager = manager.clone();
                    let (id, tx) = (joiner.id, joiner.tx.clone());
                    tokio::spawn(async move {
                        manager.join_room(id, Some("alpha"), tx).await.unwrap()
                    })
                })
                .collect();

            let mut joined = 0;
            for (i, task) in tasks.into_iter().enumerate() {
                let home = format!("home-{}", i);
                match task.await.unwrap() {
                    JoinOutcome::Joined => {
                        joined += 1;
                        assert_eq!(manager.current_room(&joiners[i].id).as_deref(), Some("alpha"));
                        assert!(manager.registry().get(&home).is_none());
                    }
                    JoinOutcome::Full { capacity } => {
                        assert_eq!(capacity, 2);
                        assert_eq!(
                            manager.current_room(&joiners[i].id).as_deref(),
                            Some(home.as_str()),
                            "round {}",
                            round
                        );
                        let home_room = manager.registry().get(&home).unwrap();
                        assert_eq!(home_room.player_count(), 1);
                    }
                }
            }
            assert_eq!(joined, 1, "round {}", round);
            assert_eq!(manager.registry().get("alpha").unwrap().player_count(), 2);
        }
    }

    #[tokio::test]
    async fn last_leave_deletes_room_and_stops_it() {
        let manager = RoomManager::new(RoomSettings::default());
        let client = Client::new();
        join(&manager, &client, "alpha").await;
        let handle = manager.registry().get("alpha").unwrap();

        assert!(manager.leave_room(client.id).await);
        assert_eq!(manager.active_rooms(), 0);
        assert!(handle.input_tx.is_closed());
        assert!(!manager.leave_room(client.id).await);
    }

    #[tokio::test]
    async fn switching_rooms_leaves_the_old_one() {
        let manager = RoomManager::new(RoomSettings::default());
        let mover = Client::new();
        let mut stayer = Client::new();

        join(&manager, &stayer, "alpha").await;
        join(&manager, &mover, "alpha").await;
        join(&manager, &mover, "beta").await;

        assert_eq!(manager.current_room(&mover.id).as_deref(), Some("beta"));
        assert_eq!(manager.active_rooms(), 2);
        let mover_id = mover.id;
        stayer
            .expect(|m| matches!(m, ServerMsg::PlayerDisconnected { player_id } if *player_id == mover_id))
            .await;
    }

    #[tokio::test]
    async fn rejoining_a_deleted_room_creates_a_fresh_one() {
        let manager = RoomManager::new(RoomSettings::default());
        let client = Client::new();

        join(&manager, &client, "alpha").await;
        let first = manager.registry().get("alpha").unwrap().id;
        manager.leave_room(client.id).await;

        join(&manager, &client, "alpha").await;
        let second = manager.registry().get("alpha").unwrap().id;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn two_ready_players_start_the_match() {
        let manager = RoomManager::new(RoomSettings::default());
        let mut a = Client::new();
        let b = Client::new();
        join(&manager, &a, "alpha").await;
        join(&manager, &b, "alpha").await;

        manager.dispatch(a.id, ClientMsg::ToggleReady).await.unwrap();
        manager.dispatch(b.id, ClientMsg::ToggleReady).await.unwrap();

        let handle = manager.registry().get("alpha").unwrap();
        wait_until(|| handle.status().state == MatchPhase::Playing).await;
        assert!(handle.status().spawning);

        a.expect(|m| matches!(m, ServerMsg::WaveStats { wave: 1, num_players: 2, .. }))
            .await;
        a.expect(|m| {
            matches!(
                m,
                ServerMsg::GameStateUpdate {
                    match_state: MatchPhase::Playing,
                    ..
                }
            )
        })
        .await;
    }

    #[tokio::test]
    async fn dispatch_without_room_errors() {
        let manager = RoomManager::new(RoomSettings::default());
        let err = manager
            .dispatch(Uuid::new_v4(), ClientMsg::Reset)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom));
    }
}
