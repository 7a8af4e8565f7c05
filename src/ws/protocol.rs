//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upgrades purchasable in the shop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeType {
    /// Raises damage dealt per hit
    Damage,
}

/// Match-level state of a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    /// Waiting for every player to ready up
    #[default]
    Lobby,
    /// Wave in progress
    Playing,
    /// Between waves, buying upgrades
    Shop,
    /// All waves cleared
    Victory,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join (or switch to) a room, default room when omitted or blank
    JoinRoom {
        #[serde(default)]
        room: Option<String>,
    },

    /// Flip the lobby ready flag
    ToggleReady,

    /// Flip the shop ready flag
    ShopReady,

    /// Purchase an upgrade while the shop is open
    BuyUpgrade { upgrade: UpgradeType },

    /// Movement keys held this frame
    Move {
        #[serde(default)]
        up: bool,
        #[serde(default)]
        down: bool,
        #[serde(default)]
        left: bool,
        #[serde(default)]
        right: bool,
    },

    /// Player fired toward a point (relayed for visuals only)
    Shoot { target_x: f32, target_y: f32 },

    /// Player's projectile reached an enemy
    Hit { enemy_id: u64 },

    /// Return the room to the lobby
    Reset,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// Confirmation of room join
    RoomJoined { room: String, player_id: Uuid },

    /// Everything a fresh member needs to render the room
    CurrentState {
        player_id: Uuid,
        players: Vec<PlayerInfo>,
        match_info: MatchInfo,
        game: GameSnapshot,
    },

    /// Another player entered the room
    NewPlayer { player: PlayerInfo },

    /// A player's position changed
    PlayerMoved { player_id: Uuid, x: f32, y: f32 },

    /// A player fired toward a point
    ProjectileFired {
        player_id: Uuid,
        start_x: f32,
        start_y: f32,
        target_x: f32,
        target_y: f32,
    },

    /// Periodic full game state (sent at regular intervals)
    GameStateUpdate {
        structure_hp: i32,
        wave: u32,
        enemies: Vec<EnemySnapshot>,
        game_over: bool,
        match_state: MatchPhase,
        current_wave: u32,
        max_waves: u32,
    },

    /// Enemy destroyed by a player
    EnemyKilled {
        enemy_id: u64,
        killer_id: Option<Uuid>,
        x: f32,
        y: f32,
    },

    /// The wave was cleared
    WaveComplete { wave: u32 },

    /// Difficulty of the wave that is starting
    WaveStats {
        wave: u32,
        enemy_hp: i32,
        total_enemies: u32,
        num_players: u32,
    },

    /// Shop is open ahead of the given wave
    ShopOpened { next_wave: u32 },

    /// A player's progression changed
    PlayerUpdate { player: PlayerStats },

    /// Structure destroyed
    GameOver { wave: u32 },

    /// Match state or readiness changed
    GameStateChanged {
        state: MatchPhase,
        current_wave: u32,
        max_waves: u32,
        total_gold: u32,
        players: Vec<PlayerReadiness>,
    },

    /// Room was returned to the lobby
    GameReset {
        players: Vec<PlayerInfo>,
        game: GameSnapshot,
    },

    /// Player left the room
    PlayerDisconnected { player_id: Uuid },

    /// Join rejected, the room is at capacity
    RoomFull { room: String, capacity: usize },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Full player record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub gold: u32,
    pub kills: u32,
    pub level: u32,
    /// Minimum milliseconds between shots
    pub fire_rate_ms: u32,
    pub damage: i32,
    pub damage_upgrades: u32,
    pub ready: bool,
    pub shop_ready: bool,
}

/// Progression fields pushed after kills and purchases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub id: Uuid,
    pub gold: u32,
    pub kills: u32,
    pub level: u32,
    pub fire_rate_ms: u32,
    pub damage: i32,
    pub damage_upgrades: u32,
}

/// Per-player lobby/shop status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerReadiness {
    pub id: Uuid,
    pub ready: bool,
    pub shop_ready: bool,
    pub gold: u32,
    pub kills: u32,
    pub level: u32,
}

/// Match progress as shown to a joining client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub state: MatchPhase,
    pub current_wave: u32,
    pub max_waves: u32,
}

/// Structure and enemy state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub structure_hp: i32,
    pub wave: u32,
    pub enemies: Vec<EnemySnapshot>,
}

/// Enemy state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    /// Never negative
    pub hp: i32,
    pub max_hp: i32,
    pub waypoint_index: usize,
}
