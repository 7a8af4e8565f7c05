//! Match state machine and authoritative room simulation

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::RoomSettings;
use crate::util::time::{tick_duration, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{ClientMsg, MatchPhase, ServerMsg, UpgradeType};

use super::broadcast::{Outbound, Outbox};
use super::combat::{CombatSystem, DamageOutcome, PurchaseOutcome};
use super::entities::{ConnId, EnemyId, EntityStore, PlayerState};
use super::snapshot::{self, SnapshotBuilder};
use super::wave::{Cadence, WaveDirector};
use super::world::{MoveKeys, PathStep, WorldSystem};

/// Structure hit points at match start
pub const STRUCTURE_MAX_HP: i32 = 100;
/// Structure damage per enemy that reaches it
pub const BREACH_DAMAGE: i32 = 10;

/// Match progress (mutated only by the state machine)
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub state: MatchPhase,
    pub current_wave: u32,
    pub max_waves: u32,
}

impl MatchConfig {
    pub fn new(max_waves: u32) -> Self {
        Self {
            state: MatchPhase::default(),
            current_wave: 0,
            max_waves,
        }
    }
}

/// Per-room simulation values, reset with the room
#[derive(Debug, Clone)]
pub struct GameState {
    pub structure_hp: i32,
    pub wave: u32,
    pub game_over: bool,
    pub spawned_this_wave: u32,
    pub killed_this_wave: u32,
    pub enemy_quota: u32,
    pub enemy_hp: i32,
}

impl Default for GameState {
    fn default() -> Self {
        let first = WaveDirector::compute_wave_stats(0, 1);
        Self {
            structure_hp: STRUCTURE_MAX_HP,
            wave: 1,
            game_over: false,
            spawned_this_wave: 0,
            killed_this_wave: 0,
            enemy_quota: first.enemy_quota,
            enemy_hp: first.enemy_hp,
        }
    }
}

/// Result of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Full { capacity: usize },
}

/// Snapshot of room status for the registry
#[derive(Debug, Clone)]
pub struct RoomStatus {
    pub player_count: usize,
    pub state: MatchPhase,
    pub current_wave: u32,
    pub game_over: bool,
    pub spawning: bool,
}

/// Authoritative state of one room. All mutation goes through here, driven
/// sequentially by the room task.
pub struct RoomSim {
    name: String,
    settings: RoomSettings,
    pub match_config: MatchConfig,
    pub game: GameState,
    pub entities: EntityStore,
    spawner: Cadence,
    snapshots: SnapshotBuilder,
    rng: ChaCha8Rng,
    outbox: Outbox,
}

impl RoomSim {
    pub fn new(name: impl Into<String>, settings: RoomSettings, seed: u64) -> Self {
        let max_waves = settings.max_waves;
        Self {
            name: name.into(),
            settings,
            match_config: MatchConfig::new(max_waves),
            game: GameState::default(),
            entities: EntityStore::new(),
            spawner: Cadence::default(),
            snapshots: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Outbox::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entities.player_count() == 0
    }

    pub fn spawner_running(&self) -> bool {
        self.spawner.is_running()
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            player_count: self.entities.player_count(),
            state: self.match_config.state,
            current_wave: self.match_config.current_wave,
            game_over: self.game.game_over,
            spawning: self.spawner_running(),
        }
    }

    /// Messages produced since the last call
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbox.take()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Register a connection as a player, unless the room is at capacity
    pub fn join(&mut self, conn_id: ConnId) -> JoinOutcome {
        if !self.entities.has_player(&conn_id) {
            if self.entities.player_count() >= self.settings.capacity {
                info!(room = %self.name, player_id = %conn_id, "Room full, join rejected");
                return JoinOutcome::Full {
                    capacity: self.settings.capacity,
                };
            }

            let (x, y) = WorldSystem::player_spawn(&mut self.rng);
            self.entities.add_player(PlayerState::new(conn_id, x, y));

            if let Some(player) = self.entities.player(&conn_id) {
                self.outbox.others(
                    conn_id,
                    ServerMsg::NewPlayer {
                        player: player.info(),
                    },
                );
            }

            info!(
                room = %self.name,
                player_id = %conn_id,
                player_count = self.entities.player_count(),
                "Player joined room"
            );
        }

        self.outbox.to(
            conn_id,
            ServerMsg::RoomJoined {
                room: self.name.clone(),
                player_id: conn_id,
            },
        );
        self.outbox.to(
            conn_id,
            ServerMsg::CurrentState {
                player_id: conn_id,
                players: snapshot::player_list(&self.entities),
                match_info: snapshot::match_info(&self.match_config),
                game: snapshot::game_snapshot(&self.game, &self.entities),
            },
        );
        self.emit_state_changed();

        JoinOutcome::Joined
    }

    /// Remove a player, returns false if they were not in the room
    pub fn leave(&mut self, conn_id: ConnId) -> bool {
        if self.entities.remove_player(&conn_id).is_none() {
            return false;
        }

        info!(
            room = %self.name,
            player_id = %conn_id,
            player_count = self.entities.player_count(),
            "Player left room"
        );

        self.outbox
            .room(ServerMsg::PlayerDisconnected { player_id: conn_id });

        if self.is_empty() {
            self.spawner.stop();
            return true;
        }

        self.emit_state_changed();

        // The departing player may have been the only one not ready
        match self.match_config.state {
            MatchPhase::Lobby => self.try_start_match(),
            MatchPhase::Shop => self.try_close_shop(),
            _ => {}
        }

        true
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Apply a client intent; intents illegal in the current state are dropped
    pub fn handle_intent(&mut self, conn_id: ConnId, msg: ClientMsg) {
        if !self.entities.has_player(&conn_id) {
            debug!(room = %self.name, player_id = %conn_id, "Intent from non-member ignored");
            return;
        }

        match msg {
            ClientMsg::ToggleReady => self.toggle_ready(conn_id),
            ClientMsg::ShopReady => self.toggle_shop_ready(conn_id),
            ClientMsg::BuyUpgrade { upgrade } => self.buy_upgrade(conn_id, upgrade),
            ClientMsg::Move {
                up,
                down,
                left,
                right,
            } => self.move_player(
                conn_id,
                MoveKeys {
                    up,
                    down,
                    left,
                    right,
                },
            ),
            ClientMsg::Shoot { target_x, target_y } => self.shoot(conn_id, target_x, target_y),
            ClientMsg::Hit { enemy_id } => self.hit(conn_id, enemy_id),
            ClientMsg::Reset => self.reset(),
            ClientMsg::JoinRoom { .. } | ClientMsg::Ping { .. } => {
                debug!(room = %self.name, "Connection-level message reached room, ignoring");
            }
        }
    }

    fn toggle_ready(&mut self, conn_id: ConnId) {
        if self.match_config.state != MatchPhase::Lobby {
            return;
        }
        if let Some(player) = self.entities.player_mut(&conn_id) {
            player.ready = !player.ready;
        }
        self.emit_state_changed();
        self.try_start_match();
    }

    fn toggle_shop_ready(&mut self, conn_id: ConnId) {
        if self.match_config.state != MatchPhase::Shop {
            return;
        }
        if let Some(player) = self.entities.player_mut(&conn_id) {
            player.shop_ready = !player.shop_ready;
        }
        self.emit_state_changed();
        self.try_close_shop();
    }

    fn buy_upgrade(&mut self, conn_id: ConnId, upgrade: UpgradeType) {
        if self.match_config.state != MatchPhase::Shop {
            return;
        }

        match CombatSystem::buy_upgrade(&mut self.entities, conn_id, upgrade) {
            PurchaseOutcome::Bought { cost } => {
                debug!(room = %self.name, player_id = %conn_id, cost, "Upgrade bought");
                self.emit_player_update(conn_id);
            }
            PurchaseOutcome::InsufficientGold { cost } => {
                debug!(room = %self.name, player_id = %conn_id, cost, "Upgrade unaffordable");
            }
            PurchaseOutcome::UnknownPlayer => {}
        }
    }

    fn move_player(&mut self, conn_id: ConnId, keys: MoveKeys) {
        let Some(player) = self.entities.player_mut(&conn_id) else {
            return;
        };

        let (x, y) = WorldSystem::apply_move(player.x, player.y, keys);
        if x == player.x && y == player.y {
            return;
        }

        player.x = x;
        player.y = y;
        self.outbox.room(ServerMsg::PlayerMoved {
            player_id: conn_id,
            x,
            y,
        });
    }

    fn shoot(&mut self, conn_id: ConnId, target_x: f32, target_y: f32) {
        let Some(player) = self.entities.player(&conn_id) else {
            return;
        };

        let relay = ServerMsg::ProjectileFired {
            player_id: conn_id,
            start_x: player.x,
            start_y: player.y,
            target_x,
            target_y,
        };
        self.outbox.others(conn_id, relay);
    }

    fn hit(&mut self, conn_id: ConnId, enemy_id: EnemyId) {
        if !self.is_simulating() {
            return;
        }

        match CombatSystem::apply_damage(&mut self.entities, conn_id, enemy_id) {
            DamageOutcome::Missed | DamageOutcome::Wounded { .. } => {}
            DamageOutcome::Killed(report) => {
                self.game.killed_this_wave += 1;

                if let Some(killer) = report.killer {
                    if report.leveled_up {
                        debug!(room = %self.name, player_id = %killer, "Player leveled up");
                    }
                    self.emit_player_update(killer);
                }

                self.outbox.room(ServerMsg::EnemyKilled {
                    enemy_id: report.enemy_id,
                    killer_id: report.killer,
                    x: report.x,
                    y: report.y,
                });
            }
        }
    }

    /// Return the room to the lobby with fresh progression
    pub fn reset(&mut self) {
        self.spawner.stop();
        self.match_config = MatchConfig::new(self.settings.max_waves);
        self.game = GameState::default();
        self.entities.clear_enemies();

        for player in self.entities.players_mut() {
            let (x, y) = WorldSystem::player_spawn(&mut self.rng);
            player.reset_progress(x, y);
        }

        info!(room = %self.name, "Room reset to lobby");

        self.emit_state_changed();
        self.outbox.room(ServerMsg::GameReset {
            players: snapshot::player_list(&self.entities),
            game: snapshot::game_snapshot(&self.game, &self.entities),
        });
        self.snapshots.force_next();
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    fn try_start_match(&mut self) {
        if self.match_config.state != MatchPhase::Lobby || self.is_empty() {
            return;
        }
        if !self.entities.players().all(|p| p.ready) {
            return;
        }

        self.match_config.current_wave = 1;
        self.game = GameState::default();
        self.entities.clear_enemies();

        info!(
            room = %self.name,
            player_count = self.entities.player_count(),
            "All players ready, match starting"
        );

        self.start_wave();
    }

    fn try_close_shop(&mut self) {
        if self.match_config.state != MatchPhase::Shop || self.is_empty() {
            return;
        }
        if !self.entities.players().all(|p| p.shop_ready) {
            return;
        }

        self.start_wave();
    }

    /// Begin `current_wave`: compute its difficulty and start the spawner
    fn start_wave(&mut self) {
        let wave = self.match_config.current_wave;
        let player_count = self.entities.player_count();
        let stats = WaveDirector::compute_wave_stats(wave, player_count);

        self.match_config.state = MatchPhase::Playing;
        self.game.wave = wave;
        self.game.spawned_this_wave = 0;
        self.game.killed_this_wave = 0;
        self.game.enemy_quota = stats.enemy_quota;
        self.game.enemy_hp = stats.enemy_hp;
        self.spawner.start(WaveDirector::spawn_interval(wave));

        info!(
            room = %self.name,
            wave,
            enemy_hp = stats.enemy_hp,
            enemy_quota = stats.enemy_quota,
            "Wave started"
        );

        self.emit_state_changed();
        self.outbox.room(ServerMsg::WaveStats {
            wave,
            enemy_hp: stats.enemy_hp,
            total_enemies: stats.enemy_quota,
            num_players: player_count as u32,
        });
    }

    /// Advance past a finished wave. Safe to call every tick: does nothing
    /// unless the quota is spawned and no enemy is left.
    fn check_wave_complete(&mut self) -> bool {
        if !self.is_simulating() {
            return false;
        }
        if self.game.spawned_this_wave < self.game.enemy_quota || self.entities.enemy_count() > 0 {
            return false;
        }

        let completed = self.match_config.current_wave;
        self.spawner.stop();
        self.outbox.room(ServerMsg::WaveComplete { wave: completed });

        if completed >= self.match_config.max_waves {
            self.match_config.state = MatchPhase::Victory;
            info!(room = %self.name, wave = completed, "Final wave cleared, victory");
            self.emit_state_changed();
            self.snapshots.force_next();
            return true;
        }

        self.match_config.current_wave += 1;
        self.game.wave = self.match_config.current_wave;

        if self.settings.shop_enabled {
            self.open_shop();
        } else {
            self.start_wave();
        }
        true
    }

    fn open_shop(&mut self) {
        self.match_config.state = MatchPhase::Shop;
        for player in self.entities.players_mut() {
            player.shop_ready = false;
        }

        info!(room = %self.name, next_wave = self.match_config.current_wave, "Shop opened");

        self.outbox.room(ServerMsg::ShopOpened {
            next_wave: self.match_config.current_wave,
        });
        self.emit_state_changed();
    }

    fn trigger_game_over(&mut self) {
        self.game.structure_hp = 0;
        self.game.game_over = true;
        self.spawner.stop();

        info!(room = %self.name, wave = self.game.wave, "Structure destroyed, game over");

        self.outbox.room(ServerMsg::GameOver {
            wave: self.game.wave,
        });
        self.snapshots.force_next();
    }

    // ------------------------------------------------------------------
    // Simulation tick
    // ------------------------------------------------------------------

    fn is_simulating(&self) -> bool {
        self.match_config.state == MatchPhase::Playing && !self.game.game_over
    }

    /// Run one fixed-rate tick
    pub fn tick(&mut self) {
        if self.is_simulating() {
            let due = self.spawner.advance(tick_duration());
            for _ in 0..due {
                self.spawn_enemy();
            }

            self.update_enemies();
            self.check_wave_complete();
        }

        if self.snapshots.should_send() {
            self.outbox.room(SnapshotBuilder::build(
                &self.match_config,
                &self.game,
                &self.entities,
            ));
        }
    }

    fn spawn_enemy(&mut self) {
        if self.game.spawned_this_wave >= self.game.enemy_quota {
            self.spawner.stop();
            return;
        }

        let (x, y) = WorldSystem::enemy_spawn(&mut self.rng);
        self.entities.spawn_enemy(x, y, self.game.enemy_hp);
        self.game.spawned_this_wave += 1;

        if self.game.spawned_this_wave >= self.game.enemy_quota {
            self.spawner.stop();
        }
    }

    fn update_enemies(&mut self) {
        let mut breached = Vec::new();

        for enemy in self.entities.enemies_mut() {
            match WorldSystem::step_enemy(enemy.x, enemy.y, enemy.waypoint_index) {
                PathStep::Moving {
                    x,
                    y,
                    waypoint_index,
                } => {
                    enemy.x = x;
                    enemy.y = y;
                    enemy.waypoint_index = waypoint_index;
                }
                PathStep::Breached => breached.push(enemy.id),
            }
        }

        if breached.is_empty() {
            return;
        }

        for enemy_id in &breached {
            self.entities.remove_enemy(*enemy_id);
        }
        let damage = BREACH_DAMAGE * breached.len() as i32;
        self.game.structure_hp = (self.game.structure_hp - damage).max(0);

        if self.game.structure_hp == 0 {
            self.trigger_game_over();
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn emit_state_changed(&mut self) {
        let msg = snapshot::state_changed(&self.match_config, &self.entities);
        self.outbox.room(msg);
    }

    fn emit_player_update(&mut self, conn_id: ConnId) {
        if let Some(player) = self.entities.player(&conn_id) {
            let msg = ServerMsg::PlayerUpdate {
                player: player.stats(),
            };
            self.outbox.room(msg);
        }
    }
}
