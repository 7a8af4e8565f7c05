//! Per-room players and enemies

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::ws::protocol::{EnemySnapshot, PlayerInfo, PlayerReadiness, PlayerStats};

use super::combat::{BASE_DAMAGE, BASE_FIRE_RATE_MS};

/// Connection handle, doubles as the player id
pub type ConnId = Uuid;

/// Room-scoped enemy id
pub type EnemyId = u64;

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: ConnId,

    // Position, always clamped to the world
    pub x: f32,
    pub y: f32,

    // Progression
    pub gold: u32,
    pub kills: u32,
    pub level: u32,
    pub fire_rate_ms: u32,
    pub damage: i32,
    pub damage_upgrades: u32,

    // Readiness
    pub ready: bool,
    pub shop_ready: bool,
}

impl PlayerState {
    pub fn new(id: ConnId, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            gold: 0,
            kills: 0,
            level: 1,
            fire_rate_ms: BASE_FIRE_RATE_MS,
            damage: BASE_DAMAGE,
            damage_upgrades: 0,
            ready: false,
            shop_ready: false,
        }
    }

    /// Zero progression and readiness, keeping identity
    pub fn reset_progress(&mut self, x: f32, y: f32) {
        *self = Self::new(self.id, x, y);
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            x: self.x,
            y: self.y,
            gold: self.gold,
            kills: self.kills,
            level: self.level,
            fire_rate_ms: self.fire_rate_ms,
            damage: self.damage,
            damage_upgrades: self.damage_upgrades,
            ready: self.ready,
            shop_ready: self.shop_ready,
        }
    }

    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            id: self.id,
            gold: self.gold,
            kills: self.kills,
            level: self.level,
            fire_rate_ms: self.fire_rate_ms,
            damage: self.damage,
            damage_upgrades: self.damage_upgrades,
        }
    }

    pub fn readiness(&self) -> PlayerReadiness {
        PlayerReadiness {
            id: self.id,
            ready: self.ready,
            shop_ready: self.shop_ready,
            gold: self.gold,
            kills: self.kills,
            level: self.level,
        }
    }
}

/// Hostile walking the path toward the structure
#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EnemyId,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub waypoint_index: usize,
    pub last_hit_by: Option<ConnId>,
}

impl Enemy {
    pub fn snapshot(&self) -> EnemySnapshot {
        EnemySnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            hp: self.hp.max(0),
            max_hp: self.max_hp,
            waypoint_index: self.waypoint_index,
        }
    }
}

/// Owns creation and destruction of a room's entities
#[derive(Debug, Default)]
pub struct EntityStore {
    players: HashMap<ConnId, PlayerState>,
    /// Ordered by id so snapshots list enemies in spawn order
    enemies: BTreeMap<EnemyId, Enemy>,
    next_enemy_id: EnemyId,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, player: PlayerState) {
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&mut self, id: &ConnId) -> Option<PlayerState> {
        self.players.remove(id)
    }

    pub fn player(&self, id: &ConnId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &ConnId) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut PlayerState> {
        self.players.values_mut()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_player(&self, id: &ConnId) -> bool {
        self.players.contains_key(id)
    }

    /// Create an enemy with the next room-scoped id
    pub fn spawn_enemy(&mut self, x: f32, y: f32, hp: i32) -> EnemyId {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        self.enemies.insert(
            id,
            Enemy {
                id,
                x,
                y,
                hp,
                max_hp: hp,
                waypoint_index: 0,
                last_hit_by: None,
            },
        );
        id
    }

    pub fn enemy_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    pub fn remove_enemy(&mut self, id: EnemyId) -> Option<Enemy> {
        self.enemies.remove(&id)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values()
    }

    pub fn enemies_mut(&mut self) -> impl Iterator<Item = &mut Enemy> {
        self.enemies.values_mut()
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    /// Drop every enemy and restart id allocation
    pub fn clear_enemies(&mut self) {
        self.enemies.clear();
        self.next_enemy_id = 0;
    }

    pub fn enemy_snapshots(&self) -> Vec<EnemySnapshot> {
        self.enemies().map(Enemy::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enemy_ids_are_unique_until_cleared() {
        let mut store = EntityStore::new();
        let a = store.spawn_enemy(0.0, 300.0, 30);
        let b = store.spawn_enemy(0.0, 310.0, 30);
        assert_ne!(a, b);

        store.remove_enemy(a);
        let c = store.spawn_enemy(0.0, 290.0, 30);
        assert_ne!(c, a);
        assert_ne!(c, b);

        store.clear_enemies();
        assert_eq!(store.enemy_count(), 0);
        assert_eq!(store.spawn_enemy(0.0, 300.0, 30), 0);
    }

    #[test]
    fn snapshot_never_reports_negative_hp() {
        let mut store = EntityStore::new();
        let id = store.spawn_enemy(0.0, 300.0, 10);
        store.enemy_mut(id).unwrap().hp = -4;
        assert_eq!(store.enemy_snapshots()[0].hp, 0);
    }

    #[test]
    fn reset_progress_keeps_identity() {
        let id = Uuid::new_v4();
        let mut player = PlayerState::new(id, 10.0, 10.0);
        player.gold = 90;
        player.kills = 12;
        player.level = 3;
        player.ready = true;

        player.reset_progress(400.0, 200.0);
        assert_eq!(player.id, id);
        assert_eq!((player.gold, player.kills, player.level), (0, 0, 1));
        assert!(!player.ready);
        assert_eq!((player.x, player.y), (400.0, 200.0));
    }
}
