//! Snapshot building for network transmission

use crate::ws::protocol::{GameSnapshot, MatchInfo, PlayerInfo, ServerMsg};

use super::entities::EntityStore;
use super::r#match::{GameState, MatchConfig};

/// Paces the periodic full-state push
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build the periodic snapshot message
    pub fn build(config: &MatchConfig, game: &GameState, entities: &EntityStore) -> ServerMsg {
        ServerMsg::GameStateUpdate {
            structure_hp: game.structure_hp,
            wave: game.wave,
            enemies: entities.enemy_snapshots(),
            game_over: game.game_over,
            match_state: config.state,
            current_wave: config.current_wave,
            max_waves: config.max_waves,
        }
    }
}

pub fn game_snapshot(game: &GameState, entities: &EntityStore) -> GameSnapshot {
    GameSnapshot {
        structure_hp: game.structure_hp,
        wave: game.wave,
        enemies: entities.enemy_snapshots(),
    }
}

pub fn match_info(config: &MatchConfig) -> MatchInfo {
    MatchInfo {
        state: config.state,
        current_wave: config.current_wave,
        max_waves: config.max_waves,
    }
}

pub fn player_list(entities: &EntityStore) -> Vec<PlayerInfo> {
    entities.players().map(|p| p.info()).collect()
}

/// Match-level change notice with everyone's readiness
pub fn state_changed(config: &MatchConfig, entities: &EntityStore) -> ServerMsg {
    ServerMsg::GameStateChanged {
        state: config.state,
        current_wave: config.current_wave,
        max_waves: config.max_waves,
        total_gold: entities.players().map(|p| p.gold).sum(),
        players: entities.players().map(|p| p.readiness()).collect(),
    }
}
