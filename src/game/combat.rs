//! Combat system - damage claims, kill rewards, progression and upgrades

use crate::ws::protocol::UpgradeType;

use super::entities::{ConnId, EnemyId, EntityStore, PlayerState};

/// Damage per hit before upgrades
pub const BASE_DAMAGE: i32 = 12;
/// Gold granted for a kill
pub const GOLD_REWARD: u32 = 10;
/// A level is gained every this many kills
pub const KILLS_PER_LEVEL: u32 = 5;
/// Starting minimum milliseconds between shots
pub const BASE_FIRE_RATE_MS: u32 = 500;
/// Fire rate gained per level
pub const FIRE_RATE_STEP_MS: u32 = 50;
/// Fire rate never drops below this
pub const MIN_FIRE_RATE_MS: u32 = 200;

/// Pricing and effect of a shop upgrade
#[derive(Debug, Clone, Copy)]
pub struct UpgradeSpec {
    /// Price of the first purchase
    pub base_cost: u32,
    /// Price multiplier per purchase already owned
    pub growth: f64,
    /// Damage added per purchase
    pub damage_increment: i32,
}

impl UpgradeSpec {
    pub fn for_type(upgrade: UpgradeType) -> Self {
        match upgrade {
            UpgradeType::Damage => Self {
                base_cost: 30,
                growth: 1.5,
                damage_increment: 6,
            },
        }
    }

    /// Price of the next purchase when `owned` have been bought already
    pub fn cost(&self, owned: u32) -> u32 {
        let exponent = i32::try_from(owned).unwrap_or(i32::MAX);
        let cost = (f64::from(self.base_cost) * self.growth.powi(exponent)).round();
        // Saturating float-to-int cast
        cost as u32
    }
}

/// Result of a damage claim
#[derive(Debug, Clone, PartialEq)]
pub enum DamageOutcome {
    /// Target already gone
    Missed,
    /// Target survived with the remaining hit points
    Wounded { remaining_hp: i32 },
    /// Target destroyed
    Killed(KillReport),
}

/// A destroyed enemy and who was credited
#[derive(Debug, Clone, PartialEq)]
pub struct KillReport {
    pub enemy_id: EnemyId,
    pub x: f32,
    pub y: f32,
    /// Recorded last hitter, `None` if they already left the room
    pub killer: Option<ConnId>,
    pub leveled_up: bool,
}

/// Result of a purchase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Bought { cost: u32 },
    InsufficientGold { cost: u32 },
    UnknownPlayer,
}

/// Combat rules operating on a room's entities
pub struct CombatSystem;

impl CombatSystem {
    /// Apply `attacker`'s damage to `target`.
    ///
    /// A claim against an enemy that no longer exists is a no-op. The kill is
    /// credited to whoever is recorded as `last_hit_by` when hit points cross
    /// zero.
    pub fn apply_damage(
        entities: &mut EntityStore,
        attacker: ConnId,
        target: EnemyId,
    ) -> DamageOutcome {
        let Some(damage) = entities.player(&attacker).map(|p| p.damage) else {
            return DamageOutcome::Missed;
        };
        let Some(enemy) = entities.enemy_mut(target) else {
            return DamageOutcome::Missed;
        };

        enemy.hp -= damage;
        enemy.last_hit_by = Some(attacker);

        if enemy.hp > 0 {
            return DamageOutcome::Wounded {
                remaining_hp: enemy.hp,
            };
        }

        let Some(dead) = entities.remove_enemy(target) else {
            return DamageOutcome::Missed;
        };

        let mut report = KillReport {
            enemy_id: dead.id,
            x: dead.x,
            y: dead.y,
            killer: None,
            leveled_up: false,
        };

        if let Some(killer_id) = dead.last_hit_by {
            if let Some(killer) = entities.player_mut(&killer_id) {
                report.killer = Some(killer_id);
                report.leveled_up = Self::credit_kill(killer);
            }
        }

        DamageOutcome::Killed(report)
    }

    /// Grant the kill reward, returns true if the killer leveled up
    fn credit_kill(killer: &mut PlayerState) -> bool {
        killer.gold = killer.gold.saturating_add(GOLD_REWARD);
        killer.kills += 1;

        if killer.kills % KILLS_PER_LEVEL != 0 {
            return false;
        }

        killer.level += 1;
        killer.fire_rate_ms = killer
            .fire_rate_ms
            .saturating_sub(FIRE_RATE_STEP_MS)
            .max(MIN_FIRE_RATE_MS);
        true
    }

    /// Buy one upgrade for `buyer` if they can afford it
    pub fn buy_upgrade(
        entities: &mut EntityStore,
        buyer: ConnId,
        upgrade: UpgradeType,
    ) -> PurchaseOutcome {
        let Some(player) = entities.player_mut(&buyer) else {
            return PurchaseOutcome::UnknownPlayer;
        };

        let spec = UpgradeSpec::for_type(upgrade);
        let owned = match upgrade {
            UpgradeType::Damage => player.damage_upgrades,
        };
        let cost = spec.cost(owned);

        if player.gold < cost {
            return PurchaseOutcome::InsufficientGold { cost };
        }

        player.gold -= cost;
        match upgrade {
            UpgradeType::Damage => {
                player.damage_upgrades += 1;
                player.damage += spec.damage_increment;
            }
        }

        PurchaseOutcome::Bought { cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn store_with_players(n: usize) -> (EntityStore, Vec<ConnId>) {
        let mut store = EntityStore::new();
        let ids: Vec<ConnId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.add_player(PlayerState::new(*id, 400.0, 200.0));
        }
        (store, ids)
    }

    #[test]
    fn damage_accumulates_until_kill() {
        let (mut store, ids) = store_with_players(1);
        let enemy = store.spawn_enemy(10.0, 300.0, 30);

        assert_eq!(
            CombatSystem::apply_damage(&mut store, ids[0], enemy),
            DamageOutcome::Wounded { remaining_hp: 18 }
        );
        assert_eq!(
            CombatSystem::apply_damage(&mut store, ids[0], enemy),
            DamageOutcome::Wounded { remaining_hp: 6 }
        );
        match CombatSystem::apply_damage(&mut store, ids[0], enemy) {
            DamageOutcome::Killed(report) => {
                assert_eq!(report.killer, Some(ids[0]));
                assert_eq!((report.x, report.y), (10.0, 300.0));
            }
            other => panic!("expected kill, got {other:?}"),
        }
        assert_eq!(store.enemy_count(), 0);
    }

    #[test]
    fn late_claims_do_not_double_credit() {
        let (mut store, ids) = store_with_players(2);
        let enemy = store.spawn_enemy(0.0, 300.0, 12);

        assert!(matches!(
            CombatSystem::apply_damage(&mut store, ids[0], enemy),
            DamageOutcome::Killed(_)
        ));
        for _ in 0..3 {
            assert_eq!(
                CombatSystem::apply_damage(&mut store, ids[1], enemy),
                DamageOutcome::Missed
            );
        }

        let first = store.player(&ids[0]).unwrap();
        let second = store.player(&ids[1]).unwrap();
        assert_eq!((first.kills, first.gold), (1, GOLD_REWARD));
        assert_eq!((second.kills, second.gold), (0, 0));
    }

    #[test]
    fn kill_goes_to_recorded_last_hitter() {
        let (mut store, ids) = store_with_players(2);
        let enemy = store.spawn_enemy(0.0, 300.0, 20);

        CombatSystem::apply_damage(&mut store, ids[0], enemy);
        match CombatSystem::apply_damage(&mut store, ids[1], enemy) {
            DamageOutcome::Killed(report) => assert_eq!(report.killer, Some(ids[1])),
            other => panic!("expected kill, got {other:?}"),
        }
    }

    #[test]
    fn unknown_attacker_is_ignored() {
        let (mut store, _) = store_with_players(1);
        let enemy = store.spawn_enemy(0.0, 300.0, 20);
        assert_eq!(
            CombatSystem::apply_damage(&mut store, Uuid::new_v4(), enemy),
            DamageOutcome::Missed
        );
        assert_eq!(store.enemy_count(), 1);
    }

    #[test]
    fn fifth_kill_levels_up_and_fire_rate_bottoms_out() {
        let (mut store, ids) = store_with_players(1);
        let mut level_ups = 0;

        for _ in 0..(KILLS_PER_LEVEL * 10) {
            let enemy = store.spawn_enemy(0.0, 300.0, 1);
            if let DamageOutcome::Killed(report) =
                CombatSystem::apply_damage(&mut store, ids[0], enemy)
            {
                if report.leveled_up {
                    level_ups += 1;
                }
            }
        }

        let player = store.player(&ids[0]).unwrap();
        assert_eq!(level_ups, 10);
        assert_eq!(player.level, 11);
        assert_eq!(player.fire_rate_ms, MIN_FIRE_RATE_MS);
    }

    #[test]
    fn upgrade_cost_grows_strictly() {
        let spec = UpgradeSpec::for_type(UpgradeType::Damage);
        assert_eq!(spec.cost(0), 30);
        assert_eq!(spec.cost(1), 45);
        for owned in 1..25 {
            assert!(spec.cost(owned) > spec.cost(owned - 1));
        }
    }

    #[test]
    fn purchase_requires_gold_and_raises_damage() {
        let (mut store, ids) = store_with_players(1);

        assert_eq!(
            CombatSystem::buy_upgrade(&mut store, ids[0], UpgradeType::Damage),
            PurchaseOutcome::InsufficientGold { cost: 30 }
        );

        store.player_mut(&ids[0]).unwrap().gold = 80;
        assert_eq!(
            CombatSystem::buy_upgrade(&mut store, ids[0], UpgradeType::Damage),
            PurchaseOutcome::Bought { cost: 30 }
        );
        assert_eq!(
            CombatSystem::buy_upgrade(&mut store, ids[0], UpgradeType::Damage),
            PurchaseOutcome::Bought { cost: 45 }
        );
        assert_eq!(
            CombatSystem::buy_upgrade(&mut store, ids[0], UpgradeType::Damage),
            PurchaseOutcome::InsufficientGold { cost: 68 }
        );

        let player = store.player(&ids[0]).unwrap();
        assert_eq!(player.gold, 5);
        assert_eq!(player.damage_upgrades, 2);
        assert_eq!(player.damage, BASE_DAMAGE + 12);
    }
}
