//! Wave difficulty and spawn pacing

use std::time::Duration;

/// Enemy hit points at wave 0 with one player
pub const BASE_ENEMY_HP: f64 = 30.0;
/// Spawn interval of the first wave
pub const BASE_SPAWN_INTERVAL_MS: u64 = 2000;
/// Interval shaved off per wave
pub const SPAWN_INTERVAL_STEP_MS: u64 = 300;
/// Spawn interval never drops below this
pub const MIN_SPAWN_INTERVAL_MS: u64 = 1000;

/// Difficulty of a single wave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveStats {
    pub enemy_hp: i32,
    pub enemy_quota: u32,
}

/// Wave difficulty curves
pub struct WaveDirector;

impl WaveDirector {
    /// Difficulty for `wave` with `player_count` players in the room.
    ///
    /// Both fields are non-decreasing in wave and in player count; an empty
    /// room is scored as a single player.
    pub fn compute_wave_stats(wave: u32, player_count: usize) -> WaveStats {
        let players = player_count.max(1) as u32;
        let wave_scale = 1.0 + f64::from(wave) * 0.5;
        let crowd_scale = 1.0 + f64::from(players - 1) * 0.7;
        let enemy_hp = (BASE_ENEMY_HP * wave_scale * crowd_scale).floor();

        WaveStats {
            enemy_hp: enemy_hp.min(f64::from(i32::MAX)) as i32,
            enemy_quota: (5 + wave.saturating_mul(2)).saturating_mul(players),
        }
    }

    /// Interval between spawns for `wave`, shrinking to a fixed floor
    pub fn spawn_interval(wave: u32) -> Duration {
        let reduction = u64::from(wave.saturating_sub(1)) * SPAWN_INTERVAL_STEP_MS;
        let ms = BASE_SPAWN_INTERVAL_MS
            .saturating_sub(reduction)
            .max(MIN_SPAWN_INTERVAL_MS);
        Duration::from_millis(ms)
    }
}

/// Repeating task driven by the room tick.
///
/// Stopped cadences never fire; restarting resets the elapsed time.
#[derive(Debug, Clone, Default)]
pub struct Cadence {
    period: Option<Duration>,
    elapsed: Duration,
}

impl Cadence {
    pub fn start(&mut self, period: Duration) {
        self.period = Some(period.max(Duration::from_millis(1)));
        self.elapsed = Duration::ZERO;
    }

    pub fn stop(&mut self) {
        self.period = None;
        self.elapsed = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.period.is_some()
    }

    /// Advance by `dt`, returns how many times the task fired
    pub fn advance(&mut self, dt: Duration) -> u32 {
        let Some(period) = self.period else {
            return 0;
        };

        self.elapsed += dt;
        let mut fired = 0;
        while self.elapsed >= period {
            self.elapsed -= period;
            fired += 1;
        }
        fired
    }
}
