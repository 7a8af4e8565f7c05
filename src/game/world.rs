//! Static world geometry: bounds, structure and enemy path

use rand::Rng;

/// World width in units
pub const WORLD_WIDTH: f32 = 800.0;
/// World height in units
pub const WORLD_HEIGHT: f32 = 600.0;
/// Player sprite edge length; positions keep half of it inside the world
pub const PLAYER_SIZE: f32 = 32.0;
/// Distance a player travels per held key per move intent
pub const PLAYER_STEP: f32 = 4.0;

/// Defended structure position
pub const STRUCTURE_X: f32 = 400.0;
pub const STRUCTURE_Y: f32 = 300.0;
/// Players spawn this far from the structure
pub const SPAWN_RADIUS: f32 = 100.0;

/// Enemy travel per tick
pub const ENEMY_STEP: f32 = 1.2;
/// Enemies closer than this to a waypoint have reached it
pub const ARRIVAL_THRESHOLD: f32 = 30.0;
/// Vertical spread of enemy spawn points around the first waypoint
pub const SPAWN_JITTER: f32 = 50.0;

/// A point on the enemy path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
}

/// Enemy path; the last waypoint is the structure
pub const WAYPOINTS: [Waypoint; 2] = [
    Waypoint { x: 0.0, y: 300.0 },
    Waypoint {
        x: STRUCTURE_X,
        y: STRUCTURE_Y,
    },
];

/// Held movement keys
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Outcome of stepping an enemy along the path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathStep {
    /// Still travelling; new position and waypoint index
    Moving { x: f32, y: f32, waypoint_index: usize },
    /// Reached the final waypoint
    Breached,
}

/// World rules for movement and placement
pub struct WorldSystem;

impl WorldSystem {
    /// Clamp a position so a player stays fully inside the world
    pub fn clamp_to_world(x: f32, y: f32) -> (f32, f32) {
        let half = PLAYER_SIZE / 2.0;
        (
            x.clamp(half, WORLD_WIDTH - half),
            y.clamp(half, WORLD_HEIGHT - half),
        )
    }

    /// Apply one move intent, returns the clamped position
    pub fn apply_move(x: f32, y: f32, keys: MoveKeys) -> (f32, f32) {
        let mut new_x = x;
        let mut new_y = y;

        if keys.up {
            new_y -= PLAYER_STEP;
        }
        if keys.down {
            new_y += PLAYER_STEP;
        }
        if keys.left {
            new_x -= PLAYER_STEP;
        }
        if keys.right {
            new_x += PLAYER_STEP;
        }

        Self::clamp_to_world(new_x, new_y)
    }

    /// Random spawn point on the ring around the structure
    pub fn player_spawn<R: Rng>(rng: &mut R) -> (f32, f32) {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        Self::clamp_to_world(
            STRUCTURE_X + angle.cos() * SPAWN_RADIUS,
            STRUCTURE_Y + angle.sin() * SPAWN_RADIUS,
        )
    }

    /// Random spawn point near the start of the path
    pub fn enemy_spawn<R: Rng>(rng: &mut R) -> (f32, f32) {
        let start = WAYPOINTS[0];
        let jitter = rng.gen_range(-SPAWN_JITTER..SPAWN_JITTER);
        (start.x, start.y + jitter)
    }

    /// Advance an enemy one tick toward its next waypoint
    pub fn step_enemy(x: f32, y: f32, waypoint_index: usize) -> PathStep {
        let last = WAYPOINTS.len() - 1;
        let target = WAYPOINTS[(waypoint_index + 1).min(last)];

        let dx = target.x - x;
        let dy = target.y - y;
        let dist = (dx * dx + dy * dy).sqrt();

        let mut next_index = waypoint_index;
        if dist < ARRIVAL_THRESHOLD {
            if waypoint_index + 1 < last {
                next_index += 1;
            } else {
                return PathStep::Breached;
            }
        }

        if dist <= f32::EPSILON {
            return PathStep::Moving {
                x,
                y,
                waypoint_index: next_index,
            };
        }

        PathStep::Moving {
            x: x + dx / dist * ENEMY_STEP,
            y: y + dy / dist * ENEMY_STEP,
            waypoint_index: next_index,
        }
    }
}
