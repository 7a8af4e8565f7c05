//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS (comma-separated, `*` for any)
    pub client_origin: String,

    /// Rules applied to every room created by this process
    pub rooms: RoomSettings,
}

/// Per-room rules shared by every room instance
#[derive(Clone, Debug)]
pub struct RoomSettings {
    /// Maximum players in a single room
    pub capacity: usize,
    /// Waves to clear before a match is won
    pub max_waves: u32,
    /// Room used when a join request names none
    pub default_room: String,
    /// Whether a shop phase runs between waves
    pub shop_enabled: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            capacity: 5,
            max_waves: 3,
            default_room: "main".to_string(),
            shop_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = RoomSettings::default();
        let rooms = RoomSettings {
            capacity: parse_var("ROOM_CAPACITY", defaults.capacity)?,
            max_waves: parse_var("MAX_WAVES", defaults.max_waves)?,
            default_room: env::var("DEFAULT_ROOM")
                .ok()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or(defaults.default_room),
            shop_enabled: parse_var("SHOP_ENABLED", defaults.shop_enabled)?,
        };

        if rooms.capacity == 0 {
            return Err(ConfigError::Invalid("ROOM_CAPACITY"));
        }
        if rooms.max_waves == 0 {
            return Err(ConfigError::Invalid("MAX_WAVES"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            rooms,
        })
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
