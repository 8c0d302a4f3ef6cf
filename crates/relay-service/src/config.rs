//! Relay configuration.
//!
//! Configuration is loaded from `RELAY_*` environment variables. Every
//! variable is optional; a value that is present but does not parse is an
//! error rather than a silent fallback to the default.

use room_protocol::RoomId;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";

/// Default browser origin allowed by CORS.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Default outbound queue size per channel, in events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Default maximum inbound WebSocket message size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Default interval between server pings.
pub const DEFAULT_PING_INTERVAL_SECONDS: u64 = 25;

/// Default silence after which a channel is closed.
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 60;

/// Default participant limit per room (0 = unlimited).
pub const DEFAULT_MAX_PARTICIPANTS_PER_ROOM: usize = 0;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:5000").
    pub bind_address: String,

    /// Room served on `/ws` (default: "video-chat-room").
    pub default_room: RoomId,

    /// Origin allowed by CORS, credentials included.
    pub allowed_origin: String,

    pub channel_buffer: usize,

    pub max_message_bytes: usize,

    pub ping_interval: Duration,

    /// Always longer than `ping_interval`.
    pub idle_timeout: Duration,

    /// Joined participants per room; 0 means unlimited.
    pub max_participants_per_room: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            default_room: RoomId::default(),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECONDS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECONDS),
            max_participants_per_room: DEFAULT_MAX_PARTICIPANTS_PER_ROOM,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let default_room = match vars.get("RELAY_DEFAULT_ROOM") {
            Some(room) if room.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "RELAY_DEFAULT_ROOM must not be empty".to_string(),
                ));
            }
            Some(room) => RoomId::new(room.trim()),
            None => RoomId::default(),
        };

        let allowed_origin = vars
            .get("RELAY_ALLOWED_ORIGIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string());

        let channel_buffer =
            parse_or(vars, "RELAY_CHANNEL_BUFFER", DEFAULT_CHANNEL_BUFFER)?;
        if channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_CHANNEL_BUFFER must be greater than zero".to_string(),
            ));
        }

        let max_message_bytes =
            parse_or(vars, "RELAY_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?;

        let ping_interval_seconds = parse_or(
            vars,
            "RELAY_PING_INTERVAL_SECONDS",
            DEFAULT_PING_INTERVAL_SECONDS,
        )?;
        let idle_timeout_seconds = parse_or(
            vars,
            "RELAY_IDLE_TIMEOUT_SECONDS",
            DEFAULT_IDLE_TIMEOUT_SECONDS,
        )?;
        if ping_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_PING_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }
        if idle_timeout_seconds <= ping_interval_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "RELAY_IDLE_TIMEOUT_SECONDS ({idle_timeout_seconds}) must exceed \
                 RELAY_PING_INTERVAL_SECONDS ({ping_interval_seconds})"
            )));
        }

        let max_participants_per_room = parse_or(
            vars,
            "RELAY_MAX_PARTICIPANTS_PER_ROOM",
            DEFAULT_MAX_PARTICIPANTS_PER_ROOM,
        )?;

        Ok(Config {
            bind_address,
            default_room,
            allowed_origin,
            channel_buffer,
            max_message_bytes,
            ping_interval: Duration::from_secs(ping_interval_seconds),
            idle_timeout: Duration::from_secs(idle_timeout_seconds),
            max_participants_per_room,
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            name,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.default_room.as_str(), "video-chat-room");
        assert_eq!(config.allowed_origin, "http://localhost:5173");
        assert_eq!(config.channel_buffer, 256);
        assert_eq!(config.max_message_bytes, 65536);
        assert_eq!(config.ping_interval, Duration::from_secs(25));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.max_participants_per_room, 0);
    }

    #[test]
    fn test_default_impl_matches_empty_env() {
        let from_env = Config::from_vars(&HashMap::new()).unwrap();
        let default = Config::default();
        assert_eq!(from_env.bind_address, default.bind_address);
        assert_eq!(from_env.idle_timeout, default.idle_timeout);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(&vars(&[
            ("RELAY_BIND_ADDRESS", "127.0.0.1:9000"),
            ("RELAY_DEFAULT_ROOM", " standup "),
            ("RELAY_ALLOWED_ORIGIN", "https://app.example.com"),
            ("RELAY_CHANNEL_BUFFER", "32"),
            ("RELAY_PING_INTERVAL_SECONDS", "5"),
            ("RELAY_IDLE_TIMEOUT_SECONDS", "15"),
            ("RELAY_MAX_PARTICIPANTS_PER_ROOM", "4"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.default_room.as_str(), "standup");
        assert_eq!(config.allowed_origin, "https://app.example.com");
        assert_eq!(config.channel_buffer, 32);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.max_participants_per_room, 4);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = Config::from_vars(&vars(&[("RELAY_CHANNEL_BUFFER", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "RELAY_CHANNEL_BUFFER",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_channel_buffer_rejected() {
        let result = Config::from_vars(&vars(&[("RELAY_CHANNEL_BUFFER", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_idle_timeout_must_exceed_ping_interval() {
        let result = Config::from_vars(&vars(&[
            ("RELAY_PING_INTERVAL_SECONDS", "30"),
            ("RELAY_IDLE_TIMEOUT_SECONDS", "30"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_blank_default_room_rejected() {
        let result = Config::from_vars(&vars(&[("RELAY_DEFAULT_ROOM", "   ")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
