use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HS256 secret the user tokens are signed with
    pub jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Max time a single write to a relay connection may take
    #[serde(default = "default_write_wait_secs")]
    pub relay_write_wait_secs: u64,

    /// Max time between two reads (frames or pongs) on a relay connection
    #[serde(default = "default_pong_wait_secs")]
    pub relay_pong_wait_secs: u64,

    /// Keep-alive ping period, defaults to 9/10 of the pong wait
    pub relay_ping_period_secs: Option<u64>,

    /// Largest inbound frame accepted from a client, in bytes
    #[serde(default = "default_max_message_size")]
    pub relay_max_message_size: usize,

    /// Per-club broker queue depth
    #[serde(default = "default_channel_capacity")]
    pub broker_channel_capacity: usize,

    /// How long a club's member list is cached by the connection gate, 0 disables
    #[serde(default = "default_member_cache_ttl_secs")]
    pub member_cache_ttl_secs: u64,
}

/// Deadlines and limits applied to every relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimings {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub max_message_size: usize,
}

impl Default for RelayTimings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(default_pong_wait_secs());
        Self {
            write_wait: Duration::from_secs(default_write_wait_secs()),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: default_max_message_size(),
        }
    }
}

impl RelayTimings {
    /// Check that keep-alive pings always land inside the read deadline.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.write_wait.is_zero() || self.pong_wait.is_zero() || self.ping_period.is_zero() {
            return Err(ConfigError::InvalidTiming(
                "relay deadlines must be greater than zero".to_string(),
            ));
        }
        if self.ping_period >= self.pong_wait {
            return Err(ConfigError::InvalidTiming(format!(
                "ping period ({:?}) must be shorter than pong wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidTiming(
                "max message size must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Config {
    /// Load configuration from environment variables or app.env file.
    /// Runs before tracing is set up, so failures are returned, not logged.
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Ok(envy::from_env::<Config>()?)
    }

    /// Fallback tracing filter when `RUST_LOG` is unset: `log_level` for this
    /// service, its HTTP layer and everything else.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim();
        format!("club_relay={level},tower_http={level},axum::rejection=trace,{level}")
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Session deadlines derived from the relay settings
    pub fn relay_timings(&self) -> Result<RelayTimings, ConfigError> {
        let pong_wait = Duration::from_secs(self.relay_pong_wait_secs);
        let ping_period = match self.relay_ping_period_secs {
            Some(secs) => Duration::from_secs(secs),
            None => pong_wait * 9 / 10,
        };
        RelayTimings {
            write_wait: Duration::from_secs(self.relay_write_wait_secs),
            pong_wait,
            ping_period,
            max_message_size: self.relay_max_message_size,
        }
        .validate()
    }

    /// Parsed list of allowed CORS origins
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            jwt_secret: None,
            db_url: None,
            relay_write_wait_secs: default_write_wait_secs(),
            relay_pong_wait_secs: default_pong_wait_secs(),
            relay_ping_period_secs: None,
            relay_max_message_size: default_max_message_size(),
            broker_channel_capacity: default_channel_capacity(),
            member_cache_ttl_secs: default_member_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid relay timing: {0}")]
    InvalidTiming(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "club-relay".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_max_message_size() -> usize {
    2048
}

fn default_channel_capacity() -> usize {
    256
}

fn default_member_cache_ttl_secs() -> u64 {
    30
}
