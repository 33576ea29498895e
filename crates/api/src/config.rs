//! Application configuration

use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub engine: EngineConfig,
    pub events: EventsConfig,
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_env")]
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending events before ingestion fails fast
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Number of drain workers; events are sharded by user id so per-user
    /// ordering holds for any worker count
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Grace period for stop() to let in-flight events finish, in seconds
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Default number of recent events fetched as condition history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Raw events older than this are eligible for purging
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Interval between retention sweeps, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    /// Cached result sets expire after this many seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_env() -> String {
    "development".to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_workers() -> usize {
    1
}

fn default_stop_grace() -> u64 {
    5
}

fn default_history_limit() -> usize {
    1000
}

fn default_retention_days() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_cache_ttl() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> anyhow::Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.environment", env.clone())?
            .set_default("queue.capacity", 10_000)?
            .set_default("queue.workers", 1)?
            .set_default("queue.stop_grace_seconds", 5)?
            .set_default("engine.history_limit", 1000)?
            .set_default("events.retention_days", 30)?
            .set_default("events.sweep_interval_seconds", 3600)?
            .set_default("leaderboard.cache_ttl_seconds", 300)?
            // Load from config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (e.g., SERVER_PORT, QUEUE_CAPACITY)
            .add_source(Environment::default().separator("_").try_parsing(true))
            .build()?;

        let mut app_config: Self = config.try_deserialize()?;

        // Manual overrides - separator("_") splits ALL underscores, so keys like
        // ENGINE_HISTORY_LIMIT become engine.history.limit instead of
        // engine.history_limit. Read these directly.
        if let Some(v) = read_env_parsed::<usize>("QUEUE_CAPACITY") {
            app_config.queue.capacity = v;
        }
        if let Some(v) = read_env_parsed::<usize>("QUEUE_WORKERS") {
            app_config.queue.workers = v;
        }
        if let Some(v) = read_env_parsed::<usize>("ENGINE_HISTORY_LIMIT") {
            app_config.engine.history_limit = v;
        }
        if let Some(v) = read_env_parsed::<i64>("EVENTS_RETENTION_DAYS") {
            app_config.events.retention_days = v;
        }
        if let Some(v) = read_env_parsed::<u64>("LEADERBOARD_CACHE_TTL_SECONDS") {
            app_config.leaderboard.cache_ttl_seconds = v;
        }

        if app_config.queue.capacity == 0 {
            anyhow::bail!("queue.capacity must be greater than zero");
        }
        if app_config.queue.workers == 0 {
            anyhow::bail!("queue.workers must be greater than zero");
        }
        if app_config.engine.history_limit == 0 {
            anyhow::bail!("engine.history_limit must be greater than zero");
        }

        Ok(app_config)
    }

    /// Check if running in production
    #[allow(dead_code)]
    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                environment: default_env(),
            },
            queue: QueueConfig {
                capacity: default_queue_capacity(),
                workers: default_workers(),
                stop_grace_seconds: default_stop_grace(),
            },
            engine: EngineConfig {
                history_limit: default_history_limit(),
            },
            events: EventsConfig {
                retention_days: default_retention_days(),
                sweep_interval_seconds: default_sweep_interval(),
            },
            leaderboard: LeaderboardConfig {
                cache_ttl_seconds: default_cache_ttl(),
            },
        }
    }
}

fn read_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(v) => {
            tracing::info!("Loading {} from environment: {}", key, raw);
            Some(v)
        }
        Err(_) => {
            tracing::warn!("Ignoring unparseable {} value: {}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.queue.capacity, 10_000);
        assert_eq!(config.queue.workers, 1);
        assert_eq!(config.engine.history_limit, 1000);
        assert_eq!(config.events.retention_days, 30);
        assert_eq!(config.leaderboard.cache_ttl_seconds, 300);
    }
}
