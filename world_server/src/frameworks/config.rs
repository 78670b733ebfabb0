use std::{env, path::PathBuf, time::Duration};

// Runtime/server constants (not gameplay tuning).

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

pub fn http_port() -> u16 {
    env_parse("WORLD_SERVER_PORT").unwrap_or(5003)
}

pub fn characters_service_url() -> String {
    env::var("CHARACTERS_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:5005".to_string())
}

pub fn characters_request_timeout() -> Duration {
    Duration::from_millis(env_parse("CHARACTERS_REQUEST_TIMEOUT_MS").unwrap_or(2000))
}

pub fn characters_service_token() -> Option<String> {
    env::var("CHARACTERS_SERVICE_TOKEN").ok()
}

pub fn tick_interval() -> Duration {
    // A zero interval would spin the engine.
    let millis: u64 = env_parse("TICK_INTERVAL_MS").unwrap_or(500);
    Duration::from_millis(millis.max(1))
}

pub fn spawn_search_radius() -> i32 {
    env_parse::<i32>("SPAWN_SEARCH_RADIUS").unwrap_or(10).max(0)
}

pub fn move_log_path() -> PathBuf {
    env::var("MOVE_LOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("accepted_moves.jsonl"))
}

pub fn world_map_path() -> Option<PathBuf> {
    env::var("WORLD_MAP_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

pub fn move_consumer_poll_interval() -> Duration {
    Duration::from_millis(env_parse("MOVE_CONSUMER_POLL_MS").unwrap_or(5000))
}

pub const SNAPSHOT_BROADCAST_CAPACITY: usize = 128;
pub const CHAT_BROADCAST_CAPACITY: usize = 256;

pub const MOVE_PUBLISH_ATTEMPTS: u32 = 3;
pub const MOVE_PUBLISH_BACKOFF: Duration = Duration::from_millis(50);

/// Everything the server bootstrap reads, resolved once.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub characters_service_url: String,
    pub characters_request_timeout: Duration,
    pub tick_interval: Duration,
    pub spawn_search_radius: i32,
    pub move_log_path: PathBuf,
    pub world_map_path: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self {
            characters_service_url: characters_service_url(),
            characters_request_timeout: characters_request_timeout(),
            tick_interval: tick_interval(),
            spawn_search_radius: spawn_search_radius(),
            move_log_path: move_log_path(),
            world_map_path: world_map_path(),
        }
    }
}
