/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Default buzz-in penalty when the operator doesn't override it.
    pub default_freeze_seconds: u64,
    /// A player with no heartbeat for this long is marked disconnected.
    pub heartbeat_timeout_seconds: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PARTYLINE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(13370);

        let default_freeze_seconds = std::env::var("PARTYLINE_FREEZE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let heartbeat_timeout_seconds = std::env::var("PARTYLINE_HEARTBEAT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            port,
            default_freeze_seconds,
            heartbeat_timeout_seconds,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 13370,
            default_freeze_seconds: 10,
            heartbeat_timeout_seconds: 30,
        }
    }
}
