use std::env;
#[cfg(test)]
use std::sync::Mutex;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

/// Engine configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the canvas server.
    pub server: String,
    /// Measured character cell width in pixels.
    pub char_width: i64,
    /// Measured character cell height in pixels.
    pub char_height: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let server = env::var("MURAL_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
        Self {
            server,
            char_width: env_i64("MURAL_CHAR_WIDTH", 8),
            char_height: env_i64("MURAL_CHAR_HEIGHT", 16),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            char_width: 8,
            char_height: 16,
        }
    }
}

fn env_i64(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// What this user may do on the world. Supplied by the session layer when
/// joining; the engine never computes permissions, it only consumes them
/// (and demotes `can_write` on a permission-denied push).
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_read: true,
            can_write: false,
            can_admin: false,
        }
    }
}

/// Server-enabled features for this world.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    pub go_to_coord: bool,
    pub coord_link: bool,
    pub url_link: bool,
}

/// Everything the session layer hands the engine when joining a world.
#[derive(Debug, Clone, Default)]
pub struct JoinState {
    pub world: String,
    pub capabilities: Capabilities,
    pub features: Features,
}
