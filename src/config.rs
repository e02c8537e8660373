//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `OPCHAT_URL`, `OPCHAT_AGENT_ID`,
//!    `OPCHAT_AGENT_NAME`
//! 2. **Config file** — path via `--config <path>`, or `opchat.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! url = "https://chat.example.com"
//!
//! [agent]
//! id = "agent-001"
//! display_name = "Agent"
//!
//! [reconnect]
//! base_delay_ms = 3000            # backoff base, ×1.5 per attempt
//! max_attempts = 5                # then a terminal cannot-reconnect state
//! initial_load_delay_ms = 500     # open → first chat list request
//! heartbeat_interval_secs = 30    # ws ping interval
//! initial_tab = "open"            # tab requested by the initial load
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionPolicy;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat server location. One base URL serves both the WebSocket and the
/// media upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP(S) base URL of the chat server. Override with `OPCHAT_URL`.
    #[serde(default = "default_url")]
    pub url: String,
}

/// Agent identity, sent as query parameters in the socket URL.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier. Override with `OPCHAT_AGENT_ID`.
    #[serde(default = "default_agent_id")]
    pub id: String,
    /// Human-readable name shown to counterparties. Override with
    /// `OPCHAT_AGENT_NAME`.
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

/// Reconnect and session timing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Backoff base delay in milliseconds (default 3000). Attempt *n* waits
    /// `base × 1.5^(n−1)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Reconnect attempts before giving up (default 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between open and the initial chat list request (default 500).
    #[serde(default = "default_initial_load_delay_ms")]
    pub initial_load_delay_ms: u64,
    /// Seconds between keepalive pings while open (default 30).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Tab requested by the initial chat list load (default `open`).
    #[serde(default = "default_initial_tab")]
    pub initial_tab: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_agent_id() -> String {
    "agent-001".to_string()
}
fn default_display_name() -> String {
    "Agent".to_string()
}
fn default_base_delay_ms() -> u64 {
    3000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_load_delay_ms() -> u64 {
    500
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_initial_tab() -> String {
    "open".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            display_name: default_display_name(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            initial_load_delay_ms: default_initial_load_delay_ms(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            initial_tab: default_initial_tab(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `opchat.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("opchat.toml").exists() {
            let content =
                std::fs::read_to_string("opchat.toml").expect("Failed to read opchat.toml");
            toml::from_str(&content).expect("Failed to parse opchat.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(url) = std::env::var("OPCHAT_URL") {
            config.server.url = url;
        }
        if let Ok(id) = std::env::var("OPCHAT_AGENT_ID") {
            config.agent.id = id;
        }
        if let Ok(name) = std::env::var("OPCHAT_AGENT_NAME") {
            config.agent.display_name = name;
        }

        config
    }

    /// Timing knobs for the connection manager.
    pub fn policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            initial_load_delay: Duration::from_millis(self.reconnect.initial_load_delay_ms),
            heartbeat_interval: Duration::from_secs(self.reconnect.heartbeat_interval_secs),
            initial_tab: self.reconnect.initial_tab.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:8080");
        assert_eq!(config.reconnect.base_delay_ms, 3000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_tab, "open");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "https://chat.example.com"

            [agent]
            id = "agent-7"
            display_name = "Ana"

            [reconnect]
            base_delay_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.url, "https://chat.example.com");
        assert_eq!(config.agent.id, "agent-7");
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn policy_converts_units() {
        let config = Config::default();
        let policy = config.policy();
        assert_eq!(policy.base_delay, Duration::from_secs(3));
        assert_eq!(policy.initial_load_delay, Duration::from_millis(500));
        assert_eq!(policy.heartbeat_interval, Duration::from_secs(30));
    }
}
