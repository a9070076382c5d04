//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.aura/config.json`) and environment.
//! Every field has a default so a missing or empty file yields a working local setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend location.
    #[serde(default)]
    pub server: ServerConfig,

    /// Command deck socket heartbeat and reconnect policy.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Terminal console behaviour (streaming code display, boot sequence).
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Backend REST base URL and optional explicit WebSocket URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// REST base URL (default "http://127.0.0.1:8000"). Overridden by AURA_API_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// WebSocket base URL. When absent it is derived from `base_url` (http → ws, https → wss).
    #[serde(default)]
    pub ws_url: Option<String>,
}

/// Heartbeat and reconnect settings for the command deck socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Interval between `ping` frames while connected (default 30000).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// First reconnect delay; attempt n waits base × 2^(n−1) (default 1000).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect attempts before giving up (default 5).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Characters revealed per tick by the streaming code renderer (default 5).
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: usize,

    /// Streaming renderer tick in milliseconds (default 10).
    #[serde(default = "default_stream_tick_ms")]
    pub stream_tick_ms: u64,

    /// Skip the scripted boot sequence in the interactive deck.
    #[serde(default)]
    pub skip_boot: bool,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_stream_chunk_size() -> usize {
    5
}

fn default_stream_tick_ms() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            stream_chunk_size: default_stream_chunk_size(),
            stream_tick_ms: default_stream_tick_ms(),
            skip_boot: false,
        }
    }
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

impl ConsoleConfig {
    pub fn stream_tick(&self) -> Duration {
        Duration::from_millis(self.stream_tick_ms.max(1))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the REST base URL: env AURA_API_URL overrides config. Trailing slashes are removed.
pub fn resolve_api_url(config: &Config) -> String {
    non_empty_env("AURA_API_URL")
        .unwrap_or_else(|| config.server.base_url.trim().to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve the WebSocket base URL: explicit `server.wsUrl`, else derived from the REST base.
pub fn resolve_ws_url(config: &Config) -> String {
    if let Some(ws) = config
        .server
        .ws_url
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return ws.trim_end_matches('/').to_string();
    }
    derive_ws_url(&resolve_api_url(config))
}

/// Map an http(s) base URL to its ws(s) counterpart. Other schemes are returned unchanged.
pub fn derive_ws_url(api_url: &str) -> String {
    let api_url = api_url.trim_end_matches('/');
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    }
}

fn aura_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".aura"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("AURA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| aura_dir().join("config.json"))
}

/// Resolve the stored-session path from env or default (`~/.aura/session.json`).
pub fn default_session_path() -> PathBuf {
    std::env::var("AURA_SESSION_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| aura_dir().join("session.json"))
}

/// Load config from the given path, or the default path (or AURA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Directory holding the config file (the config file's parent, or ".").
pub fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(c.transport.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(c.transport.max_reconnect_attempts, 5);
        assert_eq!(c.console.stream_chunk_size, 5);
    }

    #[test]
    fn empty_json_object_parses_to_defaults() {
        let c: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(c.transport.reconnect_base_delay_ms, 1000);
        assert!(c.server.ws_url.is_none());
    }

    #[test]
    fn camel_case_fields_are_read() {
        let c: Config = serde_json::from_str(
            r#"{"server":{"baseUrl":"https://aura.example.com/"},"transport":{"maxReconnectAttempts":2}}"#,
        )
        .unwrap();
        assert_eq!(c.server.base_url, "https://aura.example.com/");
        assert_eq!(c.transport.max_reconnect_attempts, 2);
        assert_eq!(c.transport.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn ws_url_derives_from_base() {
        assert_eq!(derive_ws_url("http://127.0.0.1:8000"), "ws://127.0.0.1:8000");
        assert_eq!(derive_ws_url("https://aura.example.com/"), "wss://aura.example.com");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let mut c = Config::default();
        c.server.ws_url = Some("wss://socket.example.com/".to_string());
        assert_eq!(resolve_ws_url(&c), "wss://socket.example.com");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("aura-config-test-does-not-exist.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.transport.max_reconnect_attempts, 5);
    }
}
