//! Initialize the configuration directory: create ~/.aura and a default config file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Create the config directory and default config if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out if missing; an existing file is left alone.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let body = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, body)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_defaults_once() {
        let dir = std::env::temp_dir().join(format!("aura-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");
        let created = init_config_dir(&path).unwrap();
        assert_eq!(created, dir.join("nested"));

        let (config, _) = config::load_config(Some(path.clone())).unwrap();
        assert_eq!(config.transport.max_reconnect_attempts, 5);

        std::fs::write(&path, r#"{"server":{"baseUrl":"http://keep.me"}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = config::load_config(Some(path)).unwrap();
        assert_eq!(config.server.base_url, "http://keep.me");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
