use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::sync::SyncTuning;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Defaults to `<data dir>/mirra.db`.
    pub database_path: Option<PathBuf>,
    pub llm: LlmConfig,
    pub sync: SyncTuning,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable the API key is read from; never stored in the
    /// config file itself.
    pub api_key_env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 18790,
            database_path: None,
            llm: LlmConfig::default(),
            sync: SyncTuning::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "MIRRA_API_KEY".to_string(),
        }
    }
}

impl AppConfig {
    /// Read `config.toml` from the given path or the data dir; a missing
    /// file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir().join("config.toml"));
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("mirra.db"))
    }

    pub fn api_key(&self) -> String {
        std::env::var(&self.llm.api_key_env).unwrap_or_default()
    }
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("mirra"))
        .unwrap_or_else(|| PathBuf::from(".mirra"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: AppConfig = toml::from_str("api_port = 9000").expect("parse");
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.sync.cooldown_ms, 300_000);
        assert_eq!(config.llm.api_key_env, "MIRRA_API_KEY");
    }

    #[test]
    fn sync_tuning_overrides_parse() {
        let config: AppConfig =
            toml::from_str("[sync]\ncooldown_ms = 1000\nstale_lock_timeout_ms = 500")
                .expect("parse");
        assert_eq!(config.sync.cooldown_ms, 1000);
        assert_eq!(config.sync.stale_lock_timeout_ms, 500);
        assert_eq!(config.sync.recent_generations, 10);
    }
}
