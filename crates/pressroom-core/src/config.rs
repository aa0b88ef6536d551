//! Configuration management for pressroom.
//!
//! Loads configuration from ${PRESSROOM_HOME}/config.toml with sensible
//! defaults. Secrets can be supplied through the environment instead of the
//! file (`PRESSROOM_BOT_TOKEN`, `PRESSROOM_REWRITE_API_KEY`).

use std::fs;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Telegram bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token for the Telegram API.
    pub bot_token: Option<String>,
    /// Allowlist of numeric operator (admin) user IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_ids: Vec<i64>,
    /// Target channel for publication.
    pub channel_id: Option<i64>,
}

/// AI-rewrite service configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub rewrite: RewriteConfig,
}

impl Config {
    /// Loads the config file, or defaults when it does not exist yet.
    pub fn load() -> Result<Self> {
        let path = paths::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

pub mod paths {
    //! Path resolution for pressroom configuration and data.
    //!
    //! PRESSROOM_HOME resolution order:
    //! 1. PRESSROOM_HOME environment variable (if set)
    //! 2. ~/.config/pressroom (default)

    use std::path::PathBuf;

    /// Returns the pressroom home directory.
    pub fn pressroom_home() -> PathBuf {
        if let Ok(home) = std::env::var("PRESSROOM_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("pressroom"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        pressroom_home().join("config.toml")
    }

    /// Returns the path to the persistent record store.
    pub fn store_path() -> PathBuf {
        pressroom_home().join("records.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_empty_allowlist() {
        let config = Config::default();
        assert!(config.telegram.bot_token.is_none());
        assert!(config.telegram.operator_ids.is_empty());
        assert!(config.telegram.channel_id.is_none());
    }

    #[test]
    fn test_config_parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            operator_ids = [1, 2]
            channel_id = -100123

            [rewrite]
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        assert_eq!(config.telegram.operator_ids, vec![1, 2]);
        assert_eq!(config.telegram.channel_id, Some(-100123));
        assert_eq!(config.rewrite.model, "gpt-4o");
        // Unset sections keep their defaults.
        assert_eq!(config.rewrite.base_url, "https://api.openai.com/v1");
    }
}
