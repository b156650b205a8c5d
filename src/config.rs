//! Configuration loading and persistence.
//!
//! Settings live in `config.toml` under the config directory
//! (`$STICKERBOOK_CONFIG_DIR`, else `~/.stickerbook`). Credentials may come
//! from the file or from the environment (`MATRIX_ACCESS_TOKEN`,
//! `ANTHROPIC_API_KEY`); the environment wins when both are set. The sync
//! checkpoint is written back into the same file, atomically, so a restart
//! resumes where the last run stopped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StickerbookError};

pub const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_DIR_ENV: &str = "STICKERBOOK_CONFIG_DIR";

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_MAX_TOKENS: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub homeserver: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub access_token: String,
    /// Sync checkpoint; absent on first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_batch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where collection.json and packs.json live; defaults to
    /// `<config-dir>/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Resolve the config directory: CLI override, then the environment
/// variable, then `~/.stickerbook`.
pub fn config_dir(cli_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = cli_override {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".stickerbook"))
        .ok_or_else(|| StickerbookError::Config("cannot determine home directory".to_string()))
}

impl Config {
    /// Load from `config.toml`, then layer environment credentials on top.
    /// A missing file yields defaults so `check` can report what is absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)
                .map_err(|e| StickerbookError::Config(format!("{}: {e}", path.display())))?
        } else {
            Config::default()
        };

        if let Ok(token) = std::env::var("MATRIX_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.matrix.access_token = token;
            }
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                config.anthropic.api_key = key;
            }
        }

        Ok(config)
    }

    /// Write the config back atomically (temp file then rename) so a crash
    /// mid-write never corrupts the checkpoint.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| StickerbookError::Config(format!("serializing config: {e}")))?;

        let path = dir.join(CONFIG_FILE);
        let tmp = dir.join(format!("{CONFIG_FILE}.tmp"));
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn data_dir(&self, config_dir: &Path) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("data"))
    }

    /// Everything the `run` subcommand needs before it will start.
    pub fn validate_for_run(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.matrix.homeserver.is_empty() {
            missing.push("matrix.homeserver");
        }
        if self.matrix.user_id.is_empty() {
            missing.push("matrix.user_id");
        }
        if self.matrix.access_token.is_empty() {
            missing.push("matrix.access_token (or MATRIX_ACCESS_TOKEN)");
        }
        if self.anthropic.api_key.is_empty() {
            missing.push("anthropic.api_key (or ANTHROPIC_API_KEY)");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StickerbookError::Config(format!(
                "missing configuration: {}",
                missing.join(", ")
            )))
        }
    }
}
