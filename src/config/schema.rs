//! Configuration schema for rbup
//!
//! Configuration is stored at `~/.config/rbup/config.toml`. Everything
//! has a default, so self-hosted runners only write a config when
//! their layout differs from the hosted images.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Runtime installation settings
    pub install: InstallConfig,

    /// Dependency cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Runtime installation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Persistent tool cache root; `$RUNNER_TOOL_CACHE` when unset
    pub tool_cache_dir: Option<PathBuf>,

    /// Directory for engines the tool cache does not apply to;
    /// `~/.rubies` when unset
    pub rubies_dir: Option<PathBuf>,
}

impl InstallConfig {
    /// Effective rubies directory
    pub fn rubies_dir(&self) -> PathBuf {
        self.rubies_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".rubies")
        })
    }
}

/// Dependency cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether bundler caching is on at all
    pub enabled: bool,

    /// Store directory; `$RBUP_CACHE_DIR`, then the user cache dir,
    /// when unset
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Effective store directory
    pub fn store_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.dir {
            return dir.clone();
        }
        if let Some(dir) = std::env::var_os("RBUP_CACHE_DIR") {
            return PathBuf::from(dir);
        }
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbup")
            .join("bundler")
    }
}
