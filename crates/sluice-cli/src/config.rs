//! `sluice.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE: &str = "sluice.toml";

/// Project configuration; every field is optional in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    /// Source root
    pub src: PathBuf,
    /// Output directory
    pub out: PathBuf,
    /// Quiet period before `monaco.d.ts` is regenerated, in milliseconds
    pub debounce_ms: u64,
    /// Quiet period collecting watch events into one rebuild, in milliseconds
    pub read_delay_ms: u64,
    /// Skip the rewrite stage in build mode
    pub disable_mangle: bool,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src"),
            out: PathBuf::from("out"),
            debounce_ms: 20,
            read_delay_ms: 200,
            disable_mangle: false,
        }
    }
}

impl SluiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms)
    }
}
