use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use rxminer_stratum::{PoolConfig, StratumConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

static CONFIG_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Contents of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    pub pool: PoolConfig,

    #[serde(default)]
    pub stratum: StratumConfig,
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    CONFIG_PATH.get().cloned().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rxminer")
            .join("config.toml")
    })
}

/// Set custom config path
pub fn set_config_path(path: &str) {
    let _ = CONFIG_PATH.set(PathBuf::from(path));
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

/// Load configuration from the active config path
pub fn load_config() -> Result<MinerConfig> {
    let config_path = get_config_path();

    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found at {}. Pass --url and --login or create one.",
            config_path.display()
        ));
    }

    load_config_from(&config_path)
}

pub fn load_config_from(path: &Path) -> Result<MinerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: MinerConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    // Reject a bad URL at load time rather than at connect time
    config.pool.parse_url()?;

    Ok(config)
}
