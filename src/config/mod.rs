pub mod schema;

pub use schema::AgentConfig;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Default config location (~/.zappy-ai/config.toml).
pub fn default_config_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".zappy-ai"))
        .unwrap_or_else(|| PathBuf::from(".zappy-ai"))
        .join("config.toml")
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agent config file")?;
        let config: AgentConfig =
            toml::from_str(&contents).context("Failed to parse agent config (TOML)")?;
        Ok(config)
    } else {
        Ok(AgentConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &AgentConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Reject configs the agent cannot start with.
pub fn validate(config: &AgentConfig) -> Result<()> {
    if config.team.trim().is_empty() {
        bail!("team name is required (-n/--name or `team` in the config file)");
    }
    if config.port == 0 {
        bail!("port must be non-zero");
    }
    if !(0.0..=1.0).contains(&config.relay_probability) {
        bail!(
            "relay_probability must lie in [0, 1], got {}",
            config.relay_probability
        );
    }
    Ok(())
}
