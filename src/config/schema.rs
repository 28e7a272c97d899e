//! Configuration schema for zappy-ai.toml.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Game server host.
    pub host: String,

    /// Game server port.
    pub port: u16,

    /// Team name. Also the seed of the broadcast key.
    pub team: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pause between two ticks of the agent loop.
    pub tick_interval_ms: u64,

    /// Attempts for the initial connect before giving up.
    pub connect_retries: u32,

    /// Delay between two connect attempts.
    pub connect_delay_secs: u64,

    /// Extra reply lines an incantation may take before we give up on it.
    pub incantation_wait_limit: u32,

    /// Ticks spent calling teammates before a group incantation is abandoned.
    pub rally_poll_limit: u32,

    /// Chance of re-broadcasting a foreign message unmodified.
    pub relay_probability: f64,

    /// Maximum child processes this agent may spawn.
    pub max_children: u32,

    /// Ticks between two reproduction attempts by the Elder.
    pub fork_interval_ticks: u64,

    /// JSON elevation table. Empty means the built-in table.
    pub elevation_table_path: String,

    /// Per-reply timeout. Zero waits forever.
    pub reply_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4242,
            team: String::new(),
            log_level: "info".into(),
            tick_interval_ms: 500,
            connect_retries: 3,
            connect_delay_secs: 5,
            incantation_wait_limit: 5,
            rally_poll_limit: 10,
            relay_probability: 0.0,
            max_children: 3,
            fork_interval_ticks: 120,
            elevation_table_path: String::new(),
            reply_timeout_ms: 0,
        }
    }
}

impl AgentConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }

    /// Resolved elevation table path, with `~` expanded.
    pub fn resolved_elevation_table(&self) -> Option<PathBuf> {
        if self.elevation_table_path.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(
            shellexpand::tilde(&self.elevation_table_path).into_owned(),
        ))
    }
}
