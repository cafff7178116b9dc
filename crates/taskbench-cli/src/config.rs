//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$TASKBENCH_CONFIG` environment variable
//! 2. `~/.config/taskbench/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use taskbench_core::ProviderSelection;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub run: RunSettings,
    pub dataset: DatasetConfig,
}

/// How to launch the agent under test.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Executable speaking the JSON request/response protocol on stdio.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Label recorded in snapshots.
    pub name: String,
    pub model: String,
    /// Wall-clock bound per buffered call. 0 disables it.
    pub timeout_secs: u64,
    /// System instructions sent ahead of every task.
    pub instructions: Option<String>,
    /// Provider key per slot (search, sandbox, browser, memory).
    pub providers: BTreeMap<String, String>,
}

/// Run pacing and output.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Results directory. Default: platform-specific data dir.
    pub output_dir: Option<String>,
    pub task_delay_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding `<name>.jsonl`, `<name>.json` or `<name>/metadata.jsonl`.
    pub dir: Option<String>,
}

// --- Defaults ---

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            name: "agent".into(),
            model: "unknown".into(),
            timeout_secs: 600,
            instructions: None,
            providers: BTreeMap::new(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            task_delay_ms: 1000,
            poll_interval_ms: 500,
        }
    }
}

impl AgentConfig {
    pub fn provider_selection(&self) -> Result<ProviderSelection> {
        ProviderSelection::from_pairs(
            self.providers
                .iter()
                .map(|(slot, key)| (slot.as_str(), key.as_str())),
        )
        .context("invalid [agent.providers] entry")
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TASKBENCH_CONFIG") {
        return Some(PathBuf::from(p));
    }

    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join("taskbench")
            .join("config.toml")
    })
}

/// Show the active config path (for `taskbench config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
