//! Workcycle configuration stored under `.workcycle/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".workcycle/config.toml";

/// Workcycle configuration (TOML).
///
/// Only static wiring lives here: where collaborators are and how long they
/// may run. Per-invocation inputs (exit type, actor, merge policy) are passed
/// to the protocol explicitly. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkcycleConfig {
    /// Git remote the push stage targets.
    pub remote: String,

    /// Integration branch for the `direct` strategy.
    pub default_branch: String,

    /// Wall-clock budget for any single external command.
    pub command_timeout_secs: u64,

    /// Captured stdout/stderr per command is truncated beyond this many bytes.
    pub output_limit_bytes: usize,

    pub ledger: LedgerConfig,
    pub hooks: HooksConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Issue-ledger CLI argv prefix (e.g. `["bd"]`).
    pub command: Vec<String>,
}

/// Argv prefixes for the external collaborators of the completion protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HooksConfig {
    pub merge_request: Vec<String>,
    pub integrate: Vec<String>,
    pub notify: Vec<String>,
    pub inbox: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Worker session names are `<prefix>-<rig>-<name>`.
    pub prefix: String,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            command: argv(&["bd"]),
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            merge_request: argv(&["gt", "mq", "submit"]),
            integrate: argv(&["gt", "dolt", "merge"]),
            notify: argv(&["gt", "mail", "send"]),
            inbox: argv(&["gt", "mail", "inbox", "--json"]),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prefix: "gt".to_string(),
        }
    }
}

impl Default for WorkcycleConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            default_branch: "main".to_string(),
            command_timeout_secs: 120,
            output_limit_bytes: 100_000,
            ledger: LedgerConfig::default(),
            hooks: HooksConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl WorkcycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.remote.trim().is_empty() {
            return Err(anyhow!("remote must be non-empty"));
        }
        if self.default_branch.trim().is_empty() {
            return Err(anyhow!("default_branch must be non-empty"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.session.prefix.trim().is_empty() {
            return Err(anyhow!("session.prefix must be non-empty"));
        }
        let commands = [
            ("ledger.command", &self.ledger.command),
            ("hooks.merge_request", &self.hooks.merge_request),
            ("hooks.integrate", &self.hooks.integrate),
            ("hooks.notify", &self.hooks.notify),
            ("hooks.inbox", &self.hooks.inbox),
        ];
        for (name, command) in commands {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(anyhow!("{name} must be a non-empty array"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WorkcycleConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkcycleConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = WorkcycleConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkcycleConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
