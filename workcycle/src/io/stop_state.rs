//! Last block reason of the turn-boundary check, persisted per agent.
//!
//! The check would otherwise block on the same condition at every turn
//! boundary. Remembering the last reason lets an unchanged condition pass.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::atomic::write_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopState {
    pub last_reason: String,
}

/// Per-agent state file under `dir`, e.g. `gt-signal-stop-gastown_polecats_nux.json`.
pub fn stop_state_path(dir: &Path, address: &str) -> PathBuf {
    let safe = address.replace('/', "_");
    dir.join(format!("gt-signal-stop-{safe}.json"))
}

/// Load stop state. Missing or unreadable state counts as none.
pub fn load_stop_state(path: &Path) -> Option<StopState> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable stop state");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "malformed stop state");
            None
        }
    }
}

/// Atomically write stop state to disk.
pub fn write_stop_state(path: &Path, state: &StopState) -> Result<()> {
    debug!(path = %path.display(), "writing stop state");
    let buf = serde_json::to_string(state).context("serialize stop state")?;
    write_atomic(path, &buf)
}

/// Remove stop state so the next condition blocks again.
pub fn clear_stop_state(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove stop state {}", path.display())),
    }
}
