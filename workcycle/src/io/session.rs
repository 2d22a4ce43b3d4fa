//! Worker session control.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::io::process::{CommandLimits, run_command_with_timeout};

/// Terminal multiplexer sessions hosting workers.
pub trait Sessions {
    /// Kill `session`. Killing a session that no longer exists is not an error.
    fn kill(&self, session: &str) -> Result<()>;
}

/// [`Sessions`] over tmux.
#[derive(Debug, Clone)]
pub struct TmuxSessions {
    limits: CommandLimits,
}

impl TmuxSessions {
    pub fn new(limits: CommandLimits) -> Self {
        Self { limits }
    }
}

impl Sessions for TmuxSessions {
    #[instrument(skip_all, fields(session))]
    fn kill(&self, session: &str) -> Result<()> {
        let mut cmd = std::process::Command::new("tmux");
        cmd.args(["kill-session", "-t", &format!("={session}")]);
        let output =
            run_command_with_timeout(cmd, None, self.limits.timeout, self.limits.output_limit_bytes)?;
        if output.success() {
            info!(session, "session killed");
            return Ok(());
        }
        let stderr = output.stderr_summary();
        if is_missing_session(&stderr) {
            info!(session, "session already gone");
            return Ok(());
        }
        bail!("tmux kill-session {session} failed: {stderr}");
    }
}

fn is_missing_session(stderr: &str) -> bool {
    stderr.contains("can't find session")
        || stderr.contains("no server running")
        || stderr.contains("session not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_missing_session_errors() {
        assert!(is_missing_session("can't find session: gt-gastown-nux"));
        assert!(is_missing_session("no server running on /tmp/tmux-0/default"));
        assert!(!is_missing_session("permission denied"));
    }
}
