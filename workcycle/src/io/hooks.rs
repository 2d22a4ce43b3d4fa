//! External collaborators of the completion protocol.
//!
//! Merge queue submission, integration merges and mail are owned by other
//! tools. Each concern has its own trait so tests can script them
//! independently; [`CommandHooks`] implements all of them by running the
//! argv prefixes from [`HooksConfig`].

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::HooksConfig;
use crate::io::process::{CommandLimits, run_argv};

/// Submits a pushed branch for review.
pub trait MergeQueue {
    /// Returns the created request id.
    fn submit(&self, item_id: &str, branch: &str) -> Result<String>;
}

/// Merges the worker's data branch into `target`.
pub trait Integrator {
    fn merge(&self, branch: &str, target: &str) -> Result<()>;
}

/// Delivers a notification message.
pub trait Notifier {
    fn notify(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// One mailbox entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    #[serde(default)]
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub read: bool,
}

/// Read access to an agent's mailbox.
pub trait Inbox {
    /// Unread messages, in the order the mailbox reports them.
    fn unread(&self, address: &str) -> Result<Vec<MailMessage>>;
}

/// All hook traits backed by configured external commands.
#[derive(Debug, Clone)]
pub struct CommandHooks {
    config: HooksConfig,
    limits: CommandLimits,
}

impl CommandHooks {
    pub fn new(config: HooksConfig, limits: CommandLimits) -> Self {
        Self { config, limits }
    }
}

fn with_args(prefix: &[String], args: &[&str]) -> Vec<String> {
    let mut argv = prefix.to_vec();
    argv.extend(args.iter().map(|arg| (*arg).to_string()));
    argv
}

impl MergeQueue for CommandHooks {
    #[instrument(skip_all, fields(item_id, branch))]
    fn submit(&self, item_id: &str, branch: &str) -> Result<String> {
        let argv = with_args(
            &self.config.merge_request,
            &["--issue", item_id, "--branch", branch],
        );
        let out = run_argv(&argv, None, self.limits, "merge request")?;
        let request_id = parse_request_id(&out)
            .ok_or_else(|| anyhow!("merge request command printed no request id"))?;
        debug!(request_id, "merge request created");
        Ok(request_id.to_string())
    }
}

impl Integrator for CommandHooks {
    #[instrument(skip_all, fields(branch, target))]
    fn merge(&self, branch: &str, target: &str) -> Result<()> {
        let argv = with_args(&self.config.integrate, &[branch, "--into", target]);
        run_argv(&argv, None, self.limits, "integration merge")?;
        Ok(())
    }
}

impl Notifier for CommandHooks {
    #[instrument(skip_all, fields(to, subject))]
    fn notify(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let argv = with_args(&self.config.notify, &[to, "-s", subject, "--stdin"]);
        run_argv(&argv, Some(body.as_bytes()), self.limits, "notify")?;
        Ok(())
    }
}

impl Inbox for CommandHooks {
    #[instrument(skip_all, fields(address))]
    fn unread(&self, address: &str) -> Result<Vec<MailMessage>> {
        let argv = with_args(&self.config.inbox, &[address]);
        let out = run_argv(&argv, None, self.limits, "inbox")?;
        parse_unread(&out)
    }
}

/// The request id is the last non-empty line a submit command prints.
fn parse_request_id(out: &str) -> Option<&str> {
    out.lines().map(str::trim).rfind(|line| !line.is_empty())
}

fn parse_unread(out: &str) -> Result<Vec<MailMessage>> {
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    let messages: Vec<MailMessage> =
        serde_json::from_str(out).context("parse inbox output")?;
    Ok(messages.into_iter().filter(|msg| !msg.read).collect())
}
