//! Turn-boundary check: should an agent keep working instead of going idle?
//!
//! Unread mail and slung work are checked concurrently. Mail wins when both
//! produce a reason. A reason that was already delivered once is not repeated
//! until the condition clears.

use std::path::Path;
use std::thread;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{ItemStatus, ListFilter};
use crate::io::hooks::{Inbox, MailMessage};
use crate::io::ledger::Ledger;
use crate::io::stop_state::{StopState, clear_stop_state, load_stop_state, write_stop_state};

/// Hook response printed as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopDecision {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Block,
}

impl StopDecision {
    pub fn approve() -> Self {
        Self {
            decision: Decision::Approve,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Block,
            reason: Some(reason.into()),
        }
    }
}

fn is_self_handoff(msg: &MailMessage, address: &str) -> bool {
    msg.from == address && msg.subject.contains("HANDOFF")
}

/// Block reason for unread mail, or `None`. Errors count as no mail.
pub fn check_unread_mail(inbox: &dyn Inbox, address: &str) -> Option<String> {
    let unread = match inbox.unread(address) {
        Ok(unread) => unread,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "mail check failed");
            return None;
        }
    };
    let relevant: Vec<&MailMessage> = unread
        .iter()
        .filter(|msg| !is_self_handoff(msg, address))
        .collect();
    let first = relevant.first()?;
    let mut reason = format!(
        "[signal stop] You have {} unread message(s). Most recent from {}: \"{}\"",
        relevant.len(),
        first.from,
        first.subject
    );
    if relevant.len() > 1 {
        reason.push_str(&format!(" (+{} more)", relevant.len() - 1));
    }
    reason.push_str("\n\nRead your inbox, then continue working.");
    Some(reason)
}

/// Block reason for hooked work assigned to `actor`, or `None`.
pub fn check_slung_work(ledger: &dyn Ledger, actor: &str) -> Option<String> {
    let filter = ListFilter {
        status: Some(ItemStatus::Hooked),
        assignee: Some(actor.to_string()),
        ..ListFilter::default()
    };
    let hooked = match ledger.list(&filter) {
        Ok(hooked) => hooked,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "slung work check failed");
            return None;
        }
    };
    let item = hooked.first()?;
    Some(format!(
        "[signal stop] Work slung to you: {} \"{}\"\n\nInspect the hooked item, then execute the work.",
        item.id, item.title
    ))
}

/// Run both checks in parallel and combine by fixed priority.
pub fn check_turn_boundary(
    inbox: &(dyn Inbox + Sync),
    ledger: &(dyn Ledger + Sync),
    address: &str,
) -> Option<String> {
    let (mail, work) = thread::scope(|scope| {
        let mail = scope.spawn(|| check_unread_mail(inbox, address));
        let work = scope.spawn(|| check_slung_work(ledger, address));
        (
            mail.join().unwrap_or_else(|_| {
                warn!("mail check panicked");
                None
            }),
            work.join().unwrap_or_else(|_| {
                warn!("slung work check panicked");
                None
            }),
        )
    });
    mail.or(work)
}

/// Turn a reason into a decision, suppressing repeats via the state file.
pub fn decide(reason: Option<String>, state_path: &Path) -> Result<StopDecision> {
    let Some(reason) = reason else {
        clear_stop_state(state_path)?;
        return Ok(StopDecision::approve());
    };
    if load_stop_state(state_path).is_some_and(|state| state.last_reason == reason) {
        debug!("block reason already delivered, approving");
        return Ok(StopDecision::approve());
    }
    write_stop_state(
        state_path,
        &StopState {
            last_reason: reason.clone(),
        },
    )?;
    Ok(StopDecision::block(reason))
}
