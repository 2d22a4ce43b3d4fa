//! Test-only fakes and builders for ledger items and protocol collaborators.
//!
//! Every fake records what was asked of it so tests can assert on side
//! effects. State lives behind `Mutex` so fakes can be shared with the
//! threaded turn-boundary check.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};

use crate::core::types::{Dependency, ItemDetail, ItemStatus, ItemSummary, ListFilter};
use crate::io::git::Workspace;
use crate::io::hooks::{Inbox, Integrator, MailMessage, MergeQueue, Notifier};
use crate::io::ledger::Ledger;
use crate::io::session::Sessions;

/// Create an open molecule step `<molecule>.<n>` with no edges.
pub fn step(molecule: &str, n: u32) -> ItemDetail {
    step_with_deps(molecule, n, &[])
}

/// Create an open molecule step with `blocks` edges to the given siblings.
pub fn step_with_deps(molecule: &str, n: u32, blocked_by: &[u32]) -> ItemDetail {
    let deps = blocked_by
        .iter()
        .map(|dep| Dependency::new(format!("{molecule}.{dep}"), "blocks"))
        .collect();
    let mut item = ItemDetail::new(
        format!("{molecule}.{n}"),
        ItemStatus::Open,
        Some(molecule),
        deps,
    );
    item.title = format!("step {n}");
    item
}

/// Create a standalone work item.
pub fn issue(id: &str, status: ItemStatus) -> ItemDetail {
    ItemDetail::new(id, status, None, Vec::new())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A recorded ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    AddLabel { id: String, label: String },
    RemoveLabel { id: String, label: String },
    Close { ids: Vec<String> },
}

/// In-memory [`Ledger`] that records every mutation.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    items: Mutex<Vec<ItemDetail>>,
    ops: Mutex<Vec<LedgerOp>>,
    /// Ids that `show_multiple` pretends not to know.
    hidden_from_show: Mutex<Vec<String>>,
    fail_list: Mutex<bool>,
    close_failures: Mutex<u32>,
}

impl MemoryLedger {
    pub fn new(items: Vec<ItemDetail>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    pub fn item(&self, id: &str) -> Option<ItemDetail> {
        lock(&self.items).iter().find(|item| item.id == id).cloned()
    }

    pub fn labels(&self, id: &str) -> Vec<String> {
        self.item(id).map(|item| item.labels).unwrap_or_default()
    }

    pub fn set_labels(&self, id: &str, labels: &[&str]) {
        if let Some(item) = lock(&self.items).iter_mut().find(|item| item.id == id) {
            item.labels = labels.iter().map(|l| (*l).to_string()).collect();
        }
    }

    pub fn set_status(&self, id: &str, status: ItemStatus) {
        if let Some(item) = lock(&self.items).iter_mut().find(|item| item.id == id) {
            item.status = status;
        }
    }

    pub fn hide_from_show(&self, id: &str) {
        lock(&self.hidden_from_show).push(id.to_string());
    }

    pub fn fail_list(&self) {
        *lock(&self.fail_list) = true;
    }

    /// Make the next `close` call fail without changing anything.
    pub fn fail_close_once(&self) {
        *lock(&self.close_failures) += 1;
    }

    pub fn ops(&self) -> Vec<LedgerOp> {
        lock(&self.ops).clone()
    }

    /// Labels added, in order.
    pub fn added_labels(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                LedgerOp::AddLabel { label, .. } => Some(label),
                _ => None,
            })
            .collect()
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                LedgerOp::Close { ids } => Some(ids),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn with_item<F>(&self, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ItemDetail),
    {
        let mut items = lock(&self.items);
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| anyhow!("ledger item not found: {id}"))?;
        mutate(item);
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    fn show(&self, id: &str) -> Result<ItemDetail> {
        self.item(id)
            .ok_or_else(|| anyhow!("ledger item not found: {id}"))
    }

    fn show_multiple(&self, ids: &[String]) -> Result<HashMap<String, ItemDetail>> {
        let hidden = lock(&self.hidden_from_show).clone();
        Ok(lock(&self.items)
            .iter()
            .filter(|item| ids.contains(&item.id) && !hidden.contains(&item.id))
            .map(|item| (item.id.clone(), item.clone()))
            .collect())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ItemSummary>> {
        if *lock(&self.fail_list) {
            bail!("ledger unavailable");
        }
        Ok(lock(&self.items)
            .iter()
            .map(ItemDetail::summary)
            .filter(|item| filter.matches(item))
            .collect())
    }

    fn close(&self, ids: &[String]) -> Result<()> {
        {
            let mut failures = lock(&self.close_failures);
            if *failures > 0 {
                *failures -= 1;
                bail!("ledger close unavailable");
            }
        }
        for id in ids {
            self.with_item(id, |item| item.status = ItemStatus::Closed)?;
        }
        lock(&self.ops).push(LedgerOp::Close { ids: ids.to_vec() });
        Ok(())
    }

    fn add_label(&self, id: &str, label: &str) -> Result<()> {
        self.with_item(id, |item| {
            if !item.labels.iter().any(|existing| existing == label) {
                item.labels.push(label.to_string());
            }
        })?;
        lock(&self.ops).push(LedgerOp::AddLabel {
            id: id.to_string(),
            label: label.to_string(),
        });
        Ok(())
    }

    fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        self.with_item(id, |item| item.labels.retain(|existing| existing != label))?;
        lock(&self.ops).push(LedgerOp::RemoveLabel {
            id: id.to_string(),
            label: label.to_string(),
        });
        Ok(())
    }
}

/// Scripted [`Workspace`].
#[derive(Debug, Default)]
pub struct ScriptedWorkspace {
    branch: Option<String>,
    fail_push: bool,
    fail_teardown: bool,
    pushes: Mutex<Vec<(String, String)>>,
    teardowns: Mutex<Vec<String>>,
}

impl ScriptedWorkspace {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            branch: Some(branch.to_string()),
            ..Self::default()
        }
    }

    /// A workspace that has already been removed.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    /// `(source, dest)` pairs pushed.
    pub fn pushes(&self) -> Vec<(String, String)> {
        lock(&self.pushes).clone()
    }

    pub fn teardowns(&self) -> Vec<String> {
        lock(&self.teardowns).clone()
    }
}

impl Workspace for ScriptedWorkspace {
    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.branch.clone())
    }

    fn push(&self, source: &str, dest: &str) -> Result<()> {
        if self.fail_push {
            bail!("push rejected: remote unreachable");
        }
        lock(&self.pushes).push((source.to_string(), dest.to_string()));
        Ok(())
    }

    fn teardown(&self, branch: &str) -> Result<()> {
        if self.fail_teardown {
            bail!("branch {branch} not found on remote");
        }
        lock(&self.teardowns).push(branch.to_string());
        Ok(())
    }
}

/// A notification that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Scripted [`MergeQueue`], [`Integrator`] and [`Notifier`].
#[derive(Debug, Default)]
pub struct ScriptedHooks {
    request_id: String,
    fail_submit: bool,
    fail_merge: bool,
    fail_notify: bool,
    submissions: Mutex<Vec<(String, String)>>,
    merges: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<SentNotice>>,
}

impl ScriptedHooks {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            ..Self::default()
        }
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    pub fn failing_merge(mut self) -> Self {
        self.fail_merge = true;
        self
    }

    pub fn failing_notify(mut self) -> Self {
        self.fail_notify = true;
        self
    }

    /// `(item_id, branch)` pairs submitted.
    pub fn submissions(&self) -> Vec<(String, String)> {
        lock(&self.submissions).clone()
    }

    /// `(branch, target)` pairs merged.
    pub fn merges(&self) -> Vec<(String, String)> {
        lock(&self.merges).clone()
    }

    pub fn notices(&self) -> Vec<SentNotice> {
        lock(&self.notices).clone()
    }
}

impl MergeQueue for ScriptedHooks {
    fn submit(&self, item_id: &str, branch: &str) -> Result<String> {
        if self.fail_submit {
            bail!("merge queue unavailable");
        }
        lock(&self.submissions).push((item_id.to_string(), branch.to_string()));
        Ok(self.request_id.clone())
    }
}

impl Integrator for ScriptedHooks {
    fn merge(&self, branch: &str, target: &str) -> Result<()> {
        if self.fail_merge {
            bail!("merge conflict");
        }
        lock(&self.merges).push((branch.to_string(), target.to_string()));
        Ok(())
    }
}

impl Notifier for ScriptedHooks {
    fn notify(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail_notify {
            bail!("mail delivery failed");
        }
        lock(&self.notices).push(SentNotice {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Scripted [`Inbox`] with a fixed message list.
#[derive(Debug, Default)]
pub struct ScriptedInbox {
    messages: Vec<MailMessage>,
    fail: bool,
}

impl ScriptedInbox {
    pub fn with_messages(messages: Vec<MailMessage>) -> Self {
        Self {
            messages,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            messages: Vec::new(),
            fail: true,
        }
    }
}

impl Inbox for ScriptedInbox {
    fn unread(&self, _address: &str) -> Result<Vec<MailMessage>> {
        if self.fail {
            bail!("mailbox unavailable");
        }
        Ok(self.messages.iter().filter(|m| !m.read).cloned().collect())
    }
}

/// Build an unread message.
pub fn mail(from: &str, subject: &str) -> MailMessage {
    MailMessage {
        id: String::new(),
        from: from.to_string(),
        subject: subject.to_string(),
        read: false,
    }
}

/// Recording [`Sessions`].
#[derive(Debug, Default)]
pub struct RecordingSessions {
    killed: Mutex<Vec<String>>,
    kill_failures: Mutex<u32>,
}

impl RecordingSessions {
    /// Sessions whose first `kill` call fails.
    pub fn failing_once() -> Self {
        Self {
            kill_failures: Mutex::new(1),
            ..Self::default()
        }
    }

    /// Sessions killed successfully, in order.
    pub fn killed(&self) -> Vec<String> {
        lock(&self.killed).clone()
    }
}

impl Sessions for RecordingSessions {
    fn kill(&self, session: &str) -> Result<()> {
        {
            let mut failures = lock(&self.kill_failures);
            if *failures > 0 {
                *failures -= 1;
                bail!("tmux server not responding");
            }
        }
        lock(&self.killed).push(session.to_string());
        Ok(())
    }
}
