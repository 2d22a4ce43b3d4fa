//! Shared deterministic types for lifecycle core logic.
//!
//! These types define stable contracts between the ledger adapters and the
//! pure core. Two record shapes exist on purpose: [`ItemSummary`] is what a
//! list-style fetch returns and carries no dependency edges, while
//! [`ItemDetail`] is what an item-detail fetch returns and always carries the
//! full edge set. Readiness decisions only ever accept `ItemDetail`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ledger status of a work item.
///
/// The ledger's status vocabulary is open-ended; statuses this crate does not
/// act on collapse into [`ItemStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Open,
    InProgress,
    Closed,
    Hooked,
    Pinned,
    #[serde(other)]
    Other,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Closed => "closed",
            ItemStatus::Hooked => "hooked",
            ItemStatus::Pinned => "pinned",
            ItemStatus::Other => "other",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional dependency edge: the owning item depends on `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Target item id.
    pub id: String,
    /// Denormalized target title, display only.
    #[serde(default)]
    pub title: String,
    /// Open-ended edge type; see [`crate::core::deps::is_blocking`].
    #[serde(default)]
    pub dependency_type: String,
}

impl Dependency {
    pub fn new(id: impl Into<String>, dependency_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            dependency_type: dependency_type.into(),
        }
    }
}

/// Work item as returned by a list-style fetch. Carries no dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
}

/// Work item as returned by an item-detail fetch, with full dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl ItemDetail {
    /// Build a detail record. `dependencies` is the complete edge set.
    pub fn new(
        id: impl Into<String>,
        status: ItemStatus,
        parent: Option<&str>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            status,
            issue_type: "task".to_string(),
            parent: parent.map(str::to_string),
            assignee: None,
            description: String::new(),
            labels: Vec::new(),
            dependencies,
        }
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            issue_type: self.issue_type.clone(),
            parent: self.parent.clone(),
            assignee: self.assignee.clone(),
        }
    }
}

/// Filter for list-style fetches. `None` fields match everything, except
/// that without a status the ledger hides closed items unless
/// `all_statuses` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub parent: Option<String>,
    pub status: Option<ItemStatus>,
    pub assignee: Option<String>,
    /// Include closed items when no `status` is given.
    pub all_statuses: bool,
}

impl ListFilter {
    /// Every child of `parent`, closed ones included.
    pub fn children_of(parent: &str) -> Self {
        Self {
            parent: Some(parent.to_string()),
            all_statuses: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, item: &ItemSummary) -> bool {
        if let Some(parent) = &self.parent
            && item.parent.as_deref() != Some(parent.as_str())
        {
            return false;
        }
        match self.status {
            Some(status) if item.status != status => return false,
            None if !self.all_statuses && item.status == ItemStatus::Closed => return false,
            _ => {}
        }
        if let Some(assignee) = &self.assignee
            && item.assignee.as_deref() != Some(assignee.as_str())
        {
            return false;
        }
        true
    }
}

/// Terminal exit path chosen by a completing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitType {
    Completed,
    Escalated,
    Deferred,
    PhaseComplete,
}

impl ExitType {
    pub const ALL: [ExitType; 4] = [
        ExitType::Completed,
        ExitType::Escalated,
        ExitType::Deferred,
        ExitType::PhaseComplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExitType::Completed => "COMPLETED",
            ExitType::Escalated => "ESCALATED",
            ExitType::Deferred => "DEFERRED",
            ExitType::PhaseComplete => "PHASE_COMPLETE",
        }
    }
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExitType::ALL
            .into_iter()
            .find(|exit| exit.as_str() == s)
            .ok_or_else(|| {
                format!("unknown exit type '{s}' (expected COMPLETED, ESCALATED, DEFERRED or PHASE_COMPLETE)")
            })
    }
}
