//! JSON-file ledger for offline runs and fixtures.
//!
//! The file holds `{"items": [...]}` where each entry is a full item record.
//! Every mutation rewrites the file atomically.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{ItemDetail, ItemStatus, ItemSummary, ListFilter};
use crate::io::atomic::write_atomic;
use crate::io::ledger::Ledger;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerFile {
    #[serde(default)]
    pub items: Vec<ItemDetail>,
}

/// Ledger stored in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `items` as the full ledger contents.
    pub fn create(path: impl Into<PathBuf>, items: Vec<ItemDetail>) -> Result<Self> {
        let ledger = Self::new(path);
        ledger.store(&LedgerFile { items })?;
        Ok(ledger)
    }

    pub fn load(&self) -> Result<LedgerFile> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read ledger {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parse ledger {}", self.path.display()))
    }

    fn store(&self, file: &LedgerFile) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(file)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    fn update<F>(&self, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ItemDetail),
    {
        let mut file = self.load()?;
        let item = file
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| anyhow!("ledger item not found: {id}"))?;
        mutate(item);
        self.store(&file)
    }
}

impl Ledger for FileLedger {
    fn show(&self, id: &str) -> Result<ItemDetail> {
        self.load()?
            .items
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| anyhow!("ledger item not found: {id}"))
    }

    fn show_multiple(&self, ids: &[String]) -> Result<HashMap<String, ItemDetail>> {
        Ok(self
            .load()?
            .items
            .into_iter()
            .filter(|item| ids.contains(&item.id))
            .map(|item| (item.id.clone(), item))
            .collect())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ItemSummary>> {
        Ok(self
            .load()?
            .items
            .iter()
            .map(ItemDetail::summary)
            .filter(|item| filter.matches(item))
            .collect())
    }

    fn close(&self, ids: &[String]) -> Result<()> {
        let mut file = self.load()?;
        for id in ids {
            let item = file
                .items
                .iter_mut()
                .find(|item| &item.id == id)
                .ok_or_else(|| anyhow!("ledger item not found: {id}"))?;
            item.status = ItemStatus::Closed;
        }
        debug!(count = ids.len(), "closed items");
        self.store(&file)
    }

    fn add_label(&self, id: &str, label: &str) -> Result<()> {
        self.update(id, |item| {
            if !item.labels.iter().any(|existing| existing == label) {
                item.labels.push(label.to_string());
            }
        })
    }

    fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        self.update(id, |item| item.labels.retain(|existing| existing != label))
    }
}
