//! Issue-ledger adapter.
//!
//! The [`Ledger`] trait is the only way orchestration code reads or mutates
//! work items. [`BdLedger`] drives the `bd` CLI in `--json` mode.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::types::{ItemDetail, ItemSummary, ListFilter};
use crate::io::process::{CommandLimits, run_argv};

/// Shared work-item ledger.
///
/// Only [`Ledger::show`] and [`Ledger::show_multiple`] return dependency
/// edges. [`Ledger::list`] returns summaries without them.
pub trait Ledger {
    fn show(&self, id: &str) -> Result<ItemDetail>;

    /// Fetch several items with full edges, keyed by id. Ids the ledger does
    /// not know are absent from the map.
    fn show_multiple(&self, ids: &[String]) -> Result<HashMap<String, ItemDetail>>;

    fn list(&self, filter: &ListFilter) -> Result<Vec<ItemSummary>>;

    fn close(&self, ids: &[String]) -> Result<()>;

    fn add_label(&self, id: &str, label: &str) -> Result<()>;

    fn remove_label(&self, id: &str, label: &str) -> Result<()>;
}

/// Ledger backed by the `bd` command line tool.
#[derive(Debug, Clone)]
pub struct BdLedger {
    command: Vec<String>,
    limits: CommandLimits,
}

impl BdLedger {
    pub fn new(command: Vec<String>, limits: CommandLimits) -> Self {
        Self { command, limits }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let mut argv = self.command.clone();
        argv.extend_from_slice(args);
        run_argv(&argv, None, self.limits, "ledger")
    }
}

impl Ledger for BdLedger {
    #[instrument(skip_all, fields(id))]
    fn show(&self, id: &str) -> Result<ItemDetail> {
        let mut found = self.show_multiple(&[id.to_string()])?;
        found
            .remove(id)
            .ok_or_else(|| anyhow!("ledger item not found: {id}"))
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    fn show_multiple(&self, ids: &[String]) -> Result<HashMap<String, ItemDetail>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let out = self.run(&show_args(ids))?;
        let details = parse_details(&out)?;
        debug!(requested = ids.len(), returned = details.len(), "fetched item details");
        Ok(details
            .into_iter()
            .map(|detail| (detail.id.clone(), detail))
            .collect())
    }

    #[instrument(skip_all)]
    fn list(&self, filter: &ListFilter) -> Result<Vec<ItemSummary>> {
        let out = self.run(&list_args(filter))?;
        parse_summaries(&out)
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    fn close(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut args = vec!["close".to_string()];
        args.extend_from_slice(ids);
        self.run(&args)?;
        Ok(())
    }

    #[instrument(skip_all, fields(id, label))]
    fn add_label(&self, id: &str, label: &str) -> Result<()> {
        self.run(&label_args("add", id, label))?;
        Ok(())
    }

    #[instrument(skip_all, fields(id, label))]
    fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        self.run(&label_args("remove", id, label))?;
        Ok(())
    }
}

fn show_args(ids: &[String]) -> Vec<String> {
    let mut args = vec!["show".to_string()];
    args.extend_from_slice(ids);
    args.push("--json".to_string());
    args
}

fn list_args(filter: &ListFilter) -> Vec<String> {
    let mut args = vec!["list".to_string()];
    if let Some(parent) = &filter.parent {
        args.push(format!("--parent={parent}"));
    }
    match filter.status {
        Some(status) => args.push(format!("--status={status}")),
        None if filter.all_statuses => args.push("--status=all".to_string()),
        None => {}
    }
    if let Some(assignee) = &filter.assignee {
        args.push(format!("--assignee={assignee}"));
    }
    args.push("--json".to_string());
    args.push("--limit=0".to_string());
    args
}

fn label_args(action: &str, id: &str, label: &str) -> Vec<String> {
    vec![
        "label".to_string(),
        action.to_string(),
        id.to_string(),
        label.to_string(),
    ]
}

/// `bd show --json` prints an array even for a single id.
fn parse_details(out: &str) -> Result<Vec<ItemDetail>> {
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(out).context("parse ledger show output")
}

fn parse_summaries(out: &str) -> Result<Vec<ItemSummary>> {
    if out.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(out).context("parse ledger list output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemStatus;

    #[test]
    fn list_args_carry_every_filter_field() {
        let filter = ListFilter {
            parent: Some("gt-mol".to_string()),
            status: Some(ItemStatus::Hooked),
            assignee: Some("gastown/polecats/nux".to_string()),
            all_statuses: false,
        };
        assert_eq!(
            list_args(&filter),
            vec![
                "list",
                "--parent=gt-mol",
                "--status=hooked",
                "--assignee=gastown/polecats/nux",
                "--json",
                "--limit=0",
            ]
        );
        assert_eq!(
            list_args(&ListFilter::default()),
            vec!["list", "--json", "--limit=0"]
        );
    }

    #[test]
    fn children_listing_includes_closed_steps() {
        assert_eq!(
            list_args(&ListFilter::children_of("gt-mol")),
            vec!["list", "--parent=gt-mol", "--status=all", "--json", "--limit=0"]
        );
    }

    #[test]
    fn show_args_batch_ids() {
        let ids = vec!["gt-a.1".to_string(), "gt-a.2".to_string()];
        assert_eq!(show_args(&ids), vec!["show", "gt-a.1", "gt-a.2", "--json"]);
    }

    #[test]
    fn list_output_drops_edges() {
        let out = r#"[{"id":"gt-a.1","title":"one","status":"open","parent":"gt-a",
            "dependencies":[{"id":"gt-a.0","dependency_type":"blocks"}]}]"#;
        let items = parse_summaries(out).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].parent.as_deref(), Some("gt-a"));
    }

    #[test]
    fn show_output_keeps_edges_and_labels() {
        let out = r#"[{"id":"gt-a.2","status":"open","labels":["done-cp:pushed:b:1"],
            "dependencies":[{"id":"gt-a.1","title":"one","dependency_type":"blocks"}]}]"#;
        let items = parse_details(out).expect("parse");
        assert_eq!(items[0].dependencies[0].id, "gt-a.1");
        assert_eq!(items[0].labels, vec!["done-cp:pushed:b:1"]);
    }

    #[test]
    fn empty_output_is_empty_result() {
        assert!(parse_details("  \n").expect("parse").is_empty());
        assert!(parse_summaries("").expect("parse").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn bd_ledger_surfaces_command_failure() {
        let ledger = BdLedger::new(
            vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 1".to_string()],
            CommandLimits::default(),
        );
        let err = ledger.show("gt-x").expect_err("should fail");
        assert!(format!("{err:#}").contains("boom"), "{err:#}");
    }
}
