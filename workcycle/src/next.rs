//! Next-step lookup for a molecule.
//!
//! Children are enumerated with a list fetch, then re-fetched with full edges
//! before readiness is decided: list results do not carry dependencies.

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::resolver::{StepOutcome, StepSet, resolve_next_step};
use crate::core::types::{ItemStatus, ListFilter};
use crate::io::ledger::Ledger;

/// List every child of `molecule_id` and fetch full edges for the open ones.
///
/// An open child that the detail fetch does not return stays outstanding but
/// cannot be selected.
#[instrument(skip_all, fields(molecule_id = %molecule_id))]
pub fn load_step_set(ledger: &dyn Ledger, molecule_id: &str) -> Result<StepSet> {
    let children = ledger
        .list(&ListFilter::children_of(molecule_id))
        .with_context(|| format!("list children of {molecule_id}"))?;
    let open_ids: Vec<String> = children
        .iter()
        .filter(|child| child.status == ItemStatus::Open)
        .map(|child| child.id.clone())
        .collect();
    let details = ledger
        .show_multiple(&open_ids)
        .with_context(|| format!("fetch step details for {molecule_id}"))?;

    for id in open_ids.iter().filter(|id| !details.contains_key(*id)) {
        warn!(step = %id, "open step missing from detail fetch, not selectable");
    }
    debug!(
        children = children.len(),
        open = open_ids.len(),
        fetched = details.len(),
        "loaded molecule steps"
    );
    Ok(StepSet::from_fetch(molecule_id, children, details))
}

/// Resolve what can run next in `molecule_id`.
pub fn find_next_step(ledger: &dyn Ledger, molecule_id: &str) -> Result<StepOutcome> {
    let set = load_step_set(ledger, molecule_id)?;
    let outcome = resolve_next_step(&set);
    match &outcome {
        StepOutcome::Complete => debug!(molecule_id, "molecule complete"),
        StepOutcome::Ready(step) => debug!(molecule_id, step = %step.id, "next step ready"),
        StepOutcome::Blocked { waiting } => {
            debug!(molecule_id, waiting = waiting.len(), "molecule blocked");
        }
    }
    Ok(outcome)
}
