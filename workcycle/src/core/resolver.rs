//! Deterministic readiness resolution for molecule steps.

use std::collections::{HashMap, HashSet};

use crate::core::deps::is_blocking;
use crate::core::sequence::{sort_by_sequence, sort_ids_by_sequence};
use crate::core::types::{ItemDetail, ItemStatus, ItemSummary};

/// The complete child set of one molecule.
///
/// Statuses come from the child listing. Dependency edges are read only from
/// item-detail records, so edge-stripped list results cannot be mistaken for
/// "no dependencies". An open child without a detail record stays
/// outstanding but is never a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSet {
    molecule_id: String,
    children: Vec<ItemSummary>,
    details: HashMap<String, ItemDetail>,
}

impl StepSet {
    /// Build from detail records alone; `steps` must be every child of
    /// `molecule_id` (any status).
    pub fn new(molecule_id: impl Into<String>, steps: Vec<ItemDetail>) -> Self {
        let children = steps.iter().map(ItemDetail::summary).collect();
        let details = steps
            .into_iter()
            .map(|step| (step.id.clone(), step))
            .collect();
        Self::from_fetch(molecule_id, children, details)
    }

    /// Build from a child listing (every status) plus the detail records
    /// fetched for its open children.
    pub fn from_fetch(
        molecule_id: impl Into<String>,
        children: Vec<ItemSummary>,
        details: HashMap<String, ItemDetail>,
    ) -> Self {
        Self {
            molecule_id: molecule_id.into(),
            children,
            details,
        }
    }

    pub fn molecule_id(&self) -> &str {
        &self.molecule_id
    }

    pub fn children(&self) -> &[ItemSummary] {
        &self.children
    }

    /// Detail record of child `id`, if one was fetched.
    pub fn detail(&self, id: &str) -> Option<&ItemDetail> {
        self.details.get(id)
    }
}

/// Verdict for "what can run next" in a molecule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every child is closed (or the molecule has no children).
    Complete,
    /// First ready open step in sequence order.
    Ready(ItemDetail),
    /// Children remain outstanding but none of the open ones is ready.
    Blocked {
        /// Outstanding (non-closed) step ids in sequence order.
        waiting: Vec<String>,
    },
}

/// Resolve the next step of a molecule.
///
/// Open steps are evaluated independently: a step is ready when every one of
/// its blocking edges targets a closed sibling. Non-blocking edges are
/// ignored whatever their target's status. Steps in any other non-closed
/// status (in progress, hooked) keep the molecule outstanding but are never
/// candidates. Among ready steps the smallest sequence wins, ties broken by id.
pub fn resolve_next_step(set: &StepSet) -> StepOutcome {
    let mut waiting: Vec<String> = set
        .children
        .iter()
        .filter(|child| child.status != ItemStatus::Closed)
        .map(|child| child.id.clone())
        .collect();
    if waiting.is_empty() {
        return StepOutcome::Complete;
    }

    if let Some(first) = ready_steps(set).into_iter().next() {
        return StepOutcome::Ready(first.clone());
    }

    waiting.sort();
    sort_ids_by_sequence(&mut waiting);
    StepOutcome::Blocked { waiting }
}

/// All ready open steps in sequence order.
pub fn ready_steps(set: &StepSet) -> Vec<&ItemDetail> {
    let closed = closed_ids(set);
    let mut ready: Vec<&ItemDetail> = set
        .children
        .iter()
        .filter(|child| child.status == ItemStatus::Open)
        .filter_map(|child| set.detail(&child.id))
        .filter(|step| is_ready(step, &closed))
        .collect();
    ready.sort_by(|a, b| a.id.cmp(&b.id));
    sort_by_sequence(&mut ready, |step| step.id.as_str());
    ready
}

/// True if `step` has no blocking edge to an item outside `closed`.
pub fn is_ready(step: &ItemDetail, closed: &HashSet<&str>) -> bool {
    step.dependencies
        .iter()
        .filter(|dep| is_blocking(&dep.dependency_type))
        .all(|dep| closed.contains(dep.id.as_str()))
}

fn closed_ids(set: &StepSet) -> HashSet<&str> {
    set.children
        .iter()
        .filter(|child| child.status == ItemStatus::Closed)
        .map(|child| child.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Dependency;

    fn step(id: &str, status: ItemStatus, deps: &[(&str, &str)]) -> ItemDetail {
        let deps = deps
            .iter()
            .map(|(target, dep_type)| Dependency::new(*target, *dep_type))
            .collect();
        ItemDetail::new(id, status, Some("gt-mol"), deps)
    }

    fn ready_id(outcome: &StepOutcome) -> Option<&str> {
        match outcome {
            StepOutcome::Ready(step) => Some(step.id.as_str()),
            _ => None,
        }
    }

    #[test]
    fn first_step_ready_then_second_after_close() {
        let mut steps = vec![
            step("gt-mol.1", ItemStatus::Open, &[]),
            step("gt-mol.2", ItemStatus::Open, &[("gt-mol.1", "blocks")]),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps.clone()));
        assert_eq!(ready_id(&outcome), Some("gt-mol.1"));

        steps[0].status = ItemStatus::Closed;
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(ready_id(&outcome), Some("gt-mol.2"));
    }

    #[test]
    fn reverse_input_order_still_selects_lowest_sequence() {
        let steps = vec![
            step("gt-mol.2", ItemStatus::Open, &[]),
            step("gt-mol.1", ItemStatus::Open, &[]),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(ready_id(&outcome), Some("gt-mol.1"));
    }

    #[test]
    fn all_closed_is_complete() {
        let steps = vec![
            step("gt-mol.1", ItemStatus::Closed, &[]),
            step("gt-mol.2", ItemStatus::Closed, &[("gt-mol.1", "blocks")]),
        ];
        assert_eq!(
            resolve_next_step(&StepSet::new("gt-mol", steps)),
            StepOutcome::Complete
        );
    }

    #[test]
    fn empty_molecule_is_complete() {
        assert_eq!(
            resolve_next_step(&StepSet::new("gt-mol", Vec::new())),
            StepOutcome::Complete
        );
    }

    #[test]
    fn in_progress_sibling_blocks_synthesis_step() {
        let steps = vec![
            step("gt-mol.1", ItemStatus::Closed, &[]),
            step("gt-mol.2", ItemStatus::InProgress, &[]),
            step(
                "gt-mol.3",
                ItemStatus::Open,
                &[("gt-mol.1", "blocks"), ("gt-mol.2", "blocks")],
            ),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(
            outcome,
            StepOutcome::Blocked {
                waiting: vec!["gt-mol.2".to_string(), "gt-mol.3".to_string()]
            }
        );
    }

    #[test]
    fn in_progress_step_alone_is_not_complete() {
        let steps = vec![step("gt-mol.1", ItemStatus::InProgress, &[])];
        assert!(matches!(
            resolve_next_step(&StepSet::new("gt-mol", steps)),
            StepOutcome::Blocked { .. }
        ));
    }

    #[test]
    fn parallel_branch_stays_ready() {
        let steps = vec![
            step("gt-mol.1", ItemStatus::Closed, &[]),
            step("gt-mol.2", ItemStatus::Open, &[]),
            step(
                "gt-mol.3",
                ItemStatus::Open,
                &[("gt-mol.1", "blocks"), ("gt-mol.2", "blocks")],
            ),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(ready_id(&outcome), Some("gt-mol.2"));
    }

    #[test]
    fn non_blocking_edges_never_hold_back_a_step() {
        for dep_type in ["", "needs", "parent-child", "tracks", "relates-to", "depends-on"] {
            let steps = vec![
                step("gt-mol.1", ItemStatus::Open, &[]),
                step("gt-mol.2", ItemStatus::Open, &[("gt-mol.1", dep_type)]),
                step("gt-mol.3", ItemStatus::Open, &[("gt-mol.2", dep_type)]),
            ];
            let set = StepSet::new("gt-mol", steps);
            assert_eq!(ready_steps(&set).len(), 3, "{dep_type:?}");
        }
    }

    #[test]
    fn each_blocking_type_gates_the_chain() {
        for dep_type in ["blocks", "conditional-blocks", "waits-for"] {
            let steps = vec![
                step("gt-mol.1", ItemStatus::Open, &[]),
                step("gt-mol.2", ItemStatus::Open, &[("gt-mol.1", dep_type)]),
                step("gt-mol.3", ItemStatus::Open, &[("gt-mol.2", dep_type)]),
            ];
            let set = StepSet::new("gt-mol", steps);
            let ids: Vec<&str> = ready_steps(&set).iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["gt-mol.1"], "{dep_type}");
        }
    }

    #[test]
    fn mixed_edges_only_blocking_ones_count() {
        let steps = vec![
            step("gt-mol.1", ItemStatus::Open, &[]),
            step(
                "gt-mol.2",
                ItemStatus::Open,
                &[("gt-mol.1", "blocks"), ("gt-mol", "parent-child")],
            ),
            step(
                "gt-mol.3",
                ItemStatus::Open,
                &[("gt-mol.2", "blocks"), ("gt-mol", "parent-child")],
            ),
        ];
        let set = StepSet::new("gt-mol", steps);
        let ids: Vec<&str> = ready_steps(&set).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["gt-mol.1"]);
    }

    #[test]
    fn blocking_and_non_blocking_edge_to_same_neighbor_blocks() {
        let steps = vec![
            step("gt-mol.1", ItemStatus::Open, &[]),
            step(
                "gt-mol.2",
                ItemStatus::Open,
                &[("gt-mol.1", "tracks"), ("gt-mol.1", "blocks")],
            ),
        ];
        let set = StepSet::new("gt-mol", steps);
        assert_eq!(ready_steps(&set).len(), 1);
    }

    #[test]
    fn resolver_is_idempotent() {
        let steps = vec![
            step("gt-mol.3", ItemStatus::Open, &[("gt-mol.2", "blocks")]),
            step("gt-mol.2", ItemStatus::Open, &[]),
            step("gt-mol.1", ItemStatus::Closed, &[]),
        ];
        let set = StepSet::new("gt-mol", steps);
        assert_eq!(resolve_next_step(&set), resolve_next_step(&set));
    }

    #[test]
    fn unsequenced_ids_sort_after_sequenced_ones() {
        let steps = vec![
            step("gt-mol.extra", ItemStatus::Open, &[]),
            step("gt-mol.9", ItemStatus::Open, &[]),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(ready_id(&outcome), Some("gt-mol.9"));
    }

    #[test]
    fn listed_child_without_detail_stays_outstanding() {
        let children = vec![
            step("gt-mol.1", ItemStatus::Closed, &[]).summary(),
            step("gt-mol.2", ItemStatus::Open, &[]).summary(),
        ];
        let set = StepSet::from_fetch("gt-mol", children, HashMap::new());
        assert!(ready_steps(&set).is_empty());
        assert_eq!(
            resolve_next_step(&set),
            StepOutcome::Blocked {
                waiting: vec!["gt-mol.2".to_string()]
            }
        );
    }

    #[test]
    fn closed_set_comes_from_listing() {
        let closed = step("gt-mol.1", ItemStatus::Closed, &[]);
        let next = step("gt-mol.2", ItemStatus::Open, &[("gt-mol.1", "blocks")]);
        let children = vec![closed.summary(), next.summary()];
        let details = HashMap::from([(next.id.clone(), next)]);
        let outcome = resolve_next_step(&StepSet::from_fetch("gt-mol", children, details));
        assert_eq!(ready_id(&outcome), Some("gt-mol.2"));
    }

    #[test]
    fn equal_sequences_break_ties_by_id() {
        let steps = vec![
            step("gt-zeta.1", ItemStatus::Open, &[]),
            step("gt-alpha.1", ItemStatus::Open, &[]),
        ];
        let outcome = resolve_next_step(&StepSet::new("gt-mol", steps));
        assert_eq!(ready_id(&outcome), Some("gt-alpha.1"));
    }
}
