//! Merge strategy selection.
//!
//! The policy lives as free text in a coordinating item's description, e.g.
//! a line `Merge: direct`. Parsing is lenient and validation happens when the
//! text is turned into a [`MergeStrategy`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::checkpoint::Stage;

const MERGE_FIELD: &str = "Merge:";

/// Return the trimmed value of the first `Merge: <value>` line, or `""`.
///
/// The prefix is case-sensitive and may appear on any line. Unknown values
/// pass through unchanged.
pub fn parse_merge_strategy(description: &str) -> String {
    description
        .lines()
        .find_map(|line| line.trim().strip_prefix(MERGE_FIELD))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Policy controlling which completion stages run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Push the work branch and open a merge request (default).
    #[default]
    Mr,
    /// Push straight to the default branch, no merge request.
    Direct,
    /// Keep everything local: no push, no request, no integration merge.
    Local,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Mr => "mr",
            MergeStrategy::Direct => "direct",
            MergeStrategy::Local => "local",
        }
    }

    /// Parse a selector value. Empty selects the default.
    pub fn from_policy(value: &str) -> Result<Self, String> {
        if value.is_empty() {
            return Ok(MergeStrategy::default());
        }
        value.parse()
    }

    pub fn plan(self) -> StagePlan {
        match self {
            MergeStrategy::Mr => StagePlan {
                push: Some(PushTarget::WorkBranch),
                merge_request: true,
                integrate: true,
                strategy_in_notification: false,
            },
            MergeStrategy::Direct => StagePlan {
                push: Some(PushTarget::DefaultBranch),
                merge_request: false,
                integrate: true,
                strategy_in_notification: true,
            },
            MergeStrategy::Local => StagePlan {
                push: None,
                merge_request: false,
                integrate: false,
                strategy_in_notification: true,
            },
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mr" => Ok(MergeStrategy::Mr),
            "direct" => Ok(MergeStrategy::Direct),
            "local" => Ok(MergeStrategy::Local),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected mr, direct or local)"
            )),
        }
    }
}

/// Where the push stage sends the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTarget {
    /// Push the worker's branch under its own name.
    WorkBranch,
    /// Push the worker's HEAD onto the default branch.
    DefaultBranch,
}

/// Stages a strategy requires for a `COMPLETED` exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub push: Option<PushTarget>,
    pub merge_request: bool,
    pub integrate: bool,
    /// Non-default strategies are named in the notification body.
    pub strategy_in_notification: bool,
}

impl StagePlan {
    /// Same plan with push, merge request and integration dropped. Exits other
    /// than `COMPLETED` only report back.
    pub fn notify_only(self) -> Self {
        Self {
            push: None,
            merge_request: false,
            integrate: false,
            ..self
        }
    }

    /// Stages that run, in protocol order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        if self.push.is_some() {
            stages.push(Stage::Pushed);
        }
        if self.merge_request {
            stages.push(Stage::MrCreated);
        }
        if self.integrate {
            stages.push(Stage::DoltMerged);
        }
        stages.push(Stage::WitnessNotified);
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_merge_line_anywhere() {
        let cases = [
            ("Auto-created convoy tracking gt-abc\nMerge: direct", "direct"),
            ("Convoy tracking 3 issues\nOwner: mayor/\nMerge: mr", "mr"),
            ("Merge: local\nOwner: mayor/", "local"),
            ("Convoy tracking 1 issues\nMerge: direct\nNotify: mayor/", "direct"),
            ("Merge:   squash  ", "squash"),
            ("Auto-created convoy tracking gt-abc", ""),
            ("", ""),
            ("merge: direct", ""),
        ];
        for (text, want) in cases {
            assert_eq!(parse_merge_strategy(text), want, "{text:?}");
        }
    }

    #[test]
    fn first_merge_line_wins() {
        assert_eq!(parse_merge_strategy("Merge: local\nMerge: direct"), "local");
    }

    #[test]
    fn empty_policy_defaults_to_mr() {
        assert_eq!(MergeStrategy::from_policy(""), Ok(MergeStrategy::Mr));
        assert!(MergeStrategy::from_policy("squash").is_err());
    }

    #[test]
    fn plans_select_stages() {
        use Stage::{DoltMerged, MrCreated, Pushed, WitnessNotified};
        assert_eq!(
            MergeStrategy::Mr.plan().stages(),
            vec![Pushed, MrCreated, DoltMerged, WitnessNotified]
        );
        assert_eq!(
            MergeStrategy::Direct.plan().stages(),
            vec![Pushed, DoltMerged, WitnessNotified]
        );
        assert_eq!(MergeStrategy::Local.plan().stages(), vec![WitnessNotified]);
    }

    #[test]
    fn notify_only_keeps_strategy_flag() {
        let plan = MergeStrategy::Direct.plan().notify_only();
        assert_eq!(plan.stages(), vec![Stage::WitnessNotified]);
        assert!(plan.strategy_in_notification);
    }

    #[test]
    fn only_default_strategy_is_omitted_from_notification() {
        assert!(!MergeStrategy::Mr.plan().strategy_in_notification);
        assert!(MergeStrategy::Direct.plan().strategy_in_notification);
        assert!(MergeStrategy::Local.plan().strategy_in_notification);
    }

    #[test]
    fn direct_pushes_to_default_branch() {
        assert_eq!(
            MergeStrategy::Direct.plan().push,
            Some(PushTarget::DefaultBranch)
        );
        assert_eq!(MergeStrategy::Mr.plan().push, Some(PushTarget::WorkBranch));
        assert_eq!(MergeStrategy::Local.plan().push, None);
    }
}
