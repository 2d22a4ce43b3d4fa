//! Label codec for completion checkpoints and exit intents.
//!
//! The ledger only stores flat string labels, so completion progress is
//! persisted as:
//!
//! - `done-cp:<stage>:<value>:<unix-seconds>`, one per finished stage
//! - `done-intent:<EXIT_TYPE>:<unix-seconds>`, one per completion attempt
//!
//! Everything outside this module works with the typed [`CompletionState`];
//! the string grammar lives here only. Decoding never fails: malformed labels
//! are skipped with a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::core::types::ExitType;

pub const CHECKPOINT_PREFIX: &str = "done-cp:";
pub const INTENT_PREFIX: &str = "done-intent:";

/// Completion protocol stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Pushed,
    MrCreated,
    DoltMerged,
    WitnessNotified,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Pushed,
        Stage::MrCreated,
        Stage::DoltMerged,
        Stage::WitnessNotified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pushed => "pushed",
            Stage::MrCreated => "mr-created",
            Stage::DoltMerged => "dolt-merged",
            Stage::WitnessNotified => "witness-notified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown checkpoint stage '{s}'"))
    }
}

/// Decoded stage -> value mapping. At most one value per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Checkpoints(BTreeMap<Stage, String>);

impl Checkpoints {
    pub fn get(&self, stage: Stage) -> Option<&str> {
        self.0.get(&stage).map(String::as_str)
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.0.contains_key(&stage)
    }

    pub fn insert(&mut self, stage: Stage, value: impl Into<String>) {
        self.0.insert(stage, value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &str)> {
        self.0.iter().map(|(stage, value)| (*stage, value.as_str()))
    }
}

/// Recorded exit intent of a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub exit: ExitType,
    pub recorded_at: i64,
}

/// Typed view of the completion labels on one work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionState {
    pub checkpoints: Checkpoints,
    pub intent: Option<Intent>,
}

impl CompletionState {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        Self {
            checkpoints: decode_checkpoints(labels),
            intent: decode_intent(labels),
        }
    }
}

/// Encode a checkpoint label for `stage`.
pub fn encode_checkpoint(stage: Stage, value: &str, at: DateTime<Utc>) -> String {
    format!("{CHECKPOINT_PREFIX}{stage}:{value}:{}", at.timestamp())
}

/// Decode every `done-cp:` label into a stage -> value mapping.
///
/// The stage is the first field after the prefix and the timestamp, when
/// present, is the trailing all-digit field; whatever lies between is the
/// value, so a value may itself contain `:`. Labels with an unknown stage or
/// an empty value are skipped. Duplicate stages resolve last-wins in
/// iteration order.
pub fn decode_checkpoints<S: AsRef<str>>(labels: &[S]) -> Checkpoints {
    let mut checkpoints = Checkpoints::default();
    for label in labels {
        let label = label.as_ref();
        let Some(body) = label.strip_prefix(CHECKPOINT_PREFIX) else {
            continue;
        };
        match parse_checkpoint_body(body) {
            Some((stage, value)) => checkpoints.insert(stage, value),
            None => warn!(label, "skipping malformed checkpoint label"),
        }
    }
    checkpoints
}

fn parse_checkpoint_body(body: &str) -> Option<(Stage, &str)> {
    let (stage, rest) = body.split_once(':')?;
    let stage = stage.parse::<Stage>().ok()?;
    let value = match rest.rsplit_once(':') {
        Some((value, ts)) if is_unix_seconds(ts) => value,
        _ => rest,
    };
    if value.is_empty() {
        return None;
    }
    Some((stage, value))
}

/// Encode the exit intent label.
pub fn encode_intent(exit: ExitType, at: DateTime<Utc>) -> String {
    format!("{INTENT_PREFIX}{exit}:{}", at.timestamp())
}

/// Decode the exit intent, last-wins when several are present.
pub fn decode_intent<S: AsRef<str>>(labels: &[S]) -> Option<Intent> {
    let mut intent = None;
    for label in labels {
        let label = label.as_ref();
        let Some(body) = label.strip_prefix(INTENT_PREFIX) else {
            continue;
        };
        let parsed = body.split_once(':').and_then(|(exit, ts)| {
            let exit = exit.parse::<ExitType>().ok()?;
            let recorded_at = ts.parse::<i64>().ok()?;
            Some(Intent { exit, recorded_at })
        });
        match parsed {
            Some(found) => intent = Some(found),
            None => warn!(label, "skipping malformed intent label"),
        }
    }
    intent
}

/// Labels with every `done-cp:` entry removed. Intent labels are kept.
pub fn clear_checkpoints<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    retain_without_prefix(labels, CHECKPOINT_PREFIX)
}

/// Labels with every `done-intent:` entry removed. Checkpoints are kept.
pub fn clear_intent<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    retain_without_prefix(labels, INTENT_PREFIX)
}

/// The checkpoint and intent labels present, verbatim, in label order.
///
/// These are what a ledger must remove so that only
/// `clear_intent(&clear_checkpoints(labels))` remains.
pub fn completion_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let kept = clear_intent(&clear_checkpoints(labels));
    labels
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|label| !kept.iter().any(|k| k == label))
        .map(str::to_string)
        .collect()
}

fn retain_without_prefix<S: AsRef<str>>(labels: &[S], prefix: &str) -> Vec<String> {
    labels
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|label| !label.starts_with(prefix))
        .map(str::to_string)
        .collect()
}

fn is_unix_seconds(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}
