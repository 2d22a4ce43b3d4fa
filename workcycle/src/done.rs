//! Completion protocol: the ordered exit path of a worker.
//!
//! Stages run strictly in order (push, merge request, integration merge,
//! notification), gated by the merge strategy. Each stage records a
//! checkpoint label on the work item right after it succeeds, so a retried
//! run against the same item with the same exit type resumes after the last
//! finished stage. A different or missing recorded intent starts fresh.
//!
//! Once the caller is confirmed to be a worker, a [`CleanupBackstop`] is
//! armed before anything else can fail. It kills the worker's session on
//! every return path unless the protocol killed it explicitly.

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::core::backstop::{should_fire, should_teardown};
use crate::core::checkpoint::{
    Checkpoints, CompletionState, Stage, completion_labels, encode_checkpoint, encode_intent,
};
use crate::core::resolver::StepOutcome;
use crate::core::role::{WorkerIdentity, rig_of};
use crate::core::sequence::molecule_id_from_step;
use crate::core::strategy::{MergeStrategy, PushTarget, StagePlan, parse_merge_strategy};
use crate::core::types::ExitType;
use crate::io::config::WorkcycleConfig;
use crate::io::git::Workspace;
use crate::io::hooks::{Integrator, MergeQueue, Notifier};
use crate::io::ledger::Ledger;
use crate::io::session::Sessions;
use crate::next::find_next_step;

/// Recipient for completion notices from actors outside any rig.
const FALLBACK_NOTIFY_ADDRESS: &str = "mayor/";

/// Protocol failures callers may want to tell apart.
#[derive(Debug, Error)]
pub enum DoneError {
    #[error("cannot determine branch: workspace unavailable and no fallback branch set")]
    BranchUnavailable,
    #[error("unknown merge strategy '{0}' (expected mr, direct or local)")]
    UnknownStrategy(String),
    #[error("stage {stage} failed")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Where the merge strategy selector comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePolicy {
    /// Raw selector value (see [`parse_merge_strategy`]). Empty means default.
    Value(String),
    /// Read the `Merge:` line from this item's description.
    FromItem(String),
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy::Value(String::new())
    }
}

/// One invocation of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneRequest {
    pub item_id: String,
    pub exit: ExitType,
    /// Caller address, e.g. `gastown/polecats/nux`.
    pub actor: String,
    pub merge_policy: MergePolicy,
    /// Branch to use when the workspace cannot report one.
    pub fallback_branch: Option<String>,
}

/// Static settings, usually taken from [`WorkcycleConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneSettings {
    pub default_branch: String,
    pub session_prefix: String,
}

impl DoneSettings {
    pub fn from_config(cfg: &WorkcycleConfig) -> Self {
        Self {
            default_branch: cfg.default_branch.clone(),
            session_prefix: cfg.session.prefix.clone(),
        }
    }
}

impl Default for DoneSettings {
    fn default() -> Self {
        Self::from_config(&WorkcycleConfig::default())
    }
}

/// External systems the protocol drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub ledger: &'a dyn Ledger,
    pub workspace: &'a dyn Workspace,
    pub merge_queue: &'a dyn MergeQueue,
    pub integrator: &'a dyn Integrator,
    pub notifier: &'a dyn Notifier,
    pub sessions: &'a dyn Sessions,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneOutcome {
    pub item_id: String,
    pub exit: ExitType,
    pub strategy: MergeStrategy,
    pub branch: String,
    /// True when checkpoints of an interrupted attempt were honored.
    pub resumed: bool,
    /// Stages skipped because a previous attempt had finished them.
    pub skipped: Vec<Stage>,
    pub merge_request: Option<String>,
    /// Verdict for the molecule when the item was a molecule step.
    pub next: Option<StepOutcome>,
    pub torn_down: bool,
}

/// Kills the worker session when dropped unless told the kill already happened.
pub struct CleanupBackstop<'a> {
    sessions: &'a dyn Sessions,
    session: Option<String>,
    killed: bool,
}

impl<'a> CleanupBackstop<'a> {
    /// Armed iff `session` is set.
    pub fn new(sessions: &'a dyn Sessions, session: Option<String>) -> Self {
        Self {
            sessions,
            session,
            killed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    pub fn mark_killed(&mut self) {
        self.killed = true;
    }
}

impl Drop for CleanupBackstop<'_> {
    fn drop(&mut self) {
        if !should_fire(self.is_armed(), self.killed) {
            return;
        }
        let Some(session) = self.session.as_deref() else {
            return;
        };
        warn!(session, "completion did not kill the session, backstop firing");
        if let Err(err) = self.sessions.kill(session) {
            error!(session, err = %format!("{err:#}"), "backstop failed to kill session");
        }
    }
}

/// Run the completion protocol for one work item.
#[instrument(skip_all, fields(item_id = %request.item_id, exit = %request.exit))]
pub fn run_done(
    request: &DoneRequest,
    settings: &DoneSettings,
    deps: &Collaborators<'_>,
) -> Result<DoneOutcome> {
    let worker = WorkerIdentity::parse(&request.actor);
    let session = worker
        .as_ref()
        .map(|worker| worker.session_name(&settings.session_prefix));
    let mut backstop = CleanupBackstop::new(deps.sessions, session.clone());
    if backstop.is_armed() {
        debug!(actor = %request.actor, "worker confirmed, backstop armed");
    }

    let policy = resolve_policy(deps.ledger, &request.merge_policy)?;
    let strategy =
        MergeStrategy::from_policy(&policy).map_err(|_| DoneError::UnknownStrategy(policy))?;
    let branch = resolve_branch(deps.workspace, request.fallback_branch.as_deref())?;
    let plan = if request.exit == ExitType::Completed {
        strategy.plan()
    } else {
        strategy.plan().notify_only()
    };

    let item = deps
        .ledger
        .show(&request.item_id)
        .with_context(|| format!("load work item {}", request.item_id))?;
    let state = CompletionState::from_labels(&item.labels);
    let resumed = state
        .intent
        .is_some_and(|intent| intent.exit == request.exit);
    let checkpoints = if resumed {
        info!(done = state.checkpoints.len(), "resuming interrupted completion");
        state.checkpoints
    } else {
        start_fresh_attempt(deps.ledger, &request.item_id, &item.labels, request.exit)?;
        Checkpoints::default()
    };

    let mut run = StageRun {
        request,
        settings,
        deps,
        worker: worker.as_ref(),
        strategy,
        plan,
        branch: &branch,
        merge_request: checkpoints.get(Stage::MrCreated).map(str::to_string),
    };
    let mut skipped = Vec::new();
    let mut pushed = checkpoints.is_done(Stage::Pushed);
    for stage in plan.stages() {
        if checkpoints.is_done(stage) {
            info!(%stage, "stage already done, skipping");
            skipped.push(stage);
            continue;
        }
        let value = run.execute(stage).map_err(|source| {
            if stage == Stage::Pushed {
                warn!("push failed, workspace left untouched");
            }
            DoneError::StageFailed {
                stage,
                source: source.into(),
            }
        })?;
        deps.ledger
            .add_label(
                &request.item_id,
                &encode_checkpoint(stage, &value, Utc::now()),
            )
            .with_context(|| format!("record {stage} checkpoint"))?;
        if stage == Stage::Pushed {
            pushed = true;
        }
    }
    let merge_request = run.merge_request;

    let next = match molecule_id_from_step(&request.item_id) {
        Some(molecule_id) if request.exit == ExitType::Completed => {
            deps.ledger
                .close(std::slice::from_ref(&request.item_id))
                .with_context(|| format!("close step {}", request.item_id))?;
            Some(find_next_step(deps.ledger, molecule_id)?)
        }
        _ => None,
    };

    // Cleared last: a retry before this point resumes with every stage skipped.
    clear_completion_labels(deps.ledger, &request.item_id)?;

    let push_failed = plan.push.is_some() && !pushed;
    let torn_down = match plan.push {
        Some(target) if should_teardown(request.exit, push_failed) => {
            let remote_branch = match target {
                PushTarget::WorkBranch => branch.as_str(),
                PushTarget::DefaultBranch => settings.default_branch.as_str(),
            };
            match deps.workspace.teardown(remote_branch) {
                Ok(()) => true,
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "workspace teardown refused");
                    false
                }
            }
        }
        _ => false,
    };

    if let Some(session) = session.as_deref() {
        deps.sessions
            .kill(session)
            .with_context(|| format!("kill session {session}"))?;
        backstop.mark_killed();
    }

    Ok(DoneOutcome {
        item_id: request.item_id.clone(),
        exit: request.exit,
        strategy,
        branch,
        resumed,
        skipped,
        merge_request,
        next,
        torn_down,
    })
}

/// Raw selector value for `policy`, loading the named item when needed.
fn resolve_policy(ledger: &dyn Ledger, policy: &MergePolicy) -> Result<String> {
    match policy {
        MergePolicy::Value(value) => Ok(value.clone()),
        MergePolicy::FromItem(id) => {
            let item = ledger
                .show(id)
                .with_context(|| format!("load policy item {id}"))?;
            Ok(parse_merge_strategy(&item.description))
        }
    }
}

/// Active branch from the workspace, else the fallback.
fn resolve_branch(workspace: &dyn Workspace, fallback: Option<&str>) -> Result<String, DoneError> {
    let live = match workspace.current_branch() {
        Ok(branch) => branch,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "workspace branch lookup failed");
            None
        }
    };
    live.or_else(|| {
        fallback
            .filter(|branch| !branch.trim().is_empty())
            .map(str::to_string)
    })
    .ok_or(DoneError::BranchUnavailable)
}

/// Drop labels of any earlier attempt and record the new intent.
fn start_fresh_attempt(
    ledger: &dyn Ledger,
    item_id: &str,
    labels: &[String],
    exit: ExitType,
) -> Result<()> {
    for label in completion_labels(labels) {
        debug!(%label, "clearing stale completion label");
        ledger
            .remove_label(item_id, &label)
            .with_context(|| format!("remove label {label}"))?;
    }
    ledger
        .add_label(item_id, &encode_intent(exit, Utc::now()))
        .context("record exit intent")
}

fn clear_completion_labels(ledger: &dyn Ledger, item_id: &str) -> Result<()> {
    let labels = ledger
        .show(item_id)
        .with_context(|| format!("reload work item {item_id}"))?
        .labels;
    for label in completion_labels(&labels) {
        ledger
            .remove_label(item_id, &label)
            .with_context(|| format!("remove label {label}"))?;
    }
    Ok(())
}

struct StageRun<'r, 'a> {
    request: &'r DoneRequest,
    settings: &'r DoneSettings,
    deps: &'r Collaborators<'a>,
    worker: Option<&'r WorkerIdentity>,
    strategy: MergeStrategy,
    plan: StagePlan,
    branch: &'r str,
    merge_request: Option<String>,
}

impl StageRun<'_, '_> {
    /// Run one stage and return its checkpoint value.
    fn execute(&mut self, stage: Stage) -> Result<String> {
        match stage {
            Stage::Pushed => {
                match self.plan.push {
                    Some(PushTarget::DefaultBranch) => self
                        .deps
                        .workspace
                        .push("HEAD", &self.settings.default_branch)?,
                    _ => self.deps.workspace.push(self.branch, self.branch)?,
                }
                Ok(self.branch.to_string())
            }
            Stage::MrCreated => {
                let id = self
                    .deps
                    .merge_queue
                    .submit(&self.request.item_id, self.branch)?;
                info!(request_id = %id, "merge request created");
                self.merge_request = Some(id.clone());
                Ok(id)
            }
            Stage::DoltMerged => {
                self.deps
                    .integrator
                    .merge(self.branch, &self.settings.default_branch)?;
                Ok("ok".to_string())
            }
            Stage::WitnessNotified => {
                let to = self.notify_address();
                let subject = format!("POLECAT_DONE {}", self.sender_name());
                self.deps
                    .notifier
                    .notify(&to, &subject, &self.notification_body())?;
                Ok("ok".to_string())
            }
        }
    }

    fn notify_address(&self) -> String {
        match self.worker {
            Some(worker) => worker.witness_address(),
            None => rig_of(&self.request.actor)
                .map(|rig| format!("{rig}/witness"))
                .unwrap_or_else(|| FALLBACK_NOTIFY_ADDRESS.to_string()),
        }
    }

    fn sender_name(&self) -> &str {
        self.worker
            .map_or(self.request.actor.as_str(), |worker| worker.name.as_str())
    }

    fn notification_body(&self) -> String {
        notification_body(
            self.request,
            self.branch,
            self.merge_request.as_deref(),
            self.plan.strategy_in_notification.then_some(self.strategy),
        )
    }
}

/// Body of the completion notice.
///
/// The strategy line appears only for non-default strategies.
pub fn notification_body(
    request: &DoneRequest,
    branch: &str,
    merge_request: Option<&str>,
    strategy: Option<MergeStrategy>,
) -> String {
    let mut lines = vec![
        format!("Exit: {}", request.exit),
        format!("Issue: {}", request.item_id),
        format!("Branch: {branch}"),
    ];
    if let Some(id) = merge_request {
        lines.push(format!("MR: {id}"));
    }
    if let Some(strategy) = strategy {
        lines.push(format!("MergeStrategy: {strategy}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemStatus;
    use crate::test_support::{
        MemoryLedger, RecordingSessions, ScriptedHooks, ScriptedWorkspace, issue, step,
    };

    const WORKER: &str = "gastown/polecats/nux";

    fn request(exit: ExitType, policy: &str) -> DoneRequest {
        DoneRequest {
            item_id: "gt-abc".to_string(),
            exit,
            actor: WORKER.to_string(),
            merge_policy: MergePolicy::Value(policy.to_string()),
            fallback_branch: None,
        }
    }

    struct Fixture {
        ledger: MemoryLedger,
        workspace: ScriptedWorkspace,
        hooks: ScriptedHooks,
        sessions: RecordingSessions,
    }

    impl Fixture {
        fn new(workspace: ScriptedWorkspace) -> Self {
            Self {
                ledger: MemoryLedger::new(vec![issue("gt-abc", ItemStatus::InProgress)]),
                workspace,
                hooks: ScriptedHooks::new("gt-mr-1"),
                sessions: RecordingSessions::default(),
            }
        }

        fn run(&self, request: &DoneRequest) -> Result<DoneOutcome> {
            let deps = Collaborators {
                ledger: &self.ledger,
                workspace: &self.workspace,
                merge_queue: &self.hooks,
                integrator: &self.hooks,
                notifier: &self.hooks,
                sessions: &self.sessions,
            };
            run_done(request, &DoneSettings::default(), &deps)
        }
    }

    #[test]
    fn body_names_only_non_default_strategy() {
        let req = request(ExitType::Completed, "");
        let body = notification_body(&req, "polecat/nux", Some("gt-mr-1"), None);
        assert_eq!(
            body,
            "Exit: COMPLETED\nIssue: gt-abc\nBranch: polecat/nux\nMR: gt-mr-1"
        );
        let body = notification_body(&req, "polecat/nux", None, Some(MergeStrategy::Direct));
        assert!(body.ends_with("MergeStrategy: direct"), "{body}");
    }

    #[test]
    fn default_strategy_runs_every_stage() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let outcome = fx.run(&request(ExitType::Completed, "")).expect("done");

        assert!(!outcome.resumed);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.merge_request.as_deref(), Some("gt-mr-1"));
        assert_eq!(
            fx.workspace.pushes(),
            vec![("polecat/nux".to_string(), "polecat/nux".to_string())]
        );
        assert_eq!(
            fx.hooks.merges(),
            vec![("polecat/nux".to_string(), "main".to_string())]
        );
        let notices = fx.hooks.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].to, "gastown/witness");
        assert_eq!(notices[0].subject, "POLECAT_DONE nux");
        assert!(!notices[0].body.contains("MergeStrategy:"));
        assert!(outcome.torn_down);
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
    }

    #[test]
    fn checkpoints_are_written_in_stage_order_then_cleared() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.run(&request(ExitType::Completed, "mr")).expect("done");

        let added = fx.ledger.added_labels();
        let prefixes: Vec<&str> = added
            .iter()
            .map(|label| label.rsplitn(2, ':').nth(1).unwrap_or(label.as_str()))
            .collect();
        assert_eq!(
            prefixes,
            vec![
                "done-intent:COMPLETED",
                "done-cp:pushed:polecat/nux",
                "done-cp:mr-created:gt-mr-1",
                "done-cp:dolt-merged:ok",
                "done-cp:witness-notified:ok",
            ]
        );
        assert!(fx.ledger.labels("gt-abc").is_empty());
    }

    #[test]
    fn direct_strategy_skips_merge_request() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let outcome = fx.run(&request(ExitType::Completed, "direct")).expect("done");

        assert_eq!(outcome.merge_request, None);
        assert!(fx.hooks.submissions().is_empty());
        assert_eq!(
            fx.workspace.pushes(),
            vec![("HEAD".to_string(), "main".to_string())]
        );
        assert_eq!(fx.workspace.teardowns(), vec!["main"]);
        let body = &fx.hooks.notices()[0].body;
        assert!(body.contains("MergeStrategy: direct"), "{body}");
        assert!(!body.contains("MR:"), "{body}");
    }

    #[test]
    fn local_strategy_only_notifies() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let outcome = fx.run(&request(ExitType::Completed, "local")).expect("done");

        assert!(fx.workspace.pushes().is_empty());
        assert!(fx.hooks.merges().is_empty());
        assert!(!outcome.torn_down);
        assert!(fx.hooks.notices()[0].body.contains("MergeStrategy: local"));
    }

    #[test]
    fn resume_skips_pushed_stage() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.ledger.set_labels(
            "gt-abc",
            &[
                "done-intent:COMPLETED:1738972800",
                "done-cp:pushed:polecat/nux:1738972801",
            ],
        );
        let outcome = fx.run(&request(ExitType::Completed, "")).expect("done");

        assert!(outcome.resumed);
        assert_eq!(outcome.skipped, vec![Stage::Pushed]);
        assert!(fx.workspace.pushes().is_empty());
        assert_eq!(fx.hooks.submissions().len(), 1);
        assert!(outcome.torn_down);
    }

    #[test]
    fn resume_reuses_recorded_merge_request() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.ledger.set_labels(
            "gt-abc",
            &[
                "done-intent:COMPLETED:1738972800",
                "done-cp:pushed:polecat/nux:1738972801",
                "done-cp:mr-created:gt-mr-9:1738972802",
                "done-cp:dolt-merged:ok:1738972803",
            ],
        );
        let outcome = fx.run(&request(ExitType::Completed, "")).expect("done");

        assert_eq!(
            outcome.skipped,
            vec![Stage::Pushed, Stage::MrCreated, Stage::DoltMerged]
        );
        assert_eq!(outcome.merge_request.as_deref(), Some("gt-mr-9"));
        assert!(fx.hooks.notices()[0].body.contains("MR: gt-mr-9"));
    }

    #[test]
    fn different_intent_starts_fresh() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.ledger.set_labels(
            "gt-abc",
            &[
                "gt:agent",
                "done-intent:ESCALATED:1738972800",
                "done-cp:pushed:old-branch:1738972801",
            ],
        );
        let outcome = fx.run(&request(ExitType::Completed, "")).expect("done");

        assert!(!outcome.resumed);
        assert!(outcome.skipped.is_empty());
        assert_eq!(fx.workspace.pushes().len(), 1);
        assert_eq!(fx.ledger.labels("gt-abc"), vec!["gt:agent"]);
    }

    #[test]
    fn push_failure_is_an_error_and_skips_teardown() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux").failing_push());
        let err = fx.run(&request(ExitType::Completed, "")).expect_err("push fails");

        match err.downcast_ref::<DoneError>() {
            Some(DoneError::StageFailed { stage, .. }) => assert_eq!(*stage, Stage::Pushed),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fx.workspace.teardowns().is_empty());
        assert!(fx.hooks.submissions().is_empty());
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
        let labels = fx.ledger.labels("gt-abc");
        assert_eq!(labels.len(), 1);
        assert!(labels[0].starts_with("done-intent:COMPLETED:"));
    }

    #[test]
    fn failed_merge_request_keeps_push_checkpoint() {
        let mut fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.hooks = ScriptedHooks::new("unused").failing_submit();
        let err = fx.run(&request(ExitType::Completed, "")).expect_err("submit fails");
        assert!(format!("{err:#}").contains("merge queue unavailable"), "{err:#}");

        let state = CompletionState::from_labels(&fx.ledger.labels("gt-abc"));
        assert!(state.checkpoints.is_done(Stage::Pushed));
        assert!(!state.checkpoints.is_done(Stage::MrCreated));
        assert_eq!(state.intent.map(|i| i.exit), Some(ExitType::Completed));
    }

    #[test]
    fn missing_branch_fails_and_backstop_fires() {
        let fx = Fixture::new(ScriptedWorkspace::missing());
        let err = fx.run(&request(ExitType::Completed, "")).expect_err("no branch");

        assert!(matches!(
            err.downcast_ref::<DoneError>(),
            Some(DoneError::BranchUnavailable)
        ));
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
        assert!(fx.ledger.ops().is_empty());
    }

    #[test]
    fn fallback_branch_is_used_when_workspace_is_gone() {
        let fx = Fixture::new(ScriptedWorkspace::missing());
        let mut req = request(ExitType::Completed, "");
        req.fallback_branch = Some("polecat/nux-fallback".to_string());
        let outcome = fx.run(&req).expect("done");
        assert_eq!(outcome.branch, "polecat/nux-fallback");
    }

    #[test]
    fn unknown_strategy_is_rejected_after_arming() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let err = fx
            .run(&request(ExitType::Completed, "squash"))
            .expect_err("bad strategy");
        assert!(matches!(
            err.downcast_ref::<DoneError>(),
            Some(DoneError::UnknownStrategy(value)) if value == "squash"
        ));
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
    }

    #[test]
    fn non_worker_actor_never_kills_a_session() {
        let fx = Fixture::new(ScriptedWorkspace::missing());
        let mut req = request(ExitType::Completed, "");
        req.actor = "gastown/crew/george".to_string();
        assert!(fx.run(&req).is_err());
        assert!(fx.sessions.killed().is_empty());

        let fx = Fixture::new(ScriptedWorkspace::on_branch("crew/george"));
        fx.run(&req).expect("done");
        assert!(fx.sessions.killed().is_empty());
        assert_eq!(fx.hooks.notices()[0].to, "gastown/witness");
        assert_eq!(fx.hooks.notices()[0].subject, "POLECAT_DONE gastown/crew/george");
    }

    #[test]
    fn escalation_only_notifies_and_keeps_workspace() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let outcome = fx.run(&request(ExitType::Escalated, "")).expect("done");

        assert!(fx.workspace.pushes().is_empty());
        assert!(fx.workspace.teardowns().is_empty());
        assert!(!outcome.torn_down);
        assert!(fx.hooks.notices()[0].body.starts_with("Exit: ESCALATED"));
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
    }

    #[test]
    fn refused_teardown_does_not_fail_completion() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux").failing_teardown());
        let outcome = fx.run(&request(ExitType::Completed, "")).expect("done");
        assert!(!outcome.torn_down);
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
    }

    #[test]
    fn backstop_fires_only_when_armed_and_not_killed() {
        let sessions = RecordingSessions::default();
        drop(CleanupBackstop::new(&sessions, None));
        {
            let mut guard = CleanupBackstop::new(&sessions, Some("gt-a-b".to_string()));
            guard.mark_killed();
        }
        assert!(sessions.killed().is_empty());

        drop(CleanupBackstop::new(&sessions, Some("gt-a-b".to_string())));
        assert_eq!(sessions.killed(), vec!["gt-a-b"]);
    }

    #[test]
    fn policy_is_read_from_named_item() {
        let mut fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let mut convoy = issue("hq-cv-1", ItemStatus::Open);
        convoy.description = "Convoy tracking 1 issues\nMerge: local".to_string();
        fx.ledger = MemoryLedger::new(vec![issue("gt-abc", ItemStatus::InProgress), convoy]);
        let mut req = request(ExitType::Completed, "");
        req.merge_policy = MergePolicy::FromItem("hq-cv-1".to_string());

        let outcome = fx.run(&req).expect("done");
        assert_eq!(outcome.strategy, MergeStrategy::Local);
        assert!(fx.workspace.pushes().is_empty());
    }

    #[test]
    fn unreadable_policy_item_still_kills_session() {
        let fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        let mut req = request(ExitType::Completed, "");
        req.merge_policy = MergePolicy::FromItem("hq-missing".to_string());

        let err = fx.run(&req).expect_err("policy item missing");
        assert!(format!("{err:#}").contains("load policy item hq-missing"), "{err:#}");
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
        assert!(fx.ledger.ops().is_empty());
    }

    #[test]
    fn failed_kill_is_reported_and_backstop_retries() {
        let mut fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.sessions = RecordingSessions::failing_once();

        let err = fx.run(&request(ExitType::Completed, "")).expect_err("kill fails");
        assert!(format!("{err:#}").contains("kill session gt-gastown-nux"), "{err:#}");
        assert_eq!(fx.sessions.killed(), vec!["gt-gastown-nux"]);
        assert!(fx.ledger.labels("gt-abc").is_empty());
    }

    #[test]
    fn failed_close_keeps_checkpoints_for_resume() {
        let mut fx = Fixture::new(ScriptedWorkspace::on_branch("polecat/nux"));
        fx.ledger = MemoryLedger::new(vec![step("gt-mol", 1), step("gt-mol", 2)]);
        fx.ledger.fail_close_once();
        let mut req = request(ExitType::Completed, "");
        req.item_id = "gt-mol.1".to_string();

        let err = fx.run(&req).expect_err("close fails");
        assert!(format!("{err:#}").contains("close step gt-mol.1"), "{err:#}");
        let state = CompletionState::from_labels(&fx.ledger.labels("gt-mol.1"));
        assert_eq!(state.checkpoints.len(), Stage::ALL.len());
        assert!(fx.workspace.teardowns().is_empty());

        let outcome = fx.run(&req).expect("retry");
        assert!(outcome.resumed);
        assert_eq!(outcome.skipped, Stage::ALL.to_vec());
        assert_eq!(fx.workspace.pushes().len(), 1);
        assert_eq!(fx.hooks.submissions().len(), 1);
        assert_eq!(fx.hooks.notices().len(), 1);
        assert!(fx.ledger.labels("gt-mol.1").is_empty());
        assert_eq!(fx.ledger.closed_ids(), vec!["gt-mol.1"]);
    }
}
