//! Work unit lifecycle CLI.
//!
//! Thin command layer over the `workcycle` library: resolve the next step of
//! a molecule, run the completion protocol for a finished work item, inspect
//! completion checkpoints, and answer the turn-boundary hook.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::warn;

use workcycle::core::checkpoint::CompletionState;
use workcycle::core::resolver::StepOutcome;
use workcycle::core::strategy::{MergeStrategy, parse_merge_strategy};
use workcycle::core::types::ExitType;
use workcycle::done::{
    Collaborators, DoneError, DoneOutcome, DoneRequest, DoneSettings, MergePolicy, run_done,
};
use workcycle::exit_codes;
use workcycle::io::config::{DEFAULT_CONFIG_PATH, WorkcycleConfig, load_config};
use workcycle::io::git::GitWorkspace;
use workcycle::io::hooks::CommandHooks;
use workcycle::io::ledger::{BdLedger, Ledger};
use workcycle::io::ledger_file::FileLedger;
use workcycle::io::process::CommandLimits;
use workcycle::io::session::TmuxSessions;
use workcycle::io::stop_state::stop_state_path;
use workcycle::logging;
use workcycle::next::find_next_step;
use workcycle::signal::{StopDecision, check_turn_boundary, decide};

/// Environment variable naming the worker's branch when its workspace is gone.
const BRANCH_ENV: &str = "GT_BRANCH";

#[derive(Parser)]
#[command(
    name = "workcycle",
    version,
    about = "Molecule step resolution and crash-safe work completion"
)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use a JSON ledger file instead of the ledger CLI.
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the next ready step of a molecule.
    Next {
        molecule_id: String,
    },
    /// Run the completion protocol for a work item.
    Done {
        item_id: String,
        /// COMPLETED, ESCALATED, DEFERRED or PHASE_COMPLETE.
        #[arg(long, value_parser = parse_exit)]
        exit: ExitType,
        /// Caller address, e.g. `gastown/polecats/nux`.
        #[arg(long)]
        actor: String,
        /// Policy text containing a `Merge: <strategy>` line.
        #[arg(long, conflicts_with = "policy_from")]
        policy: Option<String>,
        /// Read the policy text from this item's description.
        #[arg(long)]
        policy_from: Option<String>,
        /// Worker workspace.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Print decoded completion checkpoints of an item as JSON.
    Checkpoints {
        item_id: String,
    },
    /// Print the merge strategy selected by policy text.
    Strategy {
        text: String,
    },
    /// Turn-boundary hook: print a JSON approve/block decision.
    SignalStop {
        #[arg(long)]
        actor: String,
    },
}

fn parse_exit(value: &str) -> Result<ExitType, String> {
    value.parse()
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if let Some(DoneError::BranchUnavailable) = err.downcast_ref::<DoneError>() {
                eprintln!("{err:#} (set {BRANCH_ENV} when the workspace is gone)");
            } else {
                eprintln!("{err:#}");
            }
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let ledger = open_ledger(&cfg, cli.ledger.as_deref());
    match cli.command {
        Command::Next { molecule_id } => cmd_next(ledger.as_ref(), &molecule_id),
        Command::Done {
            item_id,
            exit,
            actor,
            policy,
            policy_from,
            workdir,
        } => {
            let merge_policy = match (policy, policy_from) {
                (Some(text), _) => MergePolicy::Value(parse_merge_strategy(&text)),
                (None, Some(id)) => MergePolicy::FromItem(id),
                (None, None) => MergePolicy::default(),
            };
            let request = DoneRequest {
                item_id,
                exit,
                actor,
                merge_policy,
                fallback_branch: std::env::var(BRANCH_ENV).ok(),
            };
            cmd_done(&cfg, ledger.as_ref(), &request, &workdir)
        }
        Command::Checkpoints { item_id } => cmd_checkpoints(ledger.as_ref(), &item_id),
        Command::Strategy { text } => cmd_strategy(&text),
        Command::SignalStop { actor } => cmd_signal_stop(&cfg, ledger.as_ref(), &actor),
    }
}

fn open_ledger(cfg: &WorkcycleConfig, file: Option<&Path>) -> Box<dyn Ledger + Sync> {
    match file {
        Some(path) => Box::new(FileLedger::new(path)),
        None => Box::new(BdLedger::new(
            cfg.ledger.command.clone(),
            CommandLimits::from_config(cfg),
        )),
    }
}

fn cmd_next(ledger: &dyn Ledger, molecule_id: &str) -> Result<i32> {
    match find_next_step(ledger, molecule_id)? {
        StepOutcome::Ready(step) => {
            println!("{}", step.id);
            Ok(exit_codes::OK)
        }
        StepOutcome::Complete => {
            eprintln!("molecule {molecule_id} complete");
            Ok(exit_codes::COMPLETE)
        }
        StepOutcome::Blocked { waiting } => {
            eprintln!("molecule {molecule_id} blocked on: {}", waiting.join(", "));
            Ok(exit_codes::BLOCKED)
        }
    }
}

fn cmd_done(
    cfg: &WorkcycleConfig,
    ledger: &dyn Ledger,
    request: &DoneRequest,
    workdir: &Path,
) -> Result<i32> {
    let limits = CommandLimits::from_config(cfg);
    let workspace = GitWorkspace::new(workdir, cfg.remote.clone());
    let hooks = CommandHooks::new(cfg.hooks.clone(), limits);
    let sessions = TmuxSessions::new(limits);
    let deps = Collaborators {
        ledger,
        workspace: &workspace,
        merge_queue: &hooks,
        integrator: &hooks,
        notifier: &hooks,
        sessions: &sessions,
    };
    let outcome = run_done(request, &DoneSettings::from_config(cfg), &deps)?;
    print_done(&outcome);
    Ok(exit_codes::OK)
}

fn print_done(outcome: &DoneOutcome) {
    println!(
        "{} {} ({} strategy, branch {})",
        outcome.item_id, outcome.exit, outcome.strategy, outcome.branch
    );
    for stage in &outcome.skipped {
        println!("skipped {stage}: already done");
    }
    if let Some(id) = &outcome.merge_request {
        println!("merge request {id}");
    }
    match &outcome.next {
        Some(StepOutcome::Ready(step)) => println!("next step {}", step.id),
        Some(StepOutcome::Complete) => println!("molecule complete"),
        Some(StepOutcome::Blocked { waiting }) => {
            println!("molecule blocked on {}", waiting.join(", "));
        }
        None => {}
    }
    if outcome.torn_down {
        println!("workspace removed");
    }
}

fn cmd_checkpoints(ledger: &dyn Ledger, item_id: &str) -> Result<i32> {
    let item = ledger
        .show(item_id)
        .with_context(|| format!("load work item {item_id}"))?;
    let state = CompletionState::from_labels(&item.labels);
    let json = serde_json::to_string_pretty(&state).context("serialize checkpoints")?;
    println!("{json}");
    Ok(exit_codes::OK)
}

fn cmd_strategy(text: &str) -> Result<i32> {
    let value = parse_merge_strategy(text);
    let strategy = MergeStrategy::from_policy(&value).map_err(|err| anyhow!(err))?;
    println!("{strategy}");
    Ok(exit_codes::OK)
}

fn cmd_signal_stop(cfg: &WorkcycleConfig, ledger: &(dyn Ledger + Sync), actor: &str) -> Result<i32> {
    let hooks = CommandHooks::new(cfg.hooks.clone(), CommandLimits::from_config(cfg));
    let reason = check_turn_boundary(&hooks, ledger, actor);
    let state_path = stop_state_path(&std::env::temp_dir(), actor);
    let decision = decide(reason, &state_path).unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "stop state unavailable, approving");
        StopDecision::approve()
    });
    let json = serde_json::to_string(&decision).context("serialize stop decision")?;
    println!("{json}");
    Ok(exit_codes::OK)
}
