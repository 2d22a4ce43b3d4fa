//! Work unit lifecycle core for multi-agent orchestration.
//!
//! Two jobs live here: deciding which step of a molecule can run next, and
//! driving a worker's crash-safe exit path (push, merge request, integration
//! merge, notification) with checkpoints stored as ledger labels. The crate
//! keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (readiness, ordering, label codec,
//!   strategy plans). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (ledger CLI, git, external hooks,
//!   sessions, state files) behind traits so tests can substitute fakes.
//!
//! Orchestration modules ([`next`], [`done`], [`signal`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod done;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod next;
pub mod signal;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
