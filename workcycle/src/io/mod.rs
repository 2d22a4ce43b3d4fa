//! Side-effecting adapters: ledger, git, external hooks, sessions, files.

pub mod atomic;
pub mod config;
pub mod git;
pub mod hooks;
pub mod ledger;
pub mod ledger_file;
pub mod process;
pub mod session;
pub mod stop_state;
