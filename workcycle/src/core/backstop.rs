//! Exit-path decisions for the completion protocol.

use crate::core::types::ExitType;

/// Whether the cleanup backstop kills the worker session on function exit.
///
/// Evaluated only from the two flags observed at exit, regardless of which
/// return path was taken.
pub fn should_fire(armed: bool, killed: bool) -> bool {
    armed && !killed
}

/// Whether the worker's workspace may be discarded.
///
/// Never after a failed push: the workspace may hold the only copy of the work.
pub fn should_teardown(exit: ExitType, push_failed: bool) -> bool {
    exit == ExitType::Completed && !push_failed
}
