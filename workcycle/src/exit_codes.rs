//! Stable exit codes for workcycle CLI commands.

/// Command succeeded, or `next` found a ready step.
pub const OK: i32 = 0;
/// Command failed due to invalid input, config or a collaborator error.
pub const INVALID: i32 = 1;
/// `workcycle next` found every step of the molecule closed.
pub const COMPLETE: i32 = 2;
/// `workcycle next` found outstanding steps but none ready.
pub const BLOCKED: i32 = 3;
