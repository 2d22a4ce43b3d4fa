//! Deterministic classification of dependency edge types.

/// Edge types that hold back step progress.
///
/// `parent-child` is deliberately absent: inside a molecule it only encodes
/// the molecule-to-step hierarchy.
pub const BLOCKING_DEP_TYPES: [&str; 3] = ["blocks", "conditional-blocks", "waits-for"];

/// Classify a dependency edge type as blocking or non-blocking.
///
/// This is an allow-list: empty strings, `parent-child`, `tracks`,
/// `relates-to` and any custom or future type are non-blocking.
pub fn is_blocking(dep_type: &str) -> bool {
    BLOCKING_DEP_TYPES.contains(&dep_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_types_are_blocking() {
        assert!(is_blocking("blocks"));
        assert!(is_blocking("conditional-blocks"));
        assert!(is_blocking("waits-for"));
    }

    #[test]
    fn hierarchy_and_tracking_types_are_not_blocking() {
        for dep_type in ["parent-child", "tracks", "relates-to"] {
            assert!(!is_blocking(dep_type), "{dep_type} should not block");
        }
    }

    #[test]
    fn unknown_and_empty_types_default_to_non_blocking() {
        for dep_type in ["", "needs", "depends-on", "Blocks", " blocks", "blocks "] {
            assert!(!is_blocking(dep_type), "{dep_type:?} should not block");
        }
    }
}
