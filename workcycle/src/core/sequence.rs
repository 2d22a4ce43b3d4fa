//! Step ordering by the ordinal suffix of step ids.
//!
//! Ledger listing order is not creation order, so every place that needs a
//! deterministic "first step" sorts with [`step_sequence`] as the key.

use tracing::warn;

/// Sort key for ids without a valid `.N` suffix. Such ids sort last.
pub const UNKNOWN_SEQUENCE: u64 = 999_999;

/// Extract the numeric suffix after the last `.` of a step id.
///
/// `"gt-mol.3"` yields 3 and `"gt-mol.12"` yields 12. Ids with no dot, a
/// non-numeric suffix or a trailing dot yield [`UNKNOWN_SEQUENCE`]. This is a
/// sort key only, not a well-formedness check.
pub fn step_sequence(id: &str) -> u64 {
    let Some((_, suffix)) = id.rsplit_once('.') else {
        return UNKNOWN_SEQUENCE;
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return UNKNOWN_SEQUENCE;
    }
    match suffix.parse::<u64>() {
        Ok(n) => n,
        Err(err) => {
            warn!(id, %err, "step sequence out of range");
            UNKNOWN_SEQUENCE
        }
    }
}

/// Stable sort of `items` by the step sequence of the id `key` extracts.
pub fn sort_by_sequence<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by_key(|item| step_sequence(key(item)));
}

/// Stable sort of bare step ids by sequence.
pub fn sort_ids_by_sequence<S: AsRef<str>>(ids: &mut [S]) {
    sort_by_sequence(ids, |id| id.as_ref());
}

/// Return the molecule id of a step id (`<molecule>.<N>`), if it is one.
///
/// The suffix must be a non-empty run of ASCII digits.
pub fn molecule_id_from_step(step_id: &str) -> Option<&str> {
    let (molecule, suffix) = step_id.rsplit_once('.')?;
    if molecule.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(molecule)
}
