//! Worker identity parsing from actor addresses.

use std::fmt;

const WORKER_SEGMENT: &str = "polecats";

/// An ephemeral worker, addressed as `<rig>/polecats/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    pub rig: String,
    pub name: String,
}

impl WorkerIdentity {
    /// Parse a worker actor. Any other role (crew, witness, refinery, mayor)
    /// yields `None`, even if its name happens to be a worker-like word.
    pub fn parse(actor: &str) -> Option<Self> {
        let mut parts = actor.split('/');
        let rig = parts.next()?;
        let segment = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() || segment != WORKER_SEGMENT {
            return None;
        }
        if rig.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            rig: rig.to_string(),
            name: name.to_string(),
        })
    }

    /// Supervisor session hosting this worker, e.g. `gt-gastown-furiosa`.
    pub fn session_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}-{}", self.rig, self.name)
    }

    /// Mail address of the rig's witness, which receives completion notices.
    pub fn witness_address(&self) -> String {
        format!("{}/witness", self.rig)
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{WORKER_SEGMENT}/{}", self.rig, self.name)
    }
}

/// Rig segment of a rig-scoped actor (`<rig>/...`).
pub fn rig_of(actor: &str) -> Option<&str> {
    match actor.split_once('/') {
        Some((rig, _)) if !rig.is_empty() => Some(rig),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_worker_actors() {
        for actor in [
            "testrig/polecats/furiosa",
            "testrig/polecats/nux",
            "myrig/polecats/witness",
        ] {
            assert!(WorkerIdentity::parse(actor).is_some(), "{actor}");
        }
    }

    #[test]
    fn rejects_other_roles_and_malformed_actors() {
        for actor in [
            "gastown/crew/george",
            "testrig/witness",
            "testrig/deacon",
            "gastown/refinery",
            "",
            "single",
            "polecats/name",
            "/polecats/name",
            "rig/polecats/",
            "rig/polecats/name/extra",
        ] {
            assert!(WorkerIdentity::parse(actor).is_none(), "{actor:?}");
        }
    }

    #[test]
    fn rig_of_requires_rig_scope() {
        assert_eq!(rig_of("gastown/crew/george"), Some("gastown"));
        assert_eq!(rig_of("gastown/witness"), Some("gastown"));
        assert_eq!(rig_of("mayor"), None);
        assert_eq!(rig_of("/polecats/nux"), None);
    }

    #[test]
    fn derives_session_and_addresses() {
        let worker = WorkerIdentity::parse("gastown/polecats/furiosa").expect("worker");
        assert_eq!(worker.session_name("gt"), "gt-gastown-furiosa");
        assert_eq!(worker.witness_address(), "gastown/witness");
        assert_eq!(worker.to_string(), "gastown/polecats/furiosa");
    }
}
