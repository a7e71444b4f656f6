//! Worker registry - create-or-reuse named workers within a plan

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved worker name meaning "handled by the coordinator itself".
/// Recognized by validation, never stored.
pub const SELF_WORKER: &str = "__self__";

/// A named, reusable role definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub name: String,
    #[serde(default, alias = "system_prompt")]
    pub role: String,
}

impl Worker {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

/// Result of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    Created,
    Updated,
    Reused,
    /// Name was the reserved sentinel
    Rejected,
    /// Name was empty or whitespace
    InvalidName,
}

impl RegisterOutcome {
    /// Whether the registry changed
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    /// Whether the registration was allowed, written or not
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected | Self::InvalidName)
    }

    /// Confirmation string shown to the caller
    pub fn message(&self, name: &str) -> String {
        match self {
            Self::Created => format!("Worker '{}' created successfully.", name),
            Self::Updated => format!("Worker '{}' updated successfully.", name),
            Self::Reused => format!("Worker '{}' reused.", name),
            Self::Rejected => format!(
                "Worker name '{}' is reserved for self-delegation.",
                SELF_WORKER
            ),
            Self::InvalidName => "Worker name must not be empty.".to_string(),
        }
    }
}

impl fmt::Display for RegisterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Reused => write!(f, "reused"),
            Self::Rejected => write!(f, "rejected"),
            Self::InvalidName => write!(f, "invalid_name"),
        }
    }
}

/// Apply a registration to a worker list in place.
///
/// The list is only touched when the outcome is `Created` or `Updated`.
/// Blank names and the sentinel are refused before any lookup.
/// Roles are compared after trimming; an empty incoming role never
/// overwrites a stored one.
pub fn register(workers: &mut Vec<Worker>, name: &str, role: &str) -> RegisterOutcome {
    if name.trim().is_empty() {
        return RegisterOutcome::InvalidName;
    }
    if name == SELF_WORKER {
        return RegisterOutcome::Rejected;
    }

    match workers.iter_mut().find(|w| w.name == name) {
        Some(existing) => {
            let incoming = role.trim();
            if !incoming.is_empty() && incoming != existing.role.trim() {
                existing.role = role.to_string();
                RegisterOutcome::Updated
            } else {
                RegisterOutcome::Reused
            }
        }
        None => {
            workers.push(Worker::new(name, role));
            RegisterOutcome::Created
        }
    }
}

/// Whether `name` may be assigned work: the sentinel or a registered worker
pub fn is_known(workers: &[Worker], name: &str) -> bool {
    name == SELF_WORKER || workers.iter().any(|w| w.name == name)
}

/// Registered worker names in registration order
pub fn worker_names(workers: &[Worker]) -> Vec<String> {
    workers.iter().map(|w| w.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_reuse() {
        let mut workers = Vec::new();
        assert_eq!(
            register(&mut workers, "researcher", "gathers facts"),
            RegisterOutcome::Created
        );
        assert_eq!(
            register(&mut workers, "researcher", "gathers facts"),
            RegisterOutcome::Reused
        );
        assert_eq!(workers, vec![Worker::new("researcher", "gathers facts")]);
    }

    #[test]
    fn test_update_on_different_role() {
        let mut workers = vec![Worker::new("writer", "drafts text")];
        assert_eq!(
            register(&mut workers, "writer", "edits text"),
            RegisterOutcome::Updated
        );
        assert_eq!(workers[0].role, "edits text");
    }

    #[test]
    fn test_whitespace_and_empty_role_reuse() {
        let mut workers = vec![Worker::new("writer", "drafts text")];
        assert_eq!(
            register(&mut workers, "writer", "  drafts text \n"),
            RegisterOutcome::Reused
        );
        assert_eq!(register(&mut workers, "writer", "   "), RegisterOutcome::Reused);
        assert_eq!(workers[0].role, "drafts text");
    }

    #[test]
    fn test_sentinel_rejected() {
        let mut workers = Vec::new();
        let outcome = register(&mut workers, SELF_WORKER, "me");
        assert_eq!(outcome, RegisterOutcome::Rejected);
        assert!(!outcome.is_write());
        assert!(workers.is_empty());
        assert!(outcome.message(SELF_WORKER).contains("reserved"));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut workers = vec![Worker::new("a", "")];
        for name in ["", "   ", "\t\n"] {
            let outcome = register(&mut workers, name, "role");
            assert_eq!(outcome, RegisterOutcome::InvalidName);
            assert!(!outcome.is_write());
            assert!(!outcome.is_accepted());
        }
        assert_eq!(workers, vec![Worker::new("a", "")]);
        assert!(RegisterOutcome::InvalidName.message("").contains("empty"));
        assert!(RegisterOutcome::Reused.is_accepted());
    }

    #[test]
    fn test_is_known() {
        let workers = vec![Worker::new("a", "")];
        assert!(is_known(&workers, "a"));
        assert!(is_known(&workers, SELF_WORKER));
        assert!(!is_known(&workers, "b"));
    }

    #[test]
    fn test_legacy_field_name() {
        let w: Worker = serde_json::from_str(r#"{"name":"x","system_prompt":"role"}"#).unwrap();
        assert_eq!(w.role, "role");
    }
}
