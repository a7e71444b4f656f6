//! Plan events for UI and automation consumers
//!
//! JSON-serializable notifications emitted after a plan changes.

use crate::core::RegisterOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Something that changed in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    /// A worker was created or had its role replaced
    WorkerRegistered {
        plan_id: String,
        name: String,
        outcome: RegisterOutcome,
    },
    /// The graph was replaced
    GraphUpdated { plan_id: String, task_count: usize },
    /// The graph was emptied
    GraphCleared { plan_id: String },
    /// A worker was dispatched against a task
    TaskAssigned {
        plan_id: String,
        record_id: u64,
        worker: String,
        task: String,
    },
    /// The executor returned for an assignment
    AssignmentFinished {
        plan_id: String,
        record_id: u64,
        outcome: String,
    },
    PlanDeleted { plan_id: String },
}

impl PlanEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            Self::WorkerRegistered { plan_id, .. }
            | Self::GraphUpdated { plan_id, .. }
            | Self::GraphCleared { plan_id }
            | Self::TaskAssigned { plan_id, .. }
            | Self::AssignmentFinished { plan_id, .. }
            | Self::PlanDeleted { plan_id } => plan_id,
        }
    }

    /// Serialize to JSON line
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Broadcast-based event stream for multiple consumers
#[derive(Clone)]
pub struct EventStream {
    tx: broadcast::Sender<PlanEvent>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: PlanEvent) {
        log::debug!("Plan event: {}", event.to_json_line());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(256)
    }
}
