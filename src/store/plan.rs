//! Plan documents - the persisted unit of conversation, workers and graph

use crate::core::{AssignmentRecord, TaskNode, Worker};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Title given to plans that have none
pub const DEFAULT_TITLE: &str = "New Plan";

/// Characters of the first message used as a derived title
const TITLE_CHARS: usize = 30;

/// One persisted plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub created_at: i64,
    /// Conversation turns, opaque to the core
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default, alias = "subAgents")]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub graph: Vec<TaskNode>,
    #[serde(default)]
    pub assignments: Vec<AssignmentRecord>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// Partial replacement of a plan. `None` fields keep the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Only honoured when the plan is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<serde_json::Value>>,
    #[serde(default, alias = "subAgents", skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<Worker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Vec<TaskNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<AssignmentRecord>>,
}

impl PlanUpdate {
    pub fn workers(workers: Vec<Worker>) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    pub fn graph(graph: Vec<TaskNode>) -> Self {
        Self {
            graph: Some(graph),
            ..Self::default()
        }
    }

    pub fn assignments(assignments: Vec<AssignmentRecord>) -> Self {
        Self {
            assignments: Some(assignments),
            ..Self::default()
        }
    }
}

/// Plan fields shown in list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub worker_count: usize,
    pub task_count: usize,
}

impl Plan {
    /// Fresh plan with defaults, stamped now
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: default_title(),
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
            workers: Vec::new(),
            graph: Vec::new(),
            assignments: Vec::new(),
        }
    }

    /// Build a plan from an update when no plan with `id` exists yet
    pub fn create(id: impl Into<String>, update: PlanUpdate) -> Self {
        let mut plan = Self::new(id);
        if let Some(created_at) = update.created_at {
            plan.created_at = created_at;
        }
        plan = plan.apply(update);
        plan.derive_title();
        plan
    }

    /// Field-by-field reducer.
    ///
    /// Each field takes the update's value when present and keeps the
    /// current one otherwise. `id` and `created_at` are never replaced.
    pub fn apply(self, update: PlanUpdate) -> Self {
        Self {
            id: self.id,
            created_at: self.created_at,
            title: update.title.unwrap_or(self.title),
            messages: update.messages.unwrap_or(self.messages),
            workers: update.workers.unwrap_or(self.workers),
            graph: update.graph.unwrap_or(self.graph),
            assignments: update.assignments.unwrap_or(self.assignments),
        }
    }

    /// Replace an empty or default title with the first characters of the
    /// first message, taken as written
    fn derive_title(&mut self) {
        if !self.title.trim().is_empty() && self.title != DEFAULT_TITLE {
            return;
        }
        let first = self
            .messages
            .first()
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .filter(|s| !s.trim().is_empty());

        match first {
            Some(text) => self.title = text.chars().take(TITLE_CHARS).collect(),
            None => self.title = default_title(),
        }
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            worker_count: self.workers.len(),
            task_count: self.graph.len(),
        }
    }
}
