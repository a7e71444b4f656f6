//! Assignment - dispatch of a worker against a planned task
//!
//! The core never runs a task. It checks that the assignment refers to a
//! planned task and a known worker, records it, and hands it to a
//! [`TaskExecutor`] supplied by the caller.

use super::graph::{find_task, TaskNode};
use super::registry::{is_known, worker_names, Worker, SELF_WORKER};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Work handed to an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub worker: String,
    pub task: String,
    pub instructions: String,
}

/// Persisted log entry for an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: u64,
    pub worker: String,
    pub task: String,
    #[serde(default)]
    pub instructions: String,
    pub assigned_at: i64,
    /// Executor outcome, filled in once the executor returns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<serde_json::Value>,
}

/// Why an assignment was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("Error: Task '{task}' does not exist in the graph. Please plan the task first.")]
    UnknownTask { task: String },

    #[error("Error: Worker '{worker}' does not exist. Please create the worker first. Available workers: {}.", format_available(.available))]
    UnknownWorker {
        worker: String,
        available: Vec<String>,
    },
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        format!("none (use '{}' to handle it yourself)", SELF_WORKER)
    } else {
        available.join(", ")
    }
}

/// Check an assignment against the current graph and registry.
/// The task is checked before the worker.
pub fn check_assignment(
    graph: &[TaskNode],
    workers: &[Worker],
    assignment: &Assignment,
) -> Result<(), AssignError> {
    if find_task(graph, &assignment.task).is_none() {
        return Err(AssignError::UnknownTask {
            task: assignment.task.clone(),
        });
    }

    if !is_known(workers, &assignment.worker) {
        return Err(AssignError::UnknownWorker {
            worker: assignment.worker.clone(),
            available: worker_names(workers),
        });
    }

    Ok(())
}

/// Next record id for an assignment log
pub fn next_record_id(log: &[AssignmentRecord]) -> u64 {
    log.iter().map(|r| r.id).max().unwrap_or(0) + 1
}

/// External collaborator that performs an assigned task
pub trait TaskExecutor: Send + Sync {
    /// Run the assignment and return a free-text outcome
    fn execute(&self, assignment: &Assignment) -> impl Future<Output = String> + Send;
}

/// Executor that only acknowledges the hand-off
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExecutor;

impl TaskExecutor for PlaceholderExecutor {
    fn execute(&self, assignment: &Assignment) -> impl Future<Output = String> + Send {
        let outcome = format!(
            "Task '{}' assigned to '{}'. Execution is handled externally.",
            assignment.task, assignment.worker
        );
        async move { outcome }
    }
}
