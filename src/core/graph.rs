//! Task graph - dependency-checked task nodes and whole-graph validation
//!
//! A graph is always submitted as a full set of nodes. It is validated as a
//! unit and either accepted wholesale or rejected with the first violation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Task status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A single unit of work. `task` doubles as the node identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskNode {
    pub fn new(task: impl Into<String>, dependencies: &[&str], status: TaskStatus) -> Self {
        Self {
            task: task.into(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            status,
        }
    }
}

/// First rule a proposed graph breaks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Error: Duplicate task '{task}'. Task names must be unique within the graph.")]
    DuplicateTask { task: String },

    #[error("Error: Task '{task}' depends on '{dependency}', which is not in the graph. Please plan it first.")]
    MissingDependency { task: String, dependency: String },

    #[error("Error: Task '{task}' cannot depend on itself.")]
    SelfDependency { task: String },

    #[error("Error: Cannot start task '{task}' because its dependency '{dependency}' is {status}, not completed.")]
    DependencyNotCompleted {
        task: String,
        dependency: String,
        status: TaskStatus,
    },
}

/// Validate a proposed graph.
///
/// Checks run in a fixed order and stop at the first violation:
/// uniqueness, dependency existence, self-dependency, then readiness of
/// every `in_progress` node. An empty graph is always valid.
pub fn validate_graph(nodes: &[TaskNode]) -> Result<(), GraphError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.task.as_str()) {
            return Err(GraphError::DuplicateTask {
                task: node.task.clone(),
            });
        }
    }

    for node in nodes {
        if let Some(missing) = node.dependencies.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(GraphError::MissingDependency {
                task: node.task.clone(),
                dependency: missing.clone(),
            });
        }
    }

    if let Some(node) = nodes.iter().find(|n| n.dependencies.contains(&n.task)) {
        return Err(GraphError::SelfDependency {
            task: node.task.clone(),
        });
    }

    for node in nodes.iter().filter(|n| n.status == TaskStatus::InProgress) {
        for dep in &node.dependencies {
            // Existence was checked above
            let Some(dep_node) = find_task(nodes, dep) else {
                continue;
            };
            if dep_node.status != TaskStatus::Completed {
                return Err(GraphError::DependencyNotCompleted {
                    task: node.task.clone(),
                    dependency: dep.clone(),
                    status: dep_node.status,
                });
            }
        }
    }

    Ok(())
}

/// Look up a node by task name
pub fn find_task<'a>(nodes: &'a [TaskNode], task: &str) -> Option<&'a TaskNode> {
    nodes.iter().find(|n| n.task == task)
}

/// Pending tasks whose dependencies are all completed, in graph order
pub fn ready_tasks(nodes: &[TaskNode]) -> Vec<&TaskNode> {
    nodes
        .iter()
        .filter(|node| node.status == TaskStatus::Pending)
        .filter(|node| {
            node.dependencies.iter().all(|dep| {
                find_task(nodes, dep)
                    .map(|d| d.status == TaskStatus::Completed)
                    .unwrap_or(false)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::*;

    #[test]
    fn test_empty_graph_is_valid() {
        assert!(validate_graph(&[]).is_ok());
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let nodes = vec![
            TaskNode::new("A", &[], Pending),
            TaskNode::new("B", &[], Pending),
            TaskNode::new("A", &[], Completed),
        ];
        let err = validate_graph(&nodes).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask { task: "A".into() });
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_missing_dependency_names_dependency_and_referrer() {
        let nodes = vec![
            TaskNode::new("A", &[], Pending),
            TaskNode::new("B", &["A", "ghost"], Pending),
        ];
        let err = validate_graph(&nodes).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                task: "B".into(),
                dependency: "ghost".into()
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("'ghost'"));
        assert!(msg.contains("'B'"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let nodes = vec![TaskNode::new("A", &[], Pending), TaskNode::new("B", &["B"], Pending)];
        assert_eq!(
            validate_graph(&nodes).unwrap_err(),
            GraphError::SelfDependency { task: "B".into() }
        );
    }

    #[test]
    fn test_duplicate_checked_before_dependencies() {
        let nodes = vec![
            TaskNode::new("A", &["missing"], Pending),
            TaskNode::new("A", &[], Pending),
        ];
        assert!(matches!(
            validate_graph(&nodes),
            Err(GraphError::DuplicateTask { .. })
        ));
    }

    #[test]
    fn test_in_progress_requires_completed_dependencies() {
        let mut nodes = vec![
            TaskNode::new("A", &[], Pending),
            TaskNode::new("B", &["A"], InProgress),
        ];
        let err = validate_graph(&nodes).unwrap_err();
        assert_eq!(
            err,
            GraphError::DependencyNotCompleted {
                task: "B".into(),
                dependency: "A".into(),
                status: Pending,
            }
        );
        assert!(err.to_string().contains("is pending"));

        nodes[0].status = Completed;
        assert!(validate_graph(&nodes).is_ok());
    }

    #[test]
    fn test_in_progress_dependency_also_blocks() {
        let nodes = vec![
            TaskNode::new("A", &[], InProgress),
            TaskNode::new("B", &["A"], InProgress),
        ];
        assert!(matches!(
            validate_graph(&nodes),
            Err(GraphError::DependencyNotCompleted { status: InProgress, .. })
        ));
    }

    #[test]
    fn test_completed_and_pending_carry_no_constraint() {
        let nodes = vec![
            TaskNode::new("A", &[], Pending),
            TaskNode::new("B", &["A"], Completed),
            TaskNode::new("C", &["B"], Pending),
        ];
        assert!(validate_graph(&nodes).is_ok());
    }

    #[test]
    fn test_ready_tasks() {
        let nodes = vec![
            TaskNode::new("A", &[], Completed),
            TaskNode::new("B", &["A"], Pending),
            TaskNode::new("C", &["B"], Pending),
            TaskNode::new("D", &[], Pending),
            TaskNode::new("E", &[], InProgress),
        ];
        let ready: Vec<&str> = ready_tasks(&nodes).iter().map(|n| n.task.as_str()).collect();
        assert_eq!(ready, vec!["B", "D"]);
    }

    #[test]
    fn test_status_serialization() {
        let node = TaskNode::new("A", &[], InProgress);
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"in_progress\""));

        let parsed: TaskNode =
            serde_json::from_str(r#"{"task":"X","status":"in-progress"}"#).unwrap();
        assert_eq!(parsed.status, InProgress);
        assert!(parsed.dependencies.is_empty());
    }
}
