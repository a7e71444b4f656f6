//! Core model - task graph validation, worker registry, assignments

pub mod assign;
pub mod graph;
pub mod registry;

pub use assign::{
    check_assignment, AssignError, Assignment, AssignmentRecord, PlaceholderExecutor,
    TaskExecutor,
};
pub use graph::{find_task, ready_tasks, validate_graph, GraphError, TaskNode, TaskStatus};
pub use registry::{register, RegisterOutcome, Worker, SELF_WORKER};
