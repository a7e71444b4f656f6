//! Delegator - task-graph delegation core
//!
//! Named workers, dependency-checked task graphs and assignment records,
//! persisted per plan in a single crash-safe document store.

pub mod config;
pub mod core;
pub mod events;
pub mod orchestrator;
pub mod store;
pub mod tools;

// Re-exports
pub use config::Config;
pub use self::core::{
    AssignError, Assignment, GraphError, PlaceholderExecutor, RegisterOutcome, TaskExecutor,
    TaskNode, TaskStatus, Worker, SELF_WORKER,
};
pub use events::{EventStream, PlanEvent};
pub use orchestrator::{AssignOutcome, Orchestrator, PlanGraphOutcome};
pub use store::{DurableStore, Mutation, Plan, PlanSummary, PlanUpdate, StoreError, StoreOptions};
pub use tools::{ToolReply, ToolRequest};
