//! Plan persistence - document model and the serialized file store

pub mod durable;
pub mod plan;

pub use durable::{DurableStore, InjectedFault, Mutation, StoreError, StoreOptions};
pub use plan::{Plan, PlanSummary, PlanUpdate, DEFAULT_TITLE};
