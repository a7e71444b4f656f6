//! Orchestrator - the tool operations of one plan
//!
//! Every operation is a single `mutate` on the store: the current plan is
//! read, the change is checked against it, and it is written back only when
//! the check passes. Rejections come back as values and never write.

use crate::core::assign::next_record_id;
use crate::core::{
    check_assignment, ready_tasks, registry, validate_graph, AssignError, Assignment,
    AssignmentRecord, GraphError, PlaceholderExecutor, RegisterOutcome, TaskExecutor, TaskNode,
};
use crate::events::{EventStream, PlanEvent};
use crate::store::{DurableStore, Mutation, Plan, PlanUpdate, StoreError};
use crate::tools::{ToolReply, ToolRequest};
use chrono::Utc;

/// Result of submitting a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanGraphOutcome {
    Cleared,
    Updated { task_count: usize },
    Rejected(GraphError),
}

impl PlanGraphOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn message(&self) -> String {
        match self {
            Self::Cleared => "Task graph cleared.".to_string(),
            Self::Updated { task_count } => format!("Task graph updated ({} tasks).", task_count),
            Self::Rejected(err) => err.to_string(),
        }
    }
}

/// Result of an assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Completed { record_id: u64, outcome: String },
    Rejected(AssignError),
}

impl AssignOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Completed { outcome, .. } => outcome.clone(),
            Self::Rejected(err) => err.to_string(),
        }
    }
}

/// Tool operations bound to one plan
pub struct Orchestrator<E = PlaceholderExecutor> {
    store: DurableStore,
    plan_id: String,
    executor: E,
    events: EventStream,
}

impl Orchestrator<PlaceholderExecutor> {
    /// Orchestrator that acknowledges assignments without running them
    pub fn new(store: DurableStore, plan_id: impl Into<String>) -> Self {
        Self::with_executor(store, plan_id, PlaceholderExecutor)
    }
}

impl<E: TaskExecutor> Orchestrator<E> {
    pub fn with_executor(store: DurableStore, plan_id: impl Into<String>, executor: E) -> Self {
        Self {
            store,
            plan_id: plan_id.into(),
            executor,
            events: EventStream::default(),
        }
    }

    /// Publish events on a shared stream
    pub fn with_events(mut self, events: EventStream) -> Self {
        self.events = events;
        self
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Current plan document, if it has been saved
    pub async fn plan(&self) -> Result<Option<Plan>, StoreError> {
        self.store.get_plan(&self.plan_id).await
    }

    /// Pending tasks whose dependencies are all completed
    pub async fn ready_tasks(&self) -> Result<Vec<TaskNode>, StoreError> {
        let graph = self.plan().await?.map(|p| p.graph).unwrap_or_default();
        Ok(ready_tasks(&graph).into_iter().cloned().collect())
    }

    /// Create, update or reuse a named worker
    pub async fn register_worker(
        &self,
        name: &str,
        role: &str,
    ) -> Result<RegisterOutcome, StoreError> {
        let (name_owned, role_owned) = (name.to_string(), role.to_string());
        let outcome = self
            .store
            .mutate(&self.plan_id, move |plan| {
                let mut workers = plan.workers;
                let outcome = registry::register(&mut workers, &name_owned, &role_owned);
                if outcome.is_write() {
                    Mutation::commit(outcome, PlanUpdate::workers(workers))
                } else {
                    Mutation::skip(outcome)
                }
            })
            .await?;

        log::info!("[{}] Worker '{}': {}", self.plan_id, name, outcome);
        if outcome.is_write() {
            self.events.emit(PlanEvent::WorkerRegistered {
                plan_id: self.plan_id.clone(),
                name: name.to_string(),
                outcome,
            });
        }
        Ok(outcome)
    }

    /// Remove the plan document. Returns whether it existed.
    pub async fn delete_plan(&self) -> Result<bool, StoreError> {
        let existed = self.store.delete_plan(&self.plan_id).await?;
        if existed {
            log::info!("[{}] Plan deleted", self.plan_id);
            self.events.emit(PlanEvent::PlanDeleted {
                plan_id: self.plan_id.clone(),
            });
        }
        Ok(existed)
    }

    /// Replace the task graph wholesale, or clear it when `nodes` is empty
    pub async fn plan_graph(&self, nodes: Vec<TaskNode>) -> Result<PlanGraphOutcome, StoreError> {
        let outcome = self
            .store
            .mutate(&self.plan_id, move |_plan| {
                if nodes.is_empty() {
                    return Mutation::commit(PlanGraphOutcome::Cleared, PlanUpdate::graph(Vec::new()));
                }
                match validate_graph(&nodes) {
                    Ok(()) => Mutation::commit(
                        PlanGraphOutcome::Updated {
                            task_count: nodes.len(),
                        },
                        PlanUpdate::graph(nodes),
                    ),
                    Err(err) => Mutation::skip(PlanGraphOutcome::Rejected(err)),
                }
            })
            .await?;

        match &outcome {
            PlanGraphOutcome::Cleared => {
                log::info!("[{}] Task graph cleared", self.plan_id);
                self.events.emit(PlanEvent::GraphCleared {
                    plan_id: self.plan_id.clone(),
                });
            }
            PlanGraphOutcome::Updated { task_count } => {
                log::info!("[{}] Task graph updated: {} tasks", self.plan_id, task_count);
                self.events.emit(PlanEvent::GraphUpdated {
                    plan_id: self.plan_id.clone(),
                    task_count: *task_count,
                });
            }
            PlanGraphOutcome::Rejected(err) => {
                log::warn!("[{}] Task graph rejected: {}", self.plan_id, err);
            }
        }
        Ok(outcome)
    }

    /// Record a dispatch and hand it to the executor.
    ///
    /// The record is committed before the executor runs; its outcome is
    /// attached in a second write once the executor returns.
    pub async fn assign(
        &self,
        worker: &str,
        task: &str,
        instructions: &str,
    ) -> Result<AssignOutcome, StoreError> {
        let assignment = Assignment {
            worker: worker.to_string(),
            task: task.to_string(),
            instructions: instructions.to_string(),
        };

        let pending = assignment.clone();
        let recorded = self
            .store
            .mutate(&self.plan_id, move |plan| {
                if let Err(err) = check_assignment(&plan.graph, &plan.workers, &pending) {
                    return Mutation::skip(Err(err));
                }
                let mut records = plan.assignments;
                let record_id = next_record_id(&records);
                records.push(AssignmentRecord {
                    id: record_id,
                    worker: pending.worker,
                    task: pending.task,
                    instructions: pending.instructions,
                    assigned_at: Utc::now().timestamp_millis(),
                    outcome: None,
                });
                Mutation::commit(Ok(record_id), PlanUpdate::assignments(records))
            })
            .await?;

        let record_id = match recorded {
            Ok(record_id) => record_id,
            Err(err) => {
                log::warn!("[{}] Assignment rejected: {}", self.plan_id, err);
                return Ok(AssignOutcome::Rejected(err));
            }
        };

        log::info!(
            "[{}] Assigned task '{}' to '{}' (#{})",
            self.plan_id,
            task,
            worker,
            record_id
        );
        self.events.emit(PlanEvent::TaskAssigned {
            plan_id: self.plan_id.clone(),
            record_id,
            worker: assignment.worker.clone(),
            task: assignment.task.clone(),
        });

        let outcome = self.executor.execute(&assignment).await;

        let stored = outcome.clone();
        let attached = self
            .store
            .mutate(&self.plan_id, move |plan| {
                let mut records = plan.assignments;
                match records.iter_mut().find(|r| r.id == record_id) {
                    Some(record) => {
                        record.outcome = Some(serde_json::Value::String(stored));
                        Mutation::commit(true, PlanUpdate::assignments(records))
                    }
                    None => Mutation::skip(false),
                }
            })
            .await?;
        if !attached {
            log::warn!(
                "[{}] Assignment #{} vanished before its outcome was recorded",
                self.plan_id,
                record_id
            );
        }

        self.events.emit(PlanEvent::AssignmentFinished {
            plan_id: self.plan_id.clone(),
            record_id,
            outcome: outcome.clone(),
        });
        Ok(AssignOutcome::Completed { record_id, outcome })
    }

    /// Run one tool request and render its reply
    pub async fn dispatch(&self, request: ToolRequest) -> Result<ToolReply, StoreError> {
        let tool = request.name();
        if let Err(err) = request.validate() {
            return Ok(ToolReply::rejected(tool, err.to_string()));
        }

        let reply = match request {
            ToolRequest::RegisterWorker { name, role } => {
                let outcome = self.register_worker(&name, &role).await?;
                let message = outcome.message(&name);
                if outcome.is_accepted() {
                    ToolReply::ok(tool, message)
                } else {
                    ToolReply::rejected(tool, message)
                }
            }
            ToolRequest::PlanGraph { nodes } => {
                let outcome = self.plan_graph(nodes).await?;
                if outcome.is_accepted() {
                    ToolReply::ok(tool, outcome.message())
                } else {
                    ToolReply::rejected(tool, outcome.message())
                }
            }
            ToolRequest::Assign {
                worker,
                task,
                instructions,
            } => {
                let outcome = self.assign(&worker, &task, &instructions).await?;
                if outcome.is_accepted() {
                    ToolReply::ok(tool, outcome.message())
                } else {
                    ToolReply::rejected(tool, outcome.message())
                }
            }
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskStatus, SELF_WORKER};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;

    fn orchestrator(dir: &tempfile::TempDir) -> Orchestrator {
        let store = DurableStore::open(dir.path().join("plans.json"));
        Orchestrator::new(store, "p1")
    }

    #[tokio::test]
    async fn test_register_worker_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);

        assert_eq!(
            orch.register_worker("researcher", "gathers facts").await.unwrap(),
            RegisterOutcome::Created
        );
        assert_eq!(
            orch.register_worker("researcher", "gathers facts").await.unwrap(),
            RegisterOutcome::Reused
        );
        assert_eq!(
            orch.register_worker("researcher", "checks facts").await.unwrap(),
            RegisterOutcome::Updated
        );
        assert_eq!(
            orch.register_worker(SELF_WORKER, "me").await.unwrap(),
            RegisterOutcome::Rejected
        );
        assert_eq!(
            orch.register_worker("  ", "blank").await.unwrap(),
            RegisterOutcome::InvalidName
        );

        let plan = orch.plan().await.unwrap().unwrap();
        assert_eq!(plan.workers.len(), 1);
        assert_eq!(plan.workers[0].role, "checks facts");
    }

    #[tokio::test]
    async fn test_rejected_graph_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let outcome = orch
            .plan_graph(vec![
                TaskNode::new("A", &[], TaskStatus::Pending),
                TaskNode::new("A", &[], TaskStatus::Pending),
            ])
            .await
            .unwrap();
        assert!(!outcome.is_accepted());
        assert!(orch.plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ready_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        orch.plan_graph(vec![
            TaskNode::new("A", &[], TaskStatus::Completed),
            TaskNode::new("B", &["A"], TaskStatus::Pending),
            TaskNode::new("C", &["B"], TaskStatus::Pending),
        ])
        .await
        .unwrap();

        let ready: Vec<String> = orch
            .ready_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.task)
            .collect();
        assert_eq!(ready, vec!["B"]);
    }

    struct CountingExecutor(Arc<AtomicUsize>);

    impl TaskExecutor for CountingExecutor {
        fn execute(
            &self,
            assignment: &Assignment,
        ) -> impl std::future::Future<Output = String> + Send {
            self.0.fetch_add(1, Ordering::SeqCst);
            let reply = format!("{} finished: {}", assignment.worker, assignment.instructions);
            async move { reply }
        }
    }

    #[tokio::test]
    async fn test_assign_records_executor_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let store = DurableStore::open(dir.path().join("plans.json"));
        let orch = Orchestrator::with_executor(store, "p1", CountingExecutor(calls.clone()));

        orch.register_worker("writer", "drafts").await.unwrap();
        orch.plan_graph(vec![TaskNode::new("draft", &[], TaskStatus::Pending)])
            .await
            .unwrap();

        let outcome = orch.assign("writer", "draft", "write intro").await.unwrap();
        assert_eq!(
            outcome,
            AssignOutcome::Completed {
                record_id: 1,
                outcome: "writer finished: write intro".to_string()
            }
        );

        let rejected = orch.assign("ghost", "draft", "x").await.unwrap();
        assert!(!rejected.is_accepted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let plan = orch.plan().await.unwrap().unwrap();
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(
            plan.assignments[0].outcome,
            Some(serde_json::Value::String(
                "writer finished: write intro".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_events_emitted_for_writes_only() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let mut rx = orch.events().subscribe();

        orch.register_worker("w", "r").await.unwrap();
        orch.register_worker("w", "r").await.unwrap();
        orch.plan_graph(Vec::new()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            PlanEvent::WorkerRegistered {
                outcome: RegisterOutcome::Created,
                ..
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PlanEvent::GraphCleared { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_emits_only_when_plan_existed() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let mut rx = orch.events().subscribe();

        assert!(!orch.delete_plan().await.unwrap());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        orch.register_worker("w", "r").await.unwrap();
        rx.recv().await.unwrap();

        assert!(orch.delete_plan().await.unwrap());
        assert_eq!(
            rx.recv().await.unwrap(),
            PlanEvent::PlanDeleted {
                plan_id: "p1".to_string()
            }
        );
        assert!(orch.plan().await.unwrap().is_none());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_register_blank_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let mut rx = orch.events().subscribe();

        let outcome = orch.register_worker("", "role").await.unwrap();
        assert_eq!(outcome, RegisterOutcome::InvalidName);
        assert!(orch.plan().await.unwrap().is_none());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_shared_event_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path().join("plans.json"));
        let events = EventStream::new(16);
        let mut rx = events.subscribe();
        let first = Orchestrator::new(store.clone(), "one").with_events(events.clone());
        let second = Orchestrator::new(store, "two").with_events(events);

        first.register_worker("a", "").await.unwrap();
        second.register_worker("b", "").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().plan_id(), "one");
        assert_eq!(rx.recv().await.unwrap().plan_id(), "two");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_blank_name() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir);
        let reply = orch
            .dispatch(ToolRequest::RegisterWorker {
                name: " ".to_string(),
                role: "r".to_string(),
            })
            .await
            .unwrap();
        assert!(!reply.ok);
        assert!(orch.plan().await.unwrap().is_none());
    }
}
