//! # foreman-store
//!
//! In-memory reference implementations of the controller's storage
//! collaborators. Real deployments back these with their own persistence;
//! the scheduling policy here (priority order, retry back-off, blocked
//! skip) is the store's business, opaque to the controller.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use foreman_core::{ControllerState, StateStore, Task, TaskStatus, TaskStore};

/// Retry back-off base; doubles per attempt.
const RETRY_BASE_SECS: i64 = 30;
/// Back-off ceiling.
const RETRY_MAX_SECS: i64 = 900;

/// Priority-ordered in-memory task store with exponential retry back-off.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, task: Task) -> Uuid {
        let id = task.id;
        self.tasks.lock().await.insert(id, task);
        debug!(task_id = %id, "task added");
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.tasks.lock().await.remove(&id).is_some()
    }

    pub async fn all(&self) -> Vec<Task> {
        self.tasks.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list_pending(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| !matches!(t.status, TaskStatus::Done | TaskStatus::Failed))
            .cloned()
            .collect()
    }

    async fn next_executable(&self) -> Option<Task> {
        let now = Utc::now();
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|t| t.status == TaskStatus::Todo)
            .filter(|t| t.not_before.is_none_or(|at| at <= now))
            .max_by(|a, b| {
                // Highest priority first; older task breaks the tie
                a.priority
                    .cmp(&b.priority)
                    .then(b.created_at.cmp(&a.created_at))
            })
            .cloned()
    }

    async fn mark_in_progress(&self, id: Uuid) {
        if let Some(task) = self.tasks.lock().await.get_mut(&id) {
            task.status = TaskStatus::InProgress;
            task.updated_at = Utc::now();
        }
    }

    async fn mark_done(&self, id: Uuid) {
        if let Some(task) = self.tasks.lock().await.get_mut(&id) {
            task.status = TaskStatus::Done;
            task.updated_at = Utc::now();
        }
    }

    async fn schedule_retry(&self, id: Uuid, error: &str) -> Option<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id)?;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();

        if task.attempts >= task.max_attempts {
            task.status = TaskStatus::Failed;
            task.not_before = None;
            info!(task_id = %id, attempts = task.attempts, "task failed permanently");
        } else {
            let backoff =
                (RETRY_BASE_SECS << (task.attempts - 1).min(31)).min(RETRY_MAX_SECS);
            task.status = TaskStatus::Todo;
            task.not_before = Some(Utc::now() + Duration::seconds(backoff));
            info!(
                task_id = %id,
                attempts = task.attempts,
                backoff_secs = backoff,
                "task scheduled for retry"
            );
        }
        Some(task.clone())
    }
}

/// Keeps the latest controller snapshot in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    state: SyncMutex<Option<ControllerState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Option<ControllerState> {
        self.state.lock().clone()
    }

    fn save(&self, state: &ControllerState) {
        *self.state.lock() = Some(state.clone());
    }
}
