use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work the controller dispatches to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Higher runs first.
    pub priority: u8,
    /// Attempts made so far; store-side retry policy reads this.
    pub attempts: u32,
    /// Attempts after which the store reports permanent failure.
    pub max_attempts: u32,
    /// Retry back-off gate; the store skips the task until this passes.
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, priority: u8) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority,
            attempts: 0,
            max_attempts: 3,
            not_before: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Failed,
    Blocked,
}

/// The task-store collaborator. Scheduling policy (priority order, retry
/// back-off, blocked-dependency skip) belongs to the store; the controller
/// only asks for the next eligible task and reports outcomes.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks currently eligible or waiting (anything not terminal).
    async fn list_pending(&self) -> Vec<Task>;

    /// The next task the controller should execute, per the store's own
    /// policy. `None` when nothing is eligible right now.
    async fn next_executable(&self) -> Option<Task>;

    async fn mark_in_progress(&self, id: Uuid);

    async fn mark_done(&self, id: Uuid);

    /// Record a failed attempt. The store decides retry-vs-permanent-failure
    /// and returns the updated task: `status == Todo` means it will be
    /// retried later, `status == Failed` means retries are exhausted.
    async fn schedule_retry(&self, id: Uuid, error: &str) -> Option<Task>;
}
