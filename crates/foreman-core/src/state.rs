use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ControllerStatus, TaskProgress};

/// The controller's persisted state. One instance per controller, reset to
/// idle defaults on every (re)initialization — a prior run is never resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub status: ControllerStatus,
    pub current_task_id: Option<Uuid>,
    /// Human-readable progress line for the UI.
    pub current_action: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    // Monotonic counters, reset only on deactivation.
    pub processed_count: u64,
    pub approved_count: u64,
    pub rejected_count: u64,
    pub error_count: u64,
    pub current_progress: Option<TaskProgress>,
    /// Distinguishes governor-induced pauses from user-induced ones.
    /// Invariant: `true` implies status is `WindingDown` or `Paused`.
    pub paused_due_to_limit: bool,
    /// Engine-side conversation session to resume.
    pub conversation_session_id: Option<String>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            status: ControllerStatus::Idle,
            current_task_id: None,
            current_action: None,
            started_at: None,
            processed_count: 0,
            approved_count: 0,
            rejected_count: 0,
            error_count: 0,
            current_progress: None,
            paused_due_to_limit: false,
            conversation_session_id: None,
        }
    }
}

/// The durable state-store collaborator. Persistence mechanics (disk format,
/// encryption) belong to the host; the controller only needs get/set.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Option<ControllerState>;
    fn save(&self, state: &ControllerState);
}
