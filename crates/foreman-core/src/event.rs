use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{ActionResult, ApprovalActionType, ControllerStatus, UsageLimitStatus};

/// Notifications emitted by the controller and its components. External
/// consumers (UI, push delivery) subscribe; they never mutate controller
/// state directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Controller lifecycle ───────────────────────────────────
    StateChanged {
        status: ControllerStatus,
    },
    ProgressUpdated {
        task_id: Uuid,
        phase: String,
        step: u32,
        total_steps: u32,
    },

    // ── Task lifecycle ─────────────────────────────────────────
    ActionCompleted {
        task_id: Uuid,
        task_title: String,
        result: ActionResult,
    },
    TaskFailed {
        task_id: Uuid,
        task_title: String,
        error: String,
    },

    // ── Approval lifecycle ─────────────────────────────────────
    ApprovalRequired {
        request_id: Uuid,
        task_id: Uuid,
        action_type: ApprovalActionType,
        description: String,
    },
    ApprovalResolved {
        request_id: Uuid,
        approved: bool,
        auto_approved: bool,
    },

    // ── Usage governance ───────────────────────────────────────
    UsageWarning {
        status: UsageLimitStatus,
        hourly_pct: f64,
        daily_pct: f64,
    },

    // ── System ─────────────────────────────────────────────────
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

/// A broadcast-based event bus. Delivery is fire-and-forget: publishing
/// with no subscribers (or to a lagging subscriber) is never an error.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
