use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

use foreman_core::ActionResult;

/// One immutable audit record. Never mutated after creation; only
/// bulk-trimmed when the log exceeds its cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_title: String,
    /// Classifier family tag or approval action type.
    pub action_type: String,
    pub description: String,
    pub auto_approved: bool,
    pub result: ActionResult,
    /// Engine output, truncated by the writer.
    pub output: Option<String>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(
        task_id: Uuid,
        task_title: impl Into<String>,
        action_type: impl Into<String>,
        description: impl Into<String>,
        result: ActionResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            task_title: task_title.into(),
            action_type: action_type.into(),
            description: description.into(),
            auto_approved: false,
            result,
            output: None,
            duration: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn auto_approved(mut self, auto: bool) -> Self {
        self.auto_approved = auto;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Append-only ring of the most recent action records, oldest trimmed first.
#[derive(Debug)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    cap: usize,
}

pub const DEFAULT_LOG_CAP: usize = 1000;

impl ActionLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    pub fn append(&mut self, entry: ActionLogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// Most recent entries first. `None` returns everything retained.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ActionLogEntry> {
        let take = limit.unwrap_or(self.entries.len());
        self.entries.iter().rev().take(take).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAP)
    }
}
