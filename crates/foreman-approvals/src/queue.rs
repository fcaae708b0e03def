use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use foreman_config::AutoApprovalConfig;
use foreman_core::ApprovalActionType;

/// A request for human sign-off on a risky action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_title: String,
    pub action_type: ApprovalActionType,
    /// Short human-readable summary from the classifier.
    pub description: String,
    /// Full engine response backing the request.
    pub details: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    /// Hard timeout; a pending request past this is marked timed-out and
    /// dropped, never approved.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        task_id: Uuid,
        task_title: impl Into<String>,
        action_type: ApprovalActionType,
        description: impl Into<String>,
        details: impl Into<String>,
        expires_in_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            task_title: task_title.into(),
            action_type,
            description: description.into(),
            details: details.into(),
            status: ApprovalStatus::Pending,
            created_at: now,
            // 0 disables the hard expiry entirely
            expires_at: (expires_in_minutes != 0).then(|| now + Duration::minutes(expires_in_minutes)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// What the periodic sweep found for one aged request.
#[derive(Debug, Clone)]
pub enum SweepOutcome {
    /// Past its hard expiry; already marked timed-out and removed.
    TimedOut(ApprovalRequest),
    /// Eligible for auto-approval under the configured rules; still pending.
    /// The caller resolves it through the normal approval path.
    AutoApprove { id: Uuid },
}

/// The live set of unresolved approval requests. Requests leave the queue
/// on terminal transition; the caller logs them first. Not internally
/// synchronized: the owning controller serializes access.
#[derive(Debug, Default)]
pub struct ApprovalQueue {
    requests: Vec<ApprovalRequest>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request. Rejects a duplicate id (returns `false`) so the live
    /// queue never holds two requests with the same id.
    pub fn enqueue(&mut self, request: ApprovalRequest) -> bool {
        if self.requests.iter().any(|r| r.id == request.id) {
            debug!(request_id = %request.id, "duplicate approval request ignored");
            return false;
        }
        info!(
            request_id = %request.id,
            task = %request.task_title,
            action = %request.action_type,
            "approval request enqueued"
        );
        self.requests.push(request);
        true
    }

    pub fn get(&self, id: Uuid) -> Option<&ApprovalRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Snapshot of all pending requests, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.requests
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Resolve a pending request. First resolution wins: an unknown id or an
    /// already-terminal request is a no-op returning `None`. On success the
    /// request is removed from the live queue and returned with its terminal
    /// status for logging.
    pub fn resolve(&mut self, id: Uuid, decision: ApprovalDecision) -> Option<ApprovalRequest> {
        let idx = self
            .requests
            .iter()
            .position(|r| r.id == id && r.is_pending())?;
        let mut request = self.requests.remove(idx);
        request.status = match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        };
        info!(request_id = %id, status = ?request.status, "approval request resolved");
        Some(request)
    }

    /// The periodic sweep. Hard expiry is checked before soft auto-approval,
    /// so an aged request that is both past `expires_at` and eligible under
    /// the rules times out — a priority rule, not a race.
    ///
    /// Timed-out requests are marked and removed here; auto-approval
    /// candidates are only reported, so the caller can push them through the
    /// same resolution path a human approval takes.
    pub fn sweep(&mut self, now: DateTime<Utc>, rules: &AutoApprovalConfig) -> Vec<SweepOutcome> {
        let mut outcomes = Vec::new();

        // Hard expiry first.
        let mut i = 0;
        while i < self.requests.len() {
            let request = &self.requests[i];
            let expired = request.is_pending()
                && request.expires_at.is_some_and(|at| now > at);
            if expired {
                let mut request = self.requests.remove(i);
                request.status = ApprovalStatus::TimedOut;
                info!(request_id = %request.id, "approval request timed out");
                outcomes.push(SweepOutcome::TimedOut(request));
            } else {
                i += 1;
            }
        }

        // Soft auto-approval for requests that survived expiry.
        // 0 disables the rule entirely.
        if rules.enabled && rules.max_pending_time_minutes != 0 {
            let cutoff = now - Duration::minutes(rules.max_pending_time_minutes);
            for request in self.requests.iter().filter(|r| r.is_pending()) {
                if request.created_at > cutoff {
                    continue;
                }
                if !rules.allowed_action_types.contains(&request.action_type) {
                    continue;
                }
                if request.action_type == ApprovalActionType::GitPush
                    && rules.require_confirmation_for_git_push
                {
                    continue;
                }
                debug!(request_id = %request.id, "approval request eligible for auto-approval");
                outcomes.push(SweepOutcome::AutoApprove { id: request.id });
            }
        }

        outcomes
    }

    /// Drop every request without resolving it (controller deactivation).
    pub fn clear(&mut self) -> Vec<ApprovalRequest> {
        std::mem::take(&mut self.requests)
    }
}
