use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The controller's authoritative status. Governs whether the dispatch loop
/// is allowed to pull new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    Idle,
    Running,
    Paused,
    WaitingApproval,
    WindingDown,
}

impl ControllerStatus {
    /// Whether the poll loop should be alive in this status.
    /// `WaitingApproval` keeps the loop ticking (sweeps still run);
    /// `WindingDown` keeps it ticking to detect the hourly reset.
    pub fn loop_alive(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::WaitingApproval | Self::WindingDown
        )
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingApproval => "waiting_approval",
            Self::WindingDown => "winding_down",
        };
        write!(f, "{s}")
    }
}

/// Derived usage level reported by the token governor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UsageLimitStatus {
    #[default]
    Ok,
    Warning,
    ApproachingLimit,
    AtLimit,
}

impl UsageLimitStatus {
    /// Whether the controller should stop pulling new tasks at this level.
    pub fn requires_wind_down(&self) -> bool {
        *self >= Self::ApproachingLimit
    }
}

impl fmt::Display for UsageLimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::ApproachingLimit => "approaching_limit",
            Self::AtLimit => "at_limit",
        };
        write!(f, "{s}")
    }
}

/// The category of a risky action that requires sign-off before the task
/// that produced it is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalActionType {
    Planning,
    Architecture,
    GitPush,
    LargeEdit,
}

impl fmt::Display for ApprovalActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Architecture => "architecture",
            Self::GitPush => "git_push",
            Self::LargeEdit => "large_edit",
        };
        write!(f, "{s}")
    }
}

/// Outcome recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failure,
    Skipped,
}

/// Advisory per-task progress. Overwritten per sub-step, cleared when the
/// task finishes or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub phase: String,
    pub step: u32,
    pub total_steps: u32,
    pub step_description: String,
    pub started_at: DateTime<Utc>,
}

impl TaskProgress {
    pub fn new(phase: &str, step: u32, total_steps: u32, description: &str) -> Self {
        Self {
            phase: phase.to_string(),
            step,
            total_steps,
            step_description: description.to_string(),
            started_at: Utc::now(),
        }
    }
}
