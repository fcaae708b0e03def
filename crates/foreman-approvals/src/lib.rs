//! # foreman-approvals
//!
//! The approval gate for risky actions: a live queue of pending requests,
//! the periodic timeout/auto-approval sweep, and the append-only action
//! audit log.

pub mod log;
pub mod queue;

pub use log::{ActionLog, ActionLogEntry};
pub use queue::{ApprovalDecision, ApprovalQueue, ApprovalRequest, ApprovalStatus, SweepOutcome};
