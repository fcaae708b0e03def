use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use foreman_approvals::{ActionLogEntry, ApprovalDecision, ApprovalRequest, SweepOutcome};
use foreman_classifier::classify;
use foreman_core::{
    ActionResult, ApprovalActionType, ControllerStatus, Event, ForemanError, Task, TaskProgress,
    TaskStatus,
};
use foreman_engine::{EngineRequest, estimate_tokens};

use crate::controller::{ControllerInner, LoopHandle};

/// The controller's persona and policy, sent with every engine call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous project manager working through a queue of tasks. \
Execute simple, low-risk actions directly and report what you did. \
For complex or risky work (plans, architecture changes, pushes to a remote, sweeping edits), \
describe the action you intend to take instead of performing it, so it can be reviewed. \
Be concise and concrete.";

/// Spawn the dispatch loop: an immediate tick, then one per poll interval
/// while the controller stays in a loop-alive status. Cancelling the
/// returned token stops the loop and interrupts any in-flight engine call.
pub(crate) fn spawn_loop(inner: Arc<ControllerInner>) -> LoopHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let period = Duration::from_secs(inner.config.controller.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(period_secs = period.as_secs(), "dispatch loop started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            if !inner.status().loop_alive() {
                break;
            }
            tick(&inner, &token).await;
            if !inner.status().loop_alive() {
                break;
            }
        }
        debug!("dispatch loop stopped");
    });
    LoopHandle { cancel, handle }
}

/// One dispatch tick. Re-entrance is impossible: the loop awaits each tick
/// before scheduling the next, and a tick that finds the controller not
/// running is a no-op.
async fn tick(inner: &ControllerInner, cancel: &CancellationToken) {
    sweep_approvals(inner).await;

    // While winding down the loop polls solely to detect the hourly reset.
    if inner.status() == ControllerStatus::WindingDown {
        if inner.governor.roll_if_due() {
            if inner.governor.config().auto_resume_on_reset {
                inner.mutate_state(|s| {
                    s.status = ControllerStatus::Running;
                    s.paused_due_to_limit = false;
                });
                info!("hourly usage window reset, resuming dispatch");
                inner.events.publish(Event::StateChanged {
                    status: ControllerStatus::Running,
                });
            } else {
                // Stay limit-paused until the user resumes by hand.
                inner.mutate_state(|s| s.status = ControllerStatus::Paused);
                info!("hourly usage window reset, staying paused (auto-resume disabled)");
                inner.events.publish(Event::StateChanged {
                    status: ControllerStatus::Paused,
                });
            }
        }
        if inner.status() != ControllerStatus::Running {
            return;
        }
    }

    if inner.status() != ControllerStatus::Running {
        return;
    }

    let Some(task) = inner.store.next_executable().await else {
        inner.mutate_state(|s| {
            s.current_action = Some("Idle: waiting for an eligible task".into());
        });
        return;
    };

    run_task(inner, cancel, task).await;
}

/// Drive one task through execution, usage recording, classification, and
/// either auto-completion or an approval request.
async fn run_task(inner: &ControllerInner, cancel: &CancellationToken, task: Task) {
    info!(task_id = %task.id, title = %task.title, "dispatching task");
    inner.store.mark_in_progress(task.id).await;
    inner.mutate_state(|s| {
        s.current_task_id = Some(task.id);
        s.current_action = Some(format!("Executing '{}'", task.title));
        s.current_progress = Some(TaskProgress::new("executing", 1, 3, "Building the prompt"));
    });
    publish_progress(inner, &task, "executing", 1);

    let prompt = build_prompt(&task);
    let system = inner
        .config
        .controller
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let session_id = if inner.config.engine.resume_sessions {
        inner.state.read().conversation_session_id.clone()
    } else {
        None
    };
    let request = EngineRequest {
        prompt: prompt.clone(),
        system: Some(system),
        session_id,
        max_tokens: inner.config.engine.max_tokens,
    };

    inner.mutate_state(|s| {
        s.current_progress = Some(TaskProgress::new("executing", 2, 3, "Running the engine"));
    });
    publish_progress(inner, &task, "executing", 2);

    let started = Instant::now();
    let result = inner.engine.run(&request, cancel).await;
    let duration = started.elapsed();

    let response = match result {
        Ok(response) => response,
        Err(ForemanError::Cancelled) => {
            // pause/deactivate interrupted the call; hand the task back to
            // the store's retry policy and let the new status stand.
            info!(task_id = %task.id, "engine call cancelled mid-flight");
            inner.store.schedule_retry(task.id, "interrupted by pause").await;
            inner.append_log(
                ActionLogEntry::new(
                    task.id,
                    task.title.clone(),
                    "execution",
                    format!("Engine call for '{}' interrupted", task.title),
                    ActionResult::Skipped,
                )
                .with_duration(duration),
            );
            inner.mutate_state(|s| {
                s.current_progress = None;
                s.current_task_id = None;
            });
            return;
        }
        Err(e) => {
            handle_failure(inner, &task, &e.to_string(), duration).await;
            return;
        }
    };

    // Record usage before anything else so the governor sees every call.
    // Engine-reported counts win; otherwise estimate from raw text.
    let (input_tokens, output_tokens, context_window) = match &response.usage {
        Some(usage) => (
            usage.input_tokens,
            usage.output_tokens,
            usage.context_window,
        ),
        None => (estimate_tokens(&prompt), estimate_tokens(&response.text), None),
    };
    let report = inner
        .governor
        .record_usage(input_tokens, output_tokens, context_window);
    inner.apply_usage_status(report.status);

    if inner.config.engine.resume_sessions && response.session_id.is_some() {
        inner.mutate_state(|s| s.conversation_session_id = response.session_id.clone());
    }

    inner.mutate_state(|s| {
        s.current_progress = Some(TaskProgress::new(
            "reviewing",
            3,
            3,
            "Classifying the response",
        ));
    });
    publish_progress(inner, &task, "reviewing", 3);

    let classification = classify(&response.text, &task);

    if !classification.requires_approval {
        inner.append_log(
            ActionLogEntry::new(
                task.id,
                task.title.clone(),
                classification.kind.clone(),
                classification.description.clone(),
                ActionResult::Success,
            )
            .auto_approved(true)
            .with_output(truncate_output(
                &response.text,
                inner.config.controller.log_output_max_chars,
            ))
            .with_duration(duration),
        );
        inner.store.mark_done(task.id).await;
        inner.mutate_state(|s| {
            s.processed_count += 1;
            s.approved_count += 1;
            s.current_progress = None;
            s.current_task_id = None;
            s.current_action = Some(format!("Completed '{}'", task.title));
        });
        inner.events.publish(Event::ActionCompleted {
            task_id: task.id,
            task_title: task.title.clone(),
            result: ActionResult::Success,
        });
        info!(task_id = %task.id, kind = %classification.kind, "task completed");
        return;
    }

    // Risky action: park the task behind an approval request. Dispatch
    // stops here until the request is resolved externally.
    let action_type = classification
        .approval_type
        .unwrap_or(ApprovalActionType::LargeEdit);
    let request = ApprovalRequest::new(
        task.id,
        task.title.clone(),
        action_type,
        classification.description.clone(),
        response.text.clone(),
        inner.config.controller.approval_expiry_minutes,
    );
    let request_id = request.id;
    inner.queue.lock().enqueue(request);
    inner.mutate_state(|s| {
        s.status = ControllerStatus::WaitingApproval;
        s.current_progress = None;
        s.current_action = Some(format!(
            "Waiting for approval: {}",
            classification.description
        ));
    });
    inner.events.publish(Event::ApprovalRequired {
        request_id,
        task_id: task.id,
        action_type,
        description: classification.description.clone(),
    });
    inner.events.publish(Event::StateChanged {
        status: ControllerStatus::WaitingApproval,
    });
    info!(
        task_id = %task.id,
        request_id = %request_id,
        action = %action_type,
        "approval required, dispatch suspended"
    );
}

async fn handle_failure(
    inner: &ControllerInner,
    task: &Task,
    error: &str,
    duration: Duration,
) {
    warn!(task_id = %task.id, error, "engine call failed");
    let updated = inner.store.schedule_retry(task.id, error).await;

    inner.append_log(
        ActionLogEntry::new(
            task.id,
            task.title.clone(),
            "execution",
            format!("Engine call failed: {error}"),
            ActionResult::Failure,
        )
        .with_duration(duration),
    );
    inner.mutate_state(|s| {
        s.error_count += 1;
        s.current_progress = None;
        s.current_task_id = None;
        s.current_action = Some(format!("Task '{}' failed", task.title));
    });

    // Only escalate to a user-visible notification once retries are
    // exhausted and the store reports permanent failure.
    if updated.is_some_and(|t| t.status == TaskStatus::Failed) {
        inner.events.publish(Event::TaskFailed {
            task_id: task.id,
            task_title: task.title.clone(),
            error: error.to_string(),
        });
    }
}

/// Apply the timeout sweep and any auto-approval rules. Timed-out requests
/// give up (logged as skipped, never approved); auto-approvals go through
/// the same resolution path a human approval takes.
async fn sweep_approvals(inner: &ControllerInner) {
    let outcomes = {
        inner
            .queue
            .lock()
            .sweep(Utc::now(), &inner.config.auto_approval)
    };
    if outcomes.is_empty() {
        return;
    }

    let mut timed_out = false;
    for outcome in outcomes {
        match outcome {
            SweepOutcome::TimedOut(request) => {
                timed_out = true;
                inner.append_log(ActionLogEntry::new(
                    request.task_id,
                    request.task_title.clone(),
                    request.action_type.to_string(),
                    format!("Approval request timed out: {}", request.description),
                    ActionResult::Skipped,
                ));
            }
            SweepOutcome::AutoApprove { id } => {
                inner
                    .resolve_approval(id, ApprovalDecision::Approved, None, true)
                    .await;
            }
        }
    }

    // A timeout releases a waiting controller; the underlying task stays
    // in progress for the operator to pick up.
    if timed_out && inner.queue.lock().pending().is_empty() {
        let released = inner.mutate_state(|s| {
            if s.status == ControllerStatus::WaitingApproval {
                s.status = ControllerStatus::Running;
                true
            } else {
                false
            }
        });
        if released {
            inner.events.publish(Event::StateChanged {
                status: ControllerStatus::Running,
            });
        }
    }
}

fn build_prompt(task: &Task) -> String {
    match &task.description {
        Some(description) => format!("Task: {}\n\n{}", task.title, description),
        None => format!("Task: {}", task.title),
    }
}

fn publish_progress(inner: &ControllerInner, task: &Task, phase: &str, step: u32) {
    inner.events.publish(Event::ProgressUpdated {
        task_id: task.id,
        phase: phase.to_string(),
        step,
        total_steps: 3,
    });
}

/// Keep log output bounded. 0 disables truncation.
fn truncate_output(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 500), "short");
        let long = "x".repeat(600);
        let truncated = truncate_output(&long, 500);
        assert_eq!(truncated.chars().count(), 503);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_disabled_with_zero() {
        let long = "x".repeat(600);
        assert_eq!(truncate_output(&long, 0), long);
    }

    #[test]
    fn test_build_prompt_with_and_without_description() {
        let task = Task::new("Fix the build", 5);
        assert_eq!(build_prompt(&task), "Task: Fix the build");
        let task = task.with_description("CI fails on main");
        assert!(build_prompt(&task).contains("CI fails on main"));
    }
}
