use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use foreman_approvals::{ActionLog, ActionLogEntry, ApprovalDecision, ApprovalQueue, ApprovalRequest};
use foreman_config::{ForemanConfig, UsageLimitConfig};
use foreman_core::{
    ActionResult, ControllerState, ControllerStatus, Event, EventBus, StateStore,
    TaskStore, UsageLimitStatus,
};
use foreman_engine::Engine;
use foreman_governor::{TokenGovernor, UsageLimitUpdate, UsagePercentages, UsageReport};

use crate::dispatch;

/// Handle to a running dispatch loop. Cancelling the token stops the loop
/// and interrupts any in-flight engine call.
pub(crate) struct LoopHandle {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

pub(crate) struct ControllerInner {
    pub state: RwLock<ControllerState>,
    pub queue: Mutex<ApprovalQueue>,
    pub log: Mutex<ActionLog>,
    pub governor: TokenGovernor,
    pub store: Arc<dyn TaskStore>,
    pub engine: Arc<dyn Engine>,
    pub state_store: Arc<dyn StateStore>,
    pub events: EventBus,
    pub config: ForemanConfig,
    loop_handle: Mutex<Option<LoopHandle>>,
}

impl ControllerInner {
    /// Mutate state under the write lock and persist the result. The
    /// closure must not block; the engine call never runs inside it.
    pub(crate) fn mutate_state<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let mut state = self.state.write();
        let result = f(&mut state);
        self.state_store.save(&state);
        result
    }

    pub(crate) fn status(&self) -> ControllerStatus {
        self.state.read().status
    }

    pub(crate) fn append_log(&self, entry: ActionLogEntry) {
        self.log.lock().append(entry);
    }

    /// Apply a governor status to the state machine: while running, an
    /// approaching/at-limit reading transitions to wind-down so the
    /// in-flight task can finish but no new one starts.
    pub(crate) fn apply_usage_status(&self, status: UsageLimitStatus) {
        if !status.requires_wind_down() {
            return;
        }
        let changed = self.mutate_state(|s| {
            if s.status == ControllerStatus::Running {
                s.status = ControllerStatus::WindingDown;
                s.paused_due_to_limit = true;
                true
            } else {
                false
            }
        });
        if changed {
            info!(%status, "usage limit reached, winding down");
            self.events.publish(Event::StateChanged {
                status: ControllerStatus::WindingDown,
            });
        }
    }

    /// Resolve an approval request through the single resolution path used
    /// by humans and the auto-approval sweep alike. Unknown or terminal ids
    /// are no-ops. Returns whether anything changed.
    pub(crate) async fn resolve_approval(
        &self,
        id: Uuid,
        decision: ApprovalDecision,
        reason: Option<&str>,
        auto: bool,
    ) -> bool {
        let Some(resolved) = self.queue.lock().resolve(id, decision) else {
            warn!(request_id = %id, "approval resolution for unknown or terminal request ignored");
            return false;
        };

        let approved = decision == ApprovalDecision::Approved;
        let description = match reason {
            Some(reason) => format!("{} (reason: {})", resolved.description, reason),
            None => resolved.description.clone(),
        };
        let entry = ActionLogEntry::new(
            resolved.task_id,
            resolved.task_title.clone(),
            resolved.action_type.to_string(),
            description,
            if approved {
                ActionResult::Success
            } else {
                ActionResult::Skipped
            },
        )
        .auto_approved(auto);
        self.append_log(entry);

        self.mutate_state(|s| {
            s.processed_count += 1;
            if approved {
                s.approved_count += 1;
            } else {
                s.rejected_count += 1;
            }
        });

        if approved {
            self.store.mark_done(resolved.task_id).await;
        }

        self.events.publish(Event::ApprovalResolved {
            request_id: id,
            approved,
            auto_approved: auto,
        });

        // Resume dispatch if this resolution was what the controller was
        // waiting on.
        let was_waiting = self.mutate_state(|s| {
            if s.status == ControllerStatus::WaitingApproval {
                s.status = ControllerStatus::Running;
                true
            } else {
                false
            }
        });
        if was_waiting {
            self.events.publish(Event::StateChanged {
                status: ControllerStatus::Running,
            });
        }
        true
    }
}

/// The autonomous project-manager controller. Owns the controller state,
/// the live approval queue, and the action log; external consumers only
/// ever see snapshots or events.
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    /// Build a controller. State always starts at idle defaults: a prior
    /// run is never resumed across process restarts.
    pub fn new(
        config: ForemanConfig,
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn Engine>,
        state_store: Arc<dyn StateStore>,
        events: EventBus,
    ) -> Self {
        let governor = TokenGovernor::new(config.usage.clone(), events.clone());
        let state = ControllerState::default();
        state_store.save(&state);
        Self {
            inner: Arc::new(ControllerInner {
                state: RwLock::new(state),
                queue: Mutex::new(ApprovalQueue::new()),
                log: Mutex::new(ActionLog::default()),
                governor,
                store,
                engine,
                state_store,
                events,
                config,
                loop_handle: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Start dispatching. Only valid from idle; anything else is a no-op.
    pub fn activate(&self) {
        {
            let mut state = self.inner.state.write();
            if state.status != ControllerStatus::Idle {
                warn!(status = %state.status, "activate ignored: controller is not idle");
                return;
            }
            state.status = ControllerStatus::Running;
            state.started_at = Some(chrono::Utc::now());
            self.inner.state_store.save(&state);
        }
        self.inner.events.publish(Event::StateChanged {
            status: ControllerStatus::Running,
        });
        self.start_loop();
        info!("controller activated");
    }

    /// Stop everything and return to idle. Pending approvals are abandoned
    /// (dropped unresolved), counters reset, any in-flight engine call is
    /// cancelled.
    pub fn deactivate(&self) {
        if self.inner.status() == ControllerStatus::Idle {
            warn!("deactivate ignored: controller is already idle");
            return;
        }
        self.stop_loop();

        let abandoned = self.inner.queue.lock().clear();
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "abandoned pending approval requests");
        }

        self.inner.mutate_state(|s| *s = ControllerState::default());
        self.inner.events.publish(Event::StateChanged {
            status: ControllerStatus::Idle,
        });
        info!("controller deactivated");
    }

    /// Pause dispatching. Valid from running or waiting-approval; stops the
    /// loop and cancels any in-flight engine call.
    pub fn pause(&self) {
        let ok = {
            let mut state = self.inner.state.write();
            match state.status {
                ControllerStatus::Running | ControllerStatus::WaitingApproval => {
                    state.status = ControllerStatus::Paused;
                    self.inner.state_store.save(&state);
                    true
                }
                status => {
                    warn!(%status, "pause ignored");
                    false
                }
            }
        };
        if ok {
            self.stop_loop();
            self.inner.events.publish(Event::StateChanged {
                status: ControllerStatus::Paused,
            });
            info!("controller paused");
        }
    }

    /// Resume from a pause. Restarts the loop with an immediate tick; a
    /// still-pending approval is re-evaluated, a completed task is not
    /// re-run.
    pub fn resume(&self) {
        let ok = {
            let mut state = self.inner.state.write();
            if state.status != ControllerStatus::Paused {
                warn!(status = %state.status, "resume ignored: controller is not paused");
                false
            } else {
                state.status = ControllerStatus::Running;
                state.paused_due_to_limit = false;
                self.inner.state_store.save(&state);
                true
            }
        };
        if ok {
            self.inner.events.publish(Event::StateChanged {
                status: ControllerStatus::Running,
            });
            self.start_loop();
            info!("controller resumed");
        }
    }

    // ── Approvals ──────────────────────────────────────────────

    pub async fn approve_request(&self, id: Uuid) -> bool {
        self.inner
            .resolve_approval(id, ApprovalDecision::Approved, None, false)
            .await
    }

    pub async fn reject_request(&self, id: Uuid, reason: Option<&str>) -> bool {
        self.inner
            .resolve_approval(id, ApprovalDecision::Rejected, reason, false)
            .await
    }

    /// Snapshot of the live (pending) approval queue.
    pub fn approval_queue(&self) -> Vec<ApprovalRequest> {
        self.inner.queue.lock().pending()
    }

    // ── Introspection ──────────────────────────────────────────

    /// Read-only snapshot of the controller state.
    pub fn state(&self) -> ControllerState {
        self.inner.state.read().clone()
    }

    /// Most recent action-log entries, newest first.
    pub fn action_logs(&self, limit: Option<usize>) -> Vec<ActionLogEntry> {
        self.inner.log.lock().recent(limit)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    // ── Usage governance ───────────────────────────────────────

    /// Record externally-observed token usage (e.g. from a chat surface
    /// sharing the same engine budget) and apply the resulting status.
    pub fn update_token_usage(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        context_window: Option<u64>,
    ) -> UsageReport {
        let report = self
            .inner
            .governor
            .record_usage(input_tokens, output_tokens, context_window);
        self.inner.apply_usage_status(report.status);
        report
    }

    pub fn usage_limit_config(&self) -> UsageLimitConfig {
        self.inner.governor.config()
    }

    pub fn update_usage_limit_config(&self, update: UsageLimitUpdate) -> UsageLimitConfig {
        self.inner.governor.update_config(update)
    }

    pub fn usage_percentages(&self) -> UsagePercentages {
        self.inner.governor.percentages()
    }

    /// Current usage windows and status without recording anything.
    pub fn token_usage(&self) -> UsageReport {
        self.inner.governor.report()
    }

    // ── Loop control ───────────────────────────────────────────

    fn start_loop(&self) {
        let mut slot = self.inner.loop_handle.lock();
        if let Some(old) = slot.take() {
            // A previous loop should already be stopped; make sure.
            old.cancel.cancel();
            old.handle.abort();
        }
        *slot = Some(dispatch::spawn_loop(Arc::clone(&self.inner)));
    }

    fn stop_loop(&self) {
        if let Some(handle) = self.inner.loop_handle.lock().take() {
            handle.cancel.cancel();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.loop_handle.lock().take() {
            handle.cancel.cancel();
            handle.handle.abort();
        }
    }
}
