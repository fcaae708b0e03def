#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use foreman_config::ForemanConfig;
    use foreman_controller::Controller;
    use foreman_core::{
        ActionResult, ApprovalActionType, ControllerStatus, Event, EventBus, Task, TaskStatus,
        UsageLimitStatus,
    };
    use foreman_engine::{MockEngine, MockReply};
    use foreman_store::{InMemoryTaskStore, MemoryStateStore};

    const SAFE_REPLY: &str = "I will run tests with npm test to verify.";
    const RISKY_REPLY: &str = "I recommend we refactor the auth module.";

    fn test_config() -> ForemanConfig {
        let mut config = ForemanConfig::default();
        config.controller.poll_interval_secs = 1;
        config
    }

    fn build(
        config: ForemanConfig,
        engine: MockEngine,
    ) -> (Controller, Arc<InMemoryTaskStore>, EventBus) {
        let store = Arc::new(InMemoryTaskStore::new());
        let events = EventBus::new(256);
        let controller = Controller::new(
            config,
            store.clone(),
            Arc::new(engine),
            Arc::new(MemoryStateStore::new()),
            events.clone(),
        );
        (controller, store, events)
    }

    /// The first tick fires immediately on activation; this is long enough
    /// for it to complete without crossing into the second tick.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    fn assert_limit_invariant(controller: &Controller) {
        let state = controller.state();
        if state.paused_due_to_limit {
            assert!(
                matches!(
                    state.status,
                    ControllerStatus::WindingDown | ControllerStatus::Paused
                ),
                "paused_due_to_limit=true with status {}",
                state.status
            );
        }
    }

    // ── Scenario A: safe response auto-completes ───────────────

    #[tokio::test]
    async fn test_safe_response_completes_task() {
        let engine = MockEngine::new("mock").with_reply(SAFE_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Verify the build", 5)).await;

        controller.activate();
        settle().await;

        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Done);
        let state = controller.state();
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.approved_count, 1);
        assert_eq!(state.error_count, 0);
        assert!(state.current_progress.is_none());
        assert!(controller.approval_queue().is_empty());

        let logs = controller.action_logs(None);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].result, ActionResult::Success);
        assert!(logs[0].auto_approved);
        assert!(logs[0].output.as_deref().unwrap().contains("npm test"));

        controller.deactivate();
    }

    // ── Scenario B: risky response gates on approval ───────────

    #[tokio::test]
    async fn test_risky_response_waits_for_approval() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::WaitingApproval);
        // Not counted until resolved
        assert_eq!(state.processed_count, 0);

        let queue = controller.approval_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].action_type, ApprovalActionType::LargeEdit);
        assert_eq!(queue[0].task_id, task_id);
        assert_eq!(queue[0].details, RISKY_REPLY);
        assert!(queue[0].expires_at.is_some());

        // Task parked in progress, not done
        assert_eq!(
            store.get(task_id).await.unwrap().status,
            TaskStatus::InProgress
        );

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_approval_completes_task_and_resumes() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        let request_id = controller.approval_queue()[0].id;

        assert!(controller.approve_request(request_id).await);

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Running);
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.approved_count, 1);
        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Done);
        assert!(controller.approval_queue().is_empty());

        let logs = controller.action_logs(None);
        assert_eq!(logs[0].result, ActionResult::Success);
        assert!(!logs[0].auto_approved);

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_rejection_counts_and_leaves_task_open() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        let request_id = controller.approval_queue()[0].id;

        assert!(controller.reject_request(request_id, Some("too broad")).await);

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Running);
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.rejected_count, 1);
        assert_eq!(state.approved_count, 0);
        // Rejection does not complete the task
        assert_ne!(store.get(task_id).await.unwrap().status, TaskStatus::Done);

        let logs = controller.action_logs(None);
        assert_eq!(logs[0].result, ActionResult::Skipped);
        assert!(logs[0].description.contains("too broad"));

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_resolving_twice_is_idempotent() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        let request_id = controller.approval_queue()[0].id;

        assert!(controller.approve_request(request_id).await);
        let counts_after_first = controller.state();
        let logs_after_first = controller.action_logs(None).len();

        // Second resolution of the same request: a no-op either way
        assert!(!controller.approve_request(request_id).await);
        assert!(!controller.reject_request(request_id, None).await);
        let state = controller.state();
        assert_eq!(state.processed_count, counts_after_first.processed_count);
        assert_eq!(state.approved_count, counts_after_first.approved_count);
        assert_eq!(controller.action_logs(None).len(), logs_after_first);

        controller.deactivate();
    }

    // ── Scenario C: usage breach winds down ────────────────────

    #[tokio::test]
    async fn test_usage_breach_triggers_wind_down() {
        let engine = MockEngine::new("mock");
        let (controller, _, _) = build(test_config(), engine);

        controller.activate();
        settle().await;

        // 205k of a 200k hourly budget with pause threshold 0.8
        let report = controller.update_token_usage(190_000, 15_000, None);
        assert_eq!(report.status, UsageLimitStatus::AtLimit);

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::WindingDown);
        assert!(state.paused_due_to_limit);
        assert_limit_invariant(&controller);

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_wind_down_does_not_start_new_tasks() {
        let engine = MockEngine::new("mock").with_reply(SAFE_REPLY);
        let (controller, store, _) = build(test_config(), engine);

        controller.activate();
        settle().await;
        controller.update_token_usage(190_000, 15_000, None);
        assert_eq!(controller.state().status, ControllerStatus::WindingDown);

        // A task arriving during wind-down stays untouched
        let task_id = store.add(Task::new("Later", 5)).await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Todo);
        assert_eq!(controller.state().processed_count, 0);

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_usage_breach_while_paused_keeps_pause() {
        let engine = MockEngine::new("mock");
        let (controller, _, _) = build(test_config(), engine);

        controller.activate();
        settle().await;
        controller.pause();

        controller.update_token_usage(500_000, 0, None);
        // Wind-down only applies while running
        assert_eq!(controller.state().status, ControllerStatus::Paused);
        assert_limit_invariant(&controller);

        controller.deactivate();
    }

    // ── Scenario D: approval timeout gives up ──────────────────

    #[tokio::test]
    async fn test_timed_out_approval_releases_controller() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let mut config = test_config();
        // Negative expiry: the request is already past its deadline when
        // the next sweep runs.
        config.controller.approval_expiry_minutes = -1;
        let (controller, store, _) = build(config, engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        assert_eq!(controller.state().status, ControllerStatus::WaitingApproval);

        // The next tick's sweep times the request out
        tokio::time::sleep(Duration::from_millis(1200)).await;

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Running);
        assert!(controller.approval_queue().is_empty());
        // Gave up: nothing approved, nothing counted, task left with the operator
        assert_eq!(state.processed_count, 0);
        assert_eq!(state.approved_count, 0);
        assert_eq!(
            store.get(task_id).await.unwrap().status,
            TaskStatus::InProgress
        );

        let logs = controller.action_logs(None);
        assert!(
            logs.iter()
                .any(|e| e.result == ActionResult::Skipped && e.description.contains("timed out"))
        );

        controller.deactivate();
    }

    // ── Auto-approval sweep ────────────────────────────────────

    #[tokio::test]
    async fn test_aged_request_auto_approves_via_sweep() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let mut config = test_config();
        config.controller.approval_expiry_minutes = 0; // no hard expiry
        config.auto_approval.enabled = true;
        config.auto_approval.allowed_action_types = vec![ApprovalActionType::LargeEdit];
        // Negative age threshold: eligible on the very next sweep
        config.auto_approval.max_pending_time_minutes = -1;
        let (controller, store, _) = build(config, engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        tokio::time::sleep(Duration::from_millis(1200)).await;

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Running);
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.approved_count, 1);
        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Done);

        let logs = controller.action_logs(None);
        assert!(logs.iter().any(|e| e.auto_approved));

        controller.deactivate();
    }

    // ── Scenario E: pause while waiting, then resume ───────────

    #[tokio::test]
    async fn test_pause_while_waiting_approval_then_resume() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        assert_eq!(controller.state().status, ControllerStatus::WaitingApproval);

        controller.pause();
        assert_eq!(controller.state().status, ControllerStatus::Paused);

        controller.resume();
        assert_eq!(controller.state().status, ControllerStatus::Running);

        // The still-pending approval survives the pause and resolves normally;
        // the already-completed engine call is not re-run.
        let queue = controller.approval_queue();
        assert_eq!(queue.len(), 1);
        assert!(controller.approve_request(queue[0].id).await);
        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Done);

        controller.deactivate();
    }

    // ── Invalid transitions are no-ops ─────────────────────────

    #[tokio::test]
    async fn test_invalid_transitions_are_noops() {
        let engine = MockEngine::new("mock");
        let (controller, _, _) = build(test_config(), engine);

        // Nothing to do while idle
        controller.pause();
        assert_eq!(controller.state().status, ControllerStatus::Idle);
        controller.resume();
        assert_eq!(controller.state().status, ControllerStatus::Idle);
        controller.deactivate();
        assert_eq!(controller.state().status, ControllerStatus::Idle);

        controller.activate();
        settle().await;
        // Double activate is ignored
        controller.activate();
        assert_eq!(controller.state().status, ControllerStatus::Running);
        // Resume while running is ignored
        controller.resume();
        assert_eq!(controller.state().status, ControllerStatus::Running);

        controller.deactivate();
        assert_eq!(controller.state().status, ControllerStatus::Idle);
    }

    // ── Deactivation resets everything ─────────────────────────

    #[tokio::test]
    async fn test_deactivate_abandons_approvals_and_resets_counters() {
        let engine = MockEngine::new("mock").with_reply(RISKY_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("Clean up auth", 5)).await;

        controller.activate();
        settle().await;
        assert_eq!(controller.approval_queue().len(), 1);

        controller.deactivate();

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Idle);
        assert_eq!(state.processed_count, 0);
        assert_eq!(state.approved_count, 0);
        assert!(state.current_task_id.is_none());
        assert!(state.current_action.is_none());
        assert!(state.current_progress.is_none());
        assert!(!state.paused_due_to_limit);
        // Abandoned, not resolved
        assert!(controller.approval_queue().is_empty());
    }

    // ── Engine failures ────────────────────────────────────────

    #[tokio::test]
    async fn test_engine_failure_schedules_retry() {
        let engine = MockEngine::new("mock").with_error("connection refused");
        let (controller, store, _) = build(test_config(), engine);
        let mut task = Task::new("Flaky", 5);
        task.max_attempts = 3;
        let task_id = store.add(task).await;

        controller.activate();
        settle().await;

        let state = controller.state();
        assert_eq!(state.error_count, 1);
        assert_eq!(state.processed_count, 0);

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.attempts, 1);
        assert!(task.not_before.is_some());

        let logs = controller.action_logs(None);
        assert_eq!(logs[0].result, ActionResult::Failure);
        assert!(logs[0].description.contains("connection refused"));

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_permanent_failure_emits_notification() {
        let engine = MockEngine::new("mock").with_error("boom");
        let (controller, store, events) = build(test_config(), engine);
        let mut task = Task::new("Doomed", 5);
        task.max_attempts = 1;
        let task_id = store.add(task).await;

        let mut rx = events.subscribe();
        controller.activate();
        settle().await;

        assert_eq!(store.get(task_id).await.unwrap().status, TaskStatus::Failed);

        let mut saw_task_failed = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::TaskFailed { task_id: id, .. } = event {
                assert_eq!(id, task_id);
                saw_task_failed = true;
            }
        }
        assert!(saw_task_failed, "expected a TaskFailed notification");

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_transient_failure_does_not_notify() {
        let engine = MockEngine::new("mock").with_error("blip");
        let (controller, store, events) = build(test_config(), engine);
        let mut task = Task::new("Flaky", 5);
        task.max_attempts = 3;
        store.add(task.clone()).await;

        let mut rx = events.subscribe();
        controller.activate();
        settle().await;

        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, Event::TaskFailed { .. }),
                "transient failure must not notify"
            );
        }

        controller.deactivate();
    }

    // ── Usage recording ────────────────────────────────────────

    #[tokio::test]
    async fn test_engine_usage_feeds_governor() {
        let engine = MockEngine::new("mock")
            .with_mock_reply(MockReply::text(SAFE_REPLY).with_usage(4_000, 1_000));
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("Verify", 5)).await;

        controller.activate();
        settle().await;

        let pct = controller.usage_percentages();
        // 5k of the 200k hourly default
        assert!((pct.hourly - 2.5).abs() < 1e-9);

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_missing_usage_is_estimated_from_text() {
        let engine = MockEngine::new("mock")
            .with_mock_reply(MockReply::text(SAFE_REPLY).without_usage());
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("Verify", 5)).await;

        controller.activate();
        settle().await;

        // ceil(chars/4) on prompt and response: small but nonzero
        assert!(controller.usage_percentages().hourly > 0.0);

        controller.deactivate();
    }

    #[tokio::test]
    async fn test_engine_context_window_overrides_config() {
        let engine = MockEngine::new("mock").with_mock_reply(
            MockReply::text(SAFE_REPLY)
                .with_usage(100, 50)
                .with_context_window(500_000),
        );
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("Verify", 5)).await;

        controller.activate();
        settle().await;

        let config = controller.usage_limit_config();
        assert_eq!(config.max_tokens_per_hour, 500_000);
        assert_eq!(config.max_tokens_per_day, 2_500_000);

        controller.deactivate();
    }

    // ── Cancellation ───────────────────────────────────────────

    #[tokio::test]
    async fn test_pause_interrupts_in_flight_engine_call() {
        let engine = MockEngine::new("mock")
            .with_mock_reply(MockReply::text(SAFE_REPLY).with_delay(Duration::from_secs(30)));
        let (controller, store, _) = build(test_config(), engine);
        let task_id = store.add(Task::new("Slow", 5)).await;

        controller.activate();
        // Let the tick reach the engine call, then pause mid-flight
        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.pause();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let state = controller.state();
        assert_eq!(state.status, ControllerStatus::Paused);
        assert!(state.current_progress.is_none());
        // The interrupted task went back to the store's retry policy
        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        // Not an engine failure
        assert_eq!(state.error_count, 0);

        controller.deactivate();
    }

    // ── Session resumption ─────────────────────────────────────

    #[tokio::test]
    async fn test_conversation_session_carries_across_tasks() {
        let engine = MockEngine::new("mock")
            .with_reply(SAFE_REPLY)
            .with_reply(SAFE_REPLY);
        let (controller, store, _) = build(test_config(), engine);
        store.add(Task::new("First", 9)).await;
        store.add(Task::new("Second", 1)).await;

        controller.activate();
        // Two ticks: immediate + one interval
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(controller.state().processed_count, 2);
        assert_eq!(
            controller.state().conversation_session_id.as_deref(),
            Some("mock-session")
        );

        controller.deactivate();
    }
}
