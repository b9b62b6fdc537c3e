//! In-flight execution tracking
//!
//! A single periodic timer drives [`WorkflowTracker::poll_cycle`]. Each cycle
//! issues at most one status fetch per non-terminal execution; an id whose
//! previous fetch is still pending is skipped. Completions are applied as they
//! arrive using last-write-wins on `last_updated_at`, and terminal executions
//! move once into the history store.

use super::model::{ExecutionStatus, WorkflowExecution};
use crate::clock::Clock;
use crate::error::FlowError;
use crate::history::WorkflowHistoryStore;
use crate::service::{ContentService, ServiceError, StatusResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Consecutive poll failures before an execution is failed locally
    pub failure_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            failure_threshold: 5,
        }
    }
}

/// Emitted whenever tracked state changes
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    Updated(WorkflowExecution),
    /// Reached a terminal status and was moved to history
    Finished(WorkflowExecution),
}

/// What happened to a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Finished,
    /// Older than the stored state, or would move the status backwards
    Stale,
    Untracked,
}

struct Tracked {
    execution: WorkflowExecution,
    outstanding: bool,
    consecutive_failures: u32,
}

struct TrackerCore {
    service: Arc<dyn ContentService>,
    history: Arc<dyn WorkflowHistoryStore>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    in_flight: Mutex<HashMap<String, Tracked>>,
    events: broadcast::Sender<TrackerEvent>,
}

/// Fetches issued by one poll cycle
pub struct PollCycle {
    handles: Vec<JoinHandle<()>>,
}

impl PollCycle {
    /// Number of fetches issued
    pub fn issued(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every fetch of this cycle to be applied
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Status fetch task failed");
            }
        }
    }
}

pub struct WorkflowTracker {
    core: Arc<TrackerCore>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl WorkflowTracker {
    pub fn new(
        service: Arc<dyn ContentService>,
        history: Arc<dyn WorkflowHistoryStore>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core: Arc::new(TrackerCore {
                service,
                history,
                clock,
                config,
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Begin tracking a newly submitted execution
    pub fn track(&self, execution: WorkflowExecution) -> Result<(), FlowError> {
        let id = execution.id.clone();
        {
            let mut in_flight = self.core.lock();
            if in_flight.contains_key(&id) {
                return Err(FlowError::validation(format!(
                    "execution '{}' is already tracked",
                    id
                )));
            }
            if !execution.is_terminal() {
                tracing::info!(id = %id, status = %execution.status, "Tracking execution");
                in_flight.insert(
                    id,
                    Tracked {
                        execution,
                        outstanding: false,
                        consecutive_failures: 0,
                    },
                );
                return Ok(());
            }
        }

        self.core.finish(execution);
        Ok(())
    }

    /// Stop tracking without recording anything; a pending fetch result is dropped
    pub fn untrack(&self, id: &str) -> Option<WorkflowExecution> {
        let removed = self.core.lock().remove(id).map(|t| t.execution);
        if removed.is_some() {
            tracing::debug!(id, "Untracked execution");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<WorkflowExecution> {
        self.core.lock().get(id).map(|t| t.execution.clone())
    }

    /// Snapshot of tracked executions, oldest first
    pub fn in_flight(&self) -> Vec<WorkflowExecution> {
        let mut executions: Vec<_> = self
            .core
            .lock()
            .values()
            .map(|t| t.execution.clone())
            .collect();
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        executions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.core.events.subscribe()
    }

    /// Issue one status fetch per eligible execution
    pub fn poll_cycle(&self) -> PollCycle {
        self.core.poll_cycle()
    }

    /// Apply a status update using last-write-wins
    pub fn apply_update(&self, id: &str, update: StatusResponse) -> ApplyOutcome {
        self.core.apply_update(id, update)
    }

    /// Start the periodic poll timer; no-op if already running
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let core = self.core.clone();
        let period = core.config.poll_interval;
        tracing::debug!(interval = ?period, "Starting tracker timer");
        *timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                core.poll_cycle();
            }
        }));
    }

    /// Clear the periodic timer; fetches already issued still complete
    pub fn stop(&self) {
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("Stopped tracker timer");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer and forget all in-flight executions
    pub fn shutdown(&self) {
        self.stop();
        let dropped = {
            let mut in_flight = self.core.lock();
            let n = in_flight.len();
            in_flight.clear();
            n
        };
        if dropped > 0 {
            tracing::info!(dropped, "Tracker shut down with executions still in flight");
        }
    }
}

impl Drop for WorkflowTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TrackerCore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poll_cycle(self: &Arc<Self>) -> PollCycle {
        let ids: Vec<String> = {
            let mut in_flight = self.lock();
            in_flight
                .iter_mut()
                .filter(|(_, tracked)| !tracked.execution.is_terminal())
                .filter_map(|(id, tracked)| {
                    if tracked.outstanding {
                        tracing::debug!(id = %id, "Previous fetch still pending, skipping");
                        return None;
                    }
                    tracked.outstanding = true;
                    Some(id.clone())
                })
                .collect()
        };

        let handles = ids
            .into_iter()
            .map(|id| {
                let core = Arc::clone(self);
                tokio::spawn(async move { core.fetch(id).await })
            })
            .collect();
        PollCycle { handles }
    }

    async fn fetch(&self, id: String) {
        tracing::debug!(id = %id, "Polling status");
        let timeout = self.config.request_timeout;
        let result = tokio::time::timeout(timeout, self.service.workflow_status(&id))
            .await
            .unwrap_or_else(|_| Err(ServiceError::timeout(timeout)));
        self.complete_fetch(&id, result);
    }

    fn complete_fetch(&self, id: &str, result: Result<StatusResponse, ServiceError>) {
        let update = {
            let mut in_flight = self.lock();
            let Some(tracked) = in_flight.get_mut(id) else {
                tracing::debug!(id, "Dropping status for untracked execution");
                return;
            };
            tracked.outstanding = false;

            match result {
                Ok(update) => {
                    tracked.consecutive_failures = 0;
                    update
                }
                Err(e) => {
                    let e = FlowError::poll(id, e.message());
                    tracked.consecutive_failures += 1;
                    let failures = tracked.consecutive_failures;
                    if failures < self.config.failure_threshold {
                        tracing::warn!(id, failures, error = %e, "Status poll failed, retrying next cycle");
                        return;
                    }

                    let Some(Tracked { mut execution, .. }) = in_flight.remove(id) else {
                        return;
                    };
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(format!(
                        "status polling failed {} times in a row: {}",
                        failures, e
                    ));
                    execution.last_updated_at = self.clock.now();
                    drop(in_flight);

                    tracing::warn!(id, failures, "Giving up on execution after repeated poll failures");
                    self.finish(execution);
                    return;
                }
            }
        };

        self.apply_update(id, update);
    }

    fn apply_update(&self, id: &str, update: StatusResponse) -> ApplyOutcome {
        let finished = {
            let mut in_flight = self.lock();
            let Some(tracked) = in_flight.get_mut(id) else {
                return ApplyOutcome::Untracked;
            };
            let execution = &mut tracked.execution;

            if update.last_updated_at < execution.last_updated_at {
                tracing::debug!(
                    id,
                    stored = %execution.last_updated_at,
                    incoming = %update.last_updated_at,
                    "Discarding stale status"
                );
                return ApplyOutcome::Stale;
            }
            if !execution.status.can_become(update.status) {
                tracing::warn!(
                    id,
                    from = %execution.status,
                    to = %update.status,
                    "Discarding status regression"
                );
                return ApplyOutcome::Stale;
            }

            execution.status = update.status;
            execution.steps = update.steps;
            if let Some(results) = update.results {
                execution.results = results;
            }
            execution.error = update.error;
            execution.last_updated_at = update.last_updated_at;

            if !execution.is_terminal() {
                tracing::debug!(id, status = %execution.status, steps = execution.steps.len(), "Applied status");
                let _ = self.events.send(TrackerEvent::Updated(execution.clone()));
                return ApplyOutcome::Applied;
            }

            match in_flight.remove(id) {
                Some(tracked) => tracked.execution,
                None => return ApplyOutcome::Untracked,
            }
        };

        self.finish(finished);
        ApplyOutcome::Finished
    }

    /// Move a terminal execution into history
    fn finish(&self, execution: WorkflowExecution) {
        tracing::info!(
            id = %execution.id,
            status = %execution.status,
            steps = execution.successful_steps(),
            "Execution finished"
        );
        if let Err(e) = self.history.record(execution.clone()) {
            tracing::warn!(id = %execution.id, error = %e, "Failed to record execution in history");
        }
        let _ = self.events.send(TrackerEvent::Finished(execution));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::history::MemoryHistory;
    use crate::service::mock::MockService;
    use crate::workflow::{StepResult, WorkflowSubmission, WorkflowTemplate, WorkflowTemplateCatalog};
    use serde_json::json;

    struct Harness {
        tracker: WorkflowTracker,
        service: Arc<MockService>,
        history: Arc<MemoryHistory>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(service: MockService, config: TrackerConfig) -> Harness {
        let service = Arc::new(service);
        let history = Arc::new(MemoryHistory::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let tracker = WorkflowTracker::new(service.clone(), history.clone(), clock.clone(), config);
        Harness {
            tracker,
            service,
            history,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(MockService::new(), TrackerConfig::default())
    }

    impl Harness {
        fn starting(&self, id: &str) -> WorkflowExecution {
            WorkflowExecution::starting(id, "full", "Energie", HashMap::new(), self.clock.now())
        }

        fn status(&self, status: ExecutionStatus, after_secs: i64, steps: usize) -> StatusResponse {
            StatusResponse {
                status,
                steps: (0..steps).map(|i| StepResult::success(format!("step-{}", i))).collect(),
                results: None,
                error: None,
                last_updated_at: self.clock.now() + chrono::Duration::seconds(after_secs),
            }
        }
    }

    #[tokio::test]
    async fn test_pending_fetch_is_not_overlapped() {
        let (service, gate) = MockService::gated();
        let h = harness_with(service, TrackerConfig::default());
        h.tracker.track(h.starting("wf-1")).unwrap();
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Executing, 5, 1)));

        let first = h.tracker.poll_cycle();
        assert_eq!(first.issued(), 1);

        let second = h.tracker.poll_cycle();
        assert_eq!(second.issued(), 0);

        gate.add_permits(1);
        first.join().await;
        assert_eq!(h.service.status_calls(), 1);
        assert_eq!(h.tracker.get("wf-1").unwrap().status, ExecutionStatus::Executing);

        // the id becomes eligible again once its fetch completed
        let third = h.tracker.poll_cycle();
        assert_eq!(third.issued(), 1);
        gate.add_permits(1);
        third.join().await;
    }

    #[test]
    fn test_out_of_order_updates_keep_newest() {
        for newest_first in [true, false] {
            let h = harness();
            h.tracker.track(h.starting("wf-1")).unwrap();

            let older = h.status(ExecutionStatus::Executing, 5, 1);
            let newer = h.status(ExecutionStatus::Executing, 10, 2);

            if newest_first {
                assert_eq!(h.tracker.apply_update("wf-1", newer), ApplyOutcome::Applied);
                assert_eq!(h.tracker.apply_update("wf-1", older), ApplyOutcome::Stale);
            } else {
                assert_eq!(h.tracker.apply_update("wf-1", older), ApplyOutcome::Applied);
                assert_eq!(h.tracker.apply_update("wf-1", newer), ApplyOutcome::Applied);
            }

            let stored = h.tracker.get("wf-1").unwrap();
            assert_eq!(stored.steps.len(), 2);
            assert_eq!(stored.last_updated_at, h.clock.now() + chrono::Duration::seconds(10));
        }
    }

    #[test]
    fn test_status_regression_is_discarded() {
        let h = harness();
        h.tracker.track(h.starting("wf-1")).unwrap();

        h.tracker
            .apply_update("wf-1", h.status(ExecutionStatus::Executing, 5, 1));
        let outcome = h
            .tracker
            .apply_update("wf-1", h.status(ExecutionStatus::Starting, 10, 0));

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(h.tracker.get("wf-1").unwrap().status, ExecutionStatus::Executing);
    }

    #[tokio::test]
    async fn test_terminal_execution_is_never_polled_again() {
        let h = harness();
        h.tracker.track(h.starting("wf-1")).unwrap();
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Completed, 5, 3)));

        h.tracker.poll_cycle().join().await;

        assert!(h.tracker.in_flight().is_empty());
        assert_eq!(
            h.history.get("wf-1").unwrap().unwrap().status,
            ExecutionStatus::Completed
        );

        let cycle = h.tracker.poll_cycle();
        assert_eq!(cycle.issued(), 0);
        assert_eq!(h.service.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_threshold_synthesizes_failed() {
        let config = TrackerConfig {
            failure_threshold: 3,
            ..TrackerConfig::default()
        };
        let h = harness_with(MockService::new(), config);
        h.tracker.track(h.starting("wf-1")).unwrap();

        for _ in 0..2 {
            h.tracker.poll_cycle().join().await;
        }
        assert_eq!(h.tracker.get("wf-1").unwrap().status, ExecutionStatus::Starting);
        assert!(h.history.get("wf-1").unwrap().is_none());

        h.clock.advance(chrono::Duration::seconds(15));
        h.tracker.poll_cycle().join().await;

        let failed = h.history.get("wf-1").unwrap().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.error.unwrap().contains("3 times"));
        assert_eq!(failed.last_updated_at, h.clock.now());
        assert!(h.tracker.get("wf-1").is_none());

        assert_eq!(h.tracker.poll_cycle().issued(), 0);
        assert_eq!(h.service.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_counts_as_failure() {
        let (service, _gate) = MockService::gated();
        let config = TrackerConfig {
            request_timeout: Duration::from_secs(1),
            failure_threshold: 3,
            ..TrackerConfig::default()
        };
        let h = harness_with(service, config);
        h.tracker.track(h.starting("wf-1")).unwrap();

        for expected in 1..=2 {
            h.tracker.poll_cycle().join().await;
            let in_flight = h.tracker.core.lock();
            let tracked = &in_flight["wf-1"];
            assert_eq!(tracked.consecutive_failures, expected);
            assert!(!tracked.outstanding);
        }

        h.tracker.poll_cycle().join().await;
        let failed = h.history.get("wf-1").unwrap().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.error.unwrap().contains("timeout"));
        assert!(h.tracker.get("wf-1").is_none());
        assert_eq!(h.service.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let config = TrackerConfig {
            failure_threshold: 2,
            ..TrackerConfig::default()
        };
        let h = harness_with(MockService::new(), config);
        h.tracker.track(h.starting("wf-1")).unwrap();

        h.service
            .push_status("wf-1", Err(ServiceError::network("connection reset")));
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Executing, 5, 1)));
        h.service
            .push_status("wf-1", Err(ServiceError::network("connection reset")));

        for _ in 0..3 {
            h.tracker.poll_cycle().join().await;
        }

        assert_eq!(h.tracker.get("wf-1").unwrap().status, ExecutionStatus::Executing);
    }

    #[tokio::test]
    async fn test_result_after_untrack_is_dropped() {
        let (service, gate) = MockService::gated();
        let h = harness_with(service, TrackerConfig::default());
        h.tracker.track(h.starting("wf-1")).unwrap();
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Completed, 5, 3)));

        let cycle = h.tracker.poll_cycle();
        assert!(h.tracker.untrack("wf-1").is_some());

        gate.add_permits(1);
        cycle.join().await;

        assert!(h.tracker.get("wf-1").is_none());
        assert!(h.history.get("wf-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_result_after_shutdown_is_dropped() {
        let (service, gate) = MockService::gated();
        let h = harness_with(service, TrackerConfig::default());
        h.tracker.track(h.starting("wf-1")).unwrap();
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Executing, 5, 1)));

        let cycle = h.tracker.poll_cycle();
        h.tracker.shutdown();
        gate.add_permits(1);
        cycle.join().await;

        assert!(h.tracker.in_flight().is_empty());
        assert_eq!(h.history.len(), 0);
    }

    #[test]
    fn test_duplicate_track_rejected() {
        let h = harness();
        h.tracker.track(h.starting("wf-1")).unwrap();

        let err = h.tracker.track(h.starting("wf-1")).unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
        assert_eq!(h.tracker.in_flight().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_track_and_finish() {
        let h = harness();
        let catalog = WorkflowTemplateCatalog::new([WorkflowTemplate {
            id: "full".into(),
            name: "Full content run".into(),
            description: String::new(),
            steps: vec!["affirmations".into(), "captions".into(), "images".into()],
            default_options: HashMap::from([("count".to_string(), json!(5))]),
        }]);
        let submission = WorkflowSubmission::new(Arc::new(catalog), h.service.clone(), h.clock.clone());
        let mut events = h.tracker.subscribe();

        let execution = submission.submit("full", "Energie", HashMap::new()).await.unwrap();
        let id = execution.id.clone();
        h.tracker.track(execution).unwrap();
        assert_eq!(h.tracker.get(&id).unwrap().status, ExecutionStatus::Starting);

        h.service.push_status(&id, Ok(h.status(ExecutionStatus::Executing, 5, 1)));
        h.tracker.poll_cycle().join().await;
        let executing = h.tracker.get(&id).unwrap();
        assert_eq!(executing.status, ExecutionStatus::Executing);
        assert_eq!(executing.successful_steps(), 1);

        let mut completed = h.status(ExecutionStatus::Completed, 10, 3);
        completed.results = Some(HashMap::from([("affirmations".to_string(), json!(5))]));
        h.service.push_status(&id, Ok(completed));
        h.tracker.poll_cycle().join().await;

        assert!(h.tracker.get(&id).is_none());
        let stored = h.history.get(&id).unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(stored.successful_steps(), 3);
        assert_eq!(stored.results["affirmations"], json!(5));
        assert_eq!(h.history.aggregate(&id).unwrap()["affirmations"], 5);

        assert!(matches!(events.try_recv(), Ok(TrackerEvent::Updated(e)) if e.status == ExecutionStatus::Executing));
        assert!(matches!(events.try_recv(), Ok(TrackerEvent::Finished(e)) if e.status == ExecutionStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_polls_until_stopped() {
        let h = harness();
        h.tracker.track(h.starting("wf-1")).unwrap();
        h.service
            .push_status("wf-1", Ok(h.status(ExecutionStatus::Executing, 5, 1)));

        h.tracker.start();
        assert!(h.tracker.is_running());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.service.status_calls(), 1);
        assert_eq!(h.tracker.get("wf-1").unwrap().status, ExecutionStatus::Executing);

        h.tracker.stop();
        assert!(!h.tracker.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.service.status_calls(), 1);
    }
}
