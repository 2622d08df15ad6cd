//! Per-message task dispatch.
//!
//! Each inbound message gets its own task, so a slow classification only
//! delays that message. A semaphore caps how many pipelines run at once.
//!
//! Two ways to stop: [`Dispatcher::close`] stops accepting work and lets every
//! accepted message finish, while [`Dispatcher::shutdown`] also drops messages
//! still waiting for a permit. Both wait for running pipelines up to a grace
//! period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use warden_core::MessageEvent;

use crate::pipeline::{EnforcementPipeline, Outcome};

/// Spawns one pipeline run per inbound message.
pub struct Dispatcher {
    pipeline: Arc<EnforcementPipeline>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    accepting: AtomicBool,
    dropped: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Dispatcher running at most `max_in_flight` pipelines concurrently.
    pub fn new(pipeline: Arc<EnforcementPipeline>, max_in_flight: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            accepting: AtomicBool::new(true),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue `event`. Returns `false` once closing or shutdown has begun.
    pub fn dispatch(&self, event: MessageEvent) -> bool {
        if !self.accepting.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            debug!(message_id = %event.message_id, "dispatcher closed, refusing message");
            return false;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let dropped = Arc::clone(&self.dropped);
        let _ = self.tracker.spawn(async move {
            let _permit = tokio::select! {
                () = cancel.cancelled() => {
                    let _ = dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(message_id = %event.message_id, "shutdown before start, dropping message");
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            log_outcome(&event, &pipeline.handle(&event).await);
        });
        true
    }

    /// Tasks spawned and not yet finished (queued or running).
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Accepted messages dropped by [`Self::shutdown`] before they started.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every dispatched message has reached a terminal state.
    pub async fn drain(&self) {
        let _ = self.tracker.close();
        self.tracker.wait().await;
        let _ = self.tracker.reopen();
    }

    /// Stop accepting work and let every accepted message run, waiting up to
    /// `grace`. Messages still queued when the grace period ends are dropped
    /// as in [`Self::shutdown`]. Returns how many were dropped.
    pub async fn close(&self, grace: Duration) -> usize {
        self.accepting.store(false, Ordering::Release);
        let _ = self.tracker.close();
        info!(in_flight = self.tracker.len(), "dispatcher closing, draining accepted messages");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return 0;
        }
        warn!(
            remaining = self.tracker.len(),
            grace_ms = grace_ms(grace),
            "drain grace period elapsed, cancelling queued messages"
        );
        self.shutdown(grace).await
    }

    /// Stop accepting work, drop queued messages, and wait up to `grace` for
    /// running pipelines. Returns how many accepted messages were dropped.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.accepting.store(false, Ordering::Release);
        self.cancel.cancel();
        let _ = self.tracker.close();
        info!(in_flight = self.tracker.len(), "dispatcher shutting down");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                grace_ms = grace_ms(grace),
                "shutdown grace period elapsed with pipelines still running"
            );
        }
        let dropped = self.dropped();
        if dropped > 0 {
            warn!(dropped, "accepted messages dropped without enforcement");
        }
        dropped
    }
}

fn grace_ms(grace: Duration) -> u64 {
    u64::try_from(grace.as_millis()).unwrap_or(u64::MAX)
}

fn log_outcome(event: &MessageEvent, outcome: &Outcome) {
    match outcome {
        Outcome::Ignored(reason) => {
            debug!(message_id = %event.message_id, ?reason, "message ignored");
        }
        Outcome::NoViolation(summary) => {
            debug!(message_id = %event.message_id, scanned = summary.scanned, failed = summary.failed, "message clean");
        }
        Outcome::Violation(record) => {
            info!(
                message_id = %event.message_id,
                community_id = %record.community_id,
                member_id = %record.member_id,
                warning_count = record.warning_count,
                "message enforced"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::testutil::{MockClassifier, RecordingPlatform, image};
    use warden_core::{MessageEvent, Snapshot};
    use warden_ledger::{JsonFileStore, ViolationLedger};

    fn event(member: &str, id: &str, url: &str) -> MessageEvent {
        let mut e = crate::testutil::message("g1", member, vec![image(url)]);
        e.message_id = id.into();
        e
    }

    fn setup(classifier: MockClassifier, dir: &tempfile::TempDir) -> (Arc<ViolationLedger>, Arc<EnforcementPipeline>) {
        let store = Arc::new(JsonFileStore::new(dir.path().join("ledger.json")));
        let ledger = Arc::new(ViolationLedger::with_snapshot(Snapshot::default(), store));
        ledger.set_enabled(&"g1".into(), true);
        let pipeline = Arc::new(EnforcementPipeline::new(
            Arc::clone(&ledger),
            Arc::new(classifier),
            Arc::new(RecordingPlatform::new()),
            PipelineConfig::default(),
        ));
        (ledger, pipeline)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_violations_by_one_member_all_count() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, pipeline) = setup(MockClassifier::new().with_score("bad", 0.9), &dir);
        let dispatcher = Dispatcher::new(pipeline, 8);

        for i in 0..20 {
            assert!(dispatcher.dispatch(event("u1", &format!("m{i}"), "bad")));
        }
        dispatcher.drain().await;

        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u1".into()), 20);
        let counts: Vec<u32> = ledger.audit_trail().iter().map(|e| e.warning_count).collect();
        assert_eq!(counts, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn members_are_counted_independently() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, pipeline) = setup(MockClassifier::new().with_score("bad", 0.9), &dir);
        let dispatcher = Dispatcher::new(pipeline, 4);

        for i in 0..10 {
            let member = if i % 2 == 0 { "u1" } else { "u2" };
            let _ = dispatcher.dispatch(event(member, &format!("m{i}"), "bad"));
        }
        dispatcher.drain().await;

        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u1".into()), 5);
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u2".into()), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_message_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = MockClassifier::new()
            .with_score("slow", 0.1)
            .with_delay("slow", Duration::from_secs(10))
            .with_score("bad", 0.9);
        let (ledger, pipeline) = setup(classifier, &dir);
        let dispatcher = Dispatcher::new(pipeline, 4);

        let _ = dispatcher.dispatch(event("u1", "m1", "slow"));
        let _ = dispatcher.dispatch(event("u2", "m2", "bad"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u2".into()), 1);
        assert!(dispatcher.in_flight() >= 1);
        dispatcher.drain().await;
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_work_and_drops_queued() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = MockClassifier::new()
            .with_score("slow", 0.9)
            .with_delay("slow", Duration::from_secs(5));
        let (ledger, pipeline) = setup(classifier, &dir);
        let dispatcher = Dispatcher::new(pipeline, 1);

        let _ = dispatcher.dispatch(event("u1", "m1", "slow"));
        let _ = dispatcher.dispatch(event("u2", "m2", "slow"));
        tokio::task::yield_now().await;

        assert_eq!(dispatcher.shutdown(Duration::from_secs(30)).await, 1);
        assert!(!dispatcher.dispatch(event("u3", "m3", "slow")));

        // The running pipeline finished; the queued one never started.
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u1".into()), 1);
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u2".into()), 0);
        assert_eq!(dispatcher.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_runs_every_accepted_message() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = MockClassifier::new()
            .with_score("slow", 0.9)
            .with_delay("slow", Duration::from_secs(5));
        let (ledger, pipeline) = setup(classifier, &dir);
        let dispatcher = Dispatcher::new(pipeline, 1);

        for (i, member) in ["u1", "u2", "u3"].into_iter().enumerate() {
            assert!(dispatcher.dispatch(event(member, &format!("m{i}"), "slow")));
        }
        tokio::task::yield_now().await;

        assert_eq!(dispatcher.close(Duration::from_secs(60)).await, 0);
        assert!(!dispatcher.dispatch(event("u4", "m4", "slow")));
        for member in ["u1", "u2", "u3"] {
            assert_eq!(ledger.get_warning_count(&"g1".into(), &member.into()), 1);
        }
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_what_the_grace_period_cannot_cover() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = MockClassifier::new()
            .with_score("slow", 0.9)
            .with_delay("slow", Duration::from_secs(5));
        let (ledger, pipeline) = setup(classifier, &dir);
        let dispatcher = Dispatcher::new(pipeline, 1);

        let _ = dispatcher.dispatch(event("u1", "m1", "slow"));
        let _ = dispatcher.dispatch(event("u2", "m2", "slow"));
        let _ = dispatcher.dispatch(event("u3", "m3", "slow"));
        tokio::task::yield_now().await;

        // Room for the first two only.
        assert_eq!(dispatcher.close(Duration::from_secs(7)).await, 1);
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u1".into()), 1);
        assert_eq!(ledger.get_warning_count(&"g1".into(), &"u3".into()), 0);
    }
}
