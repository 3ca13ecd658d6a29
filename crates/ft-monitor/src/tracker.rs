//! Single-writer orchestration of pollers, classification and aggregation.
//!
//! The [`Tracker`] owns the [`SegmentAggregator`] and consumes one merged
//! channel of [`TrackerEvent`]s fed by the window observer, the idle detector,
//! the heartbeat, and classification completions. Only the actor task touches
//! the aggregator.
//!
//! Window notifications arrive every second whether or not anything changed.
//! A notification for the (window context, task content) pair that is already
//! being tracked is a no-op, unless its last classification produced no score,
//! in which case it is classified again. Anything else cancels the in-flight
//! classification and starts a new pending segment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ft_core::{
    AggregatorState, AlignmentResult, ClassificationCache, Classifier, ClassifyError, ContextHash,
    FocusSegment, PendingTicket, SegmentAggregator, Task, TaskContentHash, TaskId, WindowContext,
};
use ft_db::{Database, DbError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::heartbeat::{Heartbeat, Tick};
use crate::idle::{DEFAULT_IDLE_THRESHOLD, IdleDetector, IdleTransition};
use crate::observer::{WindowChanged, WindowObserver};
use crate::source::{ForegroundWindowSource, InputIdleSource, WindowSample};

/// Heartbeat ticks between background flushes.
pub const FLUSH_EVERY_TICKS: u32 = 5;

pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracker errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("flush task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Process names of the window the tracker is shown in (usually the
    /// terminal emulator); seeing one pauses scoring. Compared case-insensitively.
    pub self_process_names: Vec<String>,
    pub classify_timeout: Duration,
    pub idle_threshold: Duration,
    pub flush_every_ticks: u32,
    /// Cache entries older than this are evicted when tracking starts.
    pub cache_max_age: Option<chrono::Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            self_process_names: vec!["ft".to_string()],
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            flush_every_ticks: FLUSH_EVERY_TICKS,
            cache_max_age: Some(chrono::Duration::days(30)),
        }
    }
}

/// Everything the tracker reacts to.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    WindowChanged(WindowChanged),
    Idle(IdleTransition),
    Tick,
    /// Completion of a classification; `None` when no score is available.
    Classified {
        ticket: PendingTicket,
        outcome: Option<AlignmentResult>,
    },
    Shutdown,
}

impl From<WindowChanged> for TrackerEvent {
    fn from(event: WindowChanged) -> Self {
        Self::WindowChanged(event)
    }
}

impl From<IdleTransition> for TrackerEvent {
    fn from(event: IdleTransition) -> Self {
        Self::Idle(event)
    }
}

impl From<Tick> for TrackerEvent {
    fn from(_: Tick) -> Self {
        Self::Tick
    }
}

/// Published after every event that changes what a display would show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub task_id: Option<TaskId>,
    pub elapsed_seconds: i64,
    pub focus_score_percent: u8,
    pub has_real_score: bool,
    pub state: AggregatorState,
    pub current_segment_seconds: i64,
    pub window: Option<WindowSample>,
    pub last_verdict: Option<AlignmentResult>,
    pub idle: bool,
    pub viewing_self: bool,
}

/// Cloneable handle for feeding and observing a running tracker.
#[derive(Clone)]
pub struct TrackerHandle {
    events: mpsc::UnboundedSender<TrackerEvent>,
    snapshot: watch::Receiver<TrackerSnapshot>,
}

impl TrackerHandle {
    /// Asks the tracker to flush and exit. Returns `false` if it already exited.
    pub fn shutdown(&self) -> bool {
        self.events.send(TrackerEvent::Shutdown).is_ok()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.clone()
    }
}

/// Checkpoint written by a flush.
struct FlushRequest {
    task_id: TaskId,
    segments: Vec<FocusSegment>,
    elapsed_seconds: i64,
    focus_score_percent: Option<u8>,
}

pub struct Tracker<C> {
    task: Option<Task>,
    task_hash: Option<TaskContentHash>,
    aggregator: SegmentAggregator,
    db: Arc<Mutex<Database>>,
    cache: Arc<ClassificationCache<C, Database>>,
    config: TrackerConfig,
    events_tx: mpsc::UnboundedSender<TrackerEvent>,
    events_rx: mpsc::UnboundedReceiver<TrackerEvent>,
    snapshot_tx: watch::Sender<TrackerSnapshot>,
    window_observer: WindowObserver<TrackerEvent>,
    idle_detector: IdleDetector<TrackerEvent>,
    heartbeat: Heartbeat<TrackerEvent>,
    elapsed_seconds: i64,
    ticks_since_flush: u32,
    tracked: Option<(ContextHash, TaskContentHash)>,
    pending_ticket: Option<PendingTicket>,
    in_flight: Option<CancellationToken>,
    pending_flush: Option<JoinHandle<()>>,
    window: Option<WindowSample>,
    last_verdict: Option<AlignmentResult>,
    idle: bool,
    viewing_self: bool,
}

impl<C: Classifier + 'static> Tracker<C> {
    /// Builds a tracker for the task currently in progress, loading its
    /// stored segments and elapsed time.
    ///
    /// With no task in progress the tracker still runs but ignores activity.
    pub fn new(
        db: Arc<Mutex<Database>>,
        classifier: C,
        window_source: Arc<dyn ForegroundWindowSource>,
        idle_source: Arc<dyn InputIdleSource>,
        config: TrackerConfig,
    ) -> Result<Self, MonitorError> {
        let mut aggregator = SegmentAggregator::new();
        let task = {
            let db = db.lock().map_err(|_| MonitorError::LockPoisoned)?;
            let task = db.in_progress_task()?;
            if let Some(task) = &task {
                aggregator.load_segments_for_task(&*db, &task.id)?;
            }
            task
        };
        let elapsed_seconds = task.as_ref().map_or(0, |t| t.total_elapsed_seconds);
        let task_hash = task.as_ref().map(Task::content_hash);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let window_observer = WindowObserver::new(window_source, events_tx.clone());
        let idle_detector =
            IdleDetector::new(idle_source, events_tx.clone(), config.idle_threshold);
        let heartbeat = Heartbeat::new(events_tx.clone());
        let cache = Arc::new(ClassificationCache::new(classifier, Arc::clone(&db)));

        let tracker = Self {
            task,
            task_hash,
            aggregator,
            db,
            cache,
            config,
            events_tx,
            events_rx,
            snapshot_tx: watch::channel(empty_snapshot()).0,
            window_observer,
            idle_detector,
            heartbeat,
            elapsed_seconds,
            ticks_since_flush: 0,
            tracked: None,
            pending_ticket: None,
            in_flight: None,
            pending_flush: None,
            window: None,
            last_verdict: None,
            idle: false,
            viewing_self: false,
        };
        tracker.publish(Utc::now());
        Ok(tracker)
    }

    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle {
            events: self.events_tx.clone(),
            snapshot: self.snapshot_tx.subscribe(),
        }
    }

    pub const fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Runs until [`TrackerEvent::Shutdown`], then flushes and returns the final snapshot.
    pub async fn run(mut self) -> Result<TrackerSnapshot, MonitorError> {
        match &self.task {
            Some(task) => tracing::info!(task = %task.id, description = %task.description, "tracker started"),
            None => tracing::info!("tracker started without a task in progress"),
        }
        if let Some(max_age) = self.config.cache_max_age {
            if let Err(e) = self.cache.evict_older_than(max_age) {
                tracing::warn!(error = %e, "failed to evict stale alignment cache entries");
            }
        }
        self.heartbeat.start();
        self.window_observer.start();
        self.idle_detector.start();

        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, TrackerEvent::Shutdown) {
                break;
            }
            self.handle_event(event, Utc::now());
        }

        self.shutdown().await
    }

    fn handle_event(&mut self, event: TrackerEvent, now: DateTime<Utc>) {
        match event {
            TrackerEvent::WindowChanged(window) => self.on_window_changed(window, now),
            TrackerEvent::Idle(IdleTransition::BecameIdle) => self.on_idle(now),
            TrackerEvent::Idle(IdleTransition::BecameActive) => self.on_active(now),
            TrackerEvent::Tick => self.on_tick(now),
            TrackerEvent::Classified { ticket, outcome } => self.on_classified(ticket, outcome, now),
            TrackerEvent::Shutdown => {}
        }
    }

    fn on_window_changed(&mut self, window: WindowChanged, now: DateTime<Utc>) {
        let (Some(task), Some(task_hash)) = (&self.task, &self.task_hash) else {
            return;
        };
        if self.idle {
            tracing::trace!("ignoring window notification while idle");
            return;
        }
        if window.is_cleared() {
            self.window = None;
            self.pause(now);
            self.publish(now);
            return;
        }
        if self.is_own_window(&window.process_name) {
            if !self.viewing_self {
                tracing::debug!("tracker window in foreground; pausing");
            }
            self.viewing_self = true;
            self.window = None;
            self.pause(now);
            self.publish(now);
            return;
        }
        self.viewing_self = false;

        let context = WindowContext::new(&window.process_name, &window.window_title);
        let key = (context.context_hash.clone(), task_hash.clone());
        if self.tracked.as_ref() == Some(&key) {
            self.retry_unscored(&window);
            return;
        }

        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        let task_id = task.id.clone();
        let ticket = self.aggregator.start_pending_segment_at(
            &task_id,
            &context.context_hash,
            Some(&context.window_title),
            Some(&context.process_name),
            now,
        );
        tracing::debug!(
            process = %window.process_name,
            title = %context.window_title,
            generation = ticket.generation(),
            "window changed"
        );
        self.spawn_classification(ticket, &window);
        self.tracked = Some(key);
        self.pending_ticket = Some(ticket);
        self.window = Some(WindowSample {
            process_name: window.process_name,
            window_title: window.window_title,
        });
        self.publish(now);
    }

    fn is_own_window(&self, process_name: &str) -> bool {
        self.config
            .self_process_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(process_name))
    }

    /// Classifies the tracked window again if its last attempt produced no score.
    fn retry_unscored(&mut self, window: &WindowChanged) {
        if self.in_flight.is_some() || self.aggregator.state() != AggregatorState::Pending {
            return;
        }
        let Some(ticket) = self.pending_ticket else {
            return;
        };
        tracing::trace!(generation = ticket.generation(), "retrying classification");
        self.spawn_classification(ticket, window);
    }

    fn spawn_classification(&mut self, ticket: PendingTicket, window: &WindowChanged) {
        let Some(task) = &self.task else {
            return;
        };
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());

        let cache = Arc::clone(&self.cache);
        let events = self.events_tx.clone();
        let timeout = self.config.classify_timeout;
        let description = task.description.clone();
        let hint = task.context.clone();
        let process = window.process_name.clone();
        let title = window.window_title.clone();

        tokio::spawn(async move {
            let classify = cache.classify(&description, hint.as_deref(), &process, &title);
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!(generation = ticket.generation(), "classification superseded");
                    return;
                }
                result = tokio::time::timeout(timeout, classify) => match result {
                    Ok(Ok(result)) => Some(result),
                    Ok(Err(ClassifyError::NotConfigured)) => {
                        tracing::debug!("classifier not configured; window stays unscored");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, process = %process, "classification failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(timeout = ?timeout, process = %process, "classification timed out");
                        None
                    }
                },
            };
            let _ = events.send(TrackerEvent::Classified { ticket, outcome });
        });
    }

    fn on_classified(
        &mut self,
        ticket: PendingTicket,
        outcome: Option<AlignmentResult>,
        now: DateTime<Utc>,
    ) {
        if self.pending_ticket == Some(ticket) {
            self.in_flight = None;
        }
        let Some(result) = outcome else {
            return;
        };
        if self
            .aggregator
            .update_pending_segment_score_at(ticket, result.score, now)
        {
            tracing::debug!(score = %result.score, reason = %result.reason, "window scored");
            self.last_verdict = Some(result);
            self.publish(now);
        }
    }

    fn on_idle(&mut self, now: DateTime<Utc>) {
        if self.task.is_none() {
            return;
        }
        tracing::info!("user idle; pausing tracking");
        self.idle = true;
        self.pause(now);
        self.heartbeat.stop();
        self.window_observer.stop();
        self.publish(now);
    }

    fn on_active(&mut self, now: DateTime<Utc>) {
        if self.task.is_none() {
            return;
        }
        tracing::info!("user active; resuming tracking");
        self.idle = false;
        self.heartbeat.start();
        self.window_observer.start();
        self.publish(now);
    }

    fn on_tick(&mut self, now: DateTime<Utc>) {
        if self.task.is_none() {
            return;
        }
        self.elapsed_seconds += 1;
        self.ticks_since_flush += 1;
        self.publish(now);
        if self.ticks_since_flush >= self.config.flush_every_ticks {
            self.ticks_since_flush = 0;
            self.spawn_flush(now);
        }
    }

    /// Pauses scoring and forgets the tracked context so the next window starts fresh.
    fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.aggregator.pause_current_segment_at(now);
        self.tracked = None;
        self.pending_ticket = None;
    }

    fn spawn_flush(&mut self, now: DateTime<Utc>) {
        if self
            .pending_flush
            .as_ref()
            .is_some_and(|flush| !flush.is_finished())
        {
            tracing::debug!("previous flush still running; skipping");
            return;
        }
        let Some(request) = self.flush_request(now) else {
            return;
        };
        let db = Arc::clone(&self.db);
        self.pending_flush = Some(tokio::task::spawn_blocking(move || {
            if let Err(e) = save_progress(&db, &request) {
                tracing::warn!(error = %e, task = %request.task_id, "background flush failed");
            }
        }));
    }

    fn flush_request(&self, now: DateTime<Utc>) -> Option<FlushRequest> {
        let task = self.task.as_ref()?;
        let focus_score_percent = self
            .aggregator
            .has_real_score(&task.id)
            .then(|| self.aggregator.focus_score_percent_at(&task.id, now));
        Some(FlushRequest {
            task_id: task.id.clone(),
            segments: self
                .aggregator
                .segments_at(now)
                .into_iter()
                .filter(|segment| segment.task_id == task.id)
                .collect(),
            elapsed_seconds: self.elapsed_seconds,
            focus_score_percent,
        })
    }

    async fn shutdown(mut self) -> Result<TrackerSnapshot, MonitorError> {
        let now = Utc::now();
        self.pause(now);
        self.heartbeat.stop();
        self.window_observer.stop();
        self.idle_detector.stop();

        if let Some(flush) = self.pending_flush.take() {
            flush.await?;
        }
        if let Some(request) = self.flush_request(now) {
            let db = Arc::clone(&self.db);
            let saved = tokio::task::spawn_blocking(move || save_progress(&db, &request)).await??;
            tracing::info!(segments = saved, elapsed = self.elapsed_seconds, "tracker state saved");
        }
        self.publish(now);
        Ok(self.snapshot_tx.borrow().clone())
    }

    fn publish(&self, now: DateTime<Utc>) {
        let snapshot = match &self.task {
            Some(task) => TrackerSnapshot {
                task_id: Some(task.id.clone()),
                elapsed_seconds: self.elapsed_seconds,
                focus_score_percent: self.aggregator.focus_score_percent_at(&task.id, now),
                has_real_score: self.aggregator.has_real_score(&task.id),
                state: self.aggregator.state(),
                current_segment_seconds: self.aggregator.current_segment_duration_seconds_at(now),
                window: self.window.clone(),
                last_verdict: self.last_verdict.clone(),
                idle: self.idle,
                viewing_self: self.viewing_self,
            },
            None => TrackerSnapshot {
                idle: self.idle,
                ..empty_snapshot()
            },
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

fn empty_snapshot() -> TrackerSnapshot {
    TrackerSnapshot {
        task_id: None,
        elapsed_seconds: 0,
        focus_score_percent: 0,
        has_real_score: false,
        state: AggregatorState::Idle,
        current_segment_seconds: 0,
        window: None,
        last_verdict: None,
        idle: false,
        viewing_self: false,
    }
}

fn save_progress(db: &Mutex<Database>, request: &FlushRequest) -> Result<usize, MonitorError> {
    let mut db = db.lock().map_err(|_| MonitorError::LockPoisoned)?;
    Ok(db.save_progress(
        &request.task_id,
        &request.segments,
        request.elapsed_seconds,
        request.focus_score_percent,
    )?)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ft_core::{AlignmentScore, ClassificationRequest, TaskStatus};

    use super::*;

    struct StaticWindow(WindowSample);

    impl ForegroundWindowSource for StaticWindow {
        fn current_foreground_window(&self) -> io::Result<WindowSample> {
            Ok(self.0.clone())
        }
    }

    struct NeverIdle;

    impl InputIdleSource for NeverIdle {
        fn millis_since_last_input(&self) -> io::Result<u64> {
            Ok(0)
        }
    }

    /// Scores every window the same and counts calls. The first
    /// `fail_first` calls fail.
    struct FakeClassifier {
        calls: Arc<AtomicUsize>,
        score: Option<i64>,
        fail_first: usize,
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(
            &self,
            request: &ClassificationRequest,
        ) -> Result<AlignmentResult, ClassifyError> {
            let previous = self.calls.fetch_add(1, Ordering::SeqCst);
            let score = self
                .score
                .filter(|_| previous >= self.fail_first)
                .ok_or_else(|| ClassifyError::failed(io::Error::other("backend unavailable")))?;
            Ok(AlignmentResult {
                score: AlignmentScore::clamped(score),
                reason: format!("{} fits", request.process_name),
            })
        }
    }

    struct Fixture {
        tracker: Tracker<FakeClassifier>,
        db: Arc<Mutex<Database>>,
        calls: Arc<AtomicUsize>,
        task_id: Option<TaskId>,
    }

    fn editor() -> WindowSample {
        WindowSample {
            process_name: "code".to_string(),
            window_title: "report.md - code".to_string(),
        }
    }

    fn fixture(with_task: bool, score: Option<i64>) -> Fixture {
        fixture_with(with_task, score, 0, TrackerConfig::default())
    }

    fn fixture_with(
        with_task: bool,
        score: Option<i64>,
        fail_first: usize,
        config: TrackerConfig,
    ) -> Fixture {
        let mut db = Database::open_in_memory().unwrap();
        let task_id = with_task.then(|| {
            let task = db.add_task("Write the report", None).unwrap();
            db.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
            task.id
        });
        let db = Arc::new(Mutex::new(db));
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = FakeClassifier {
            calls: Arc::clone(&calls),
            score,
            fail_first,
        };
        let tracker = Tracker::new(
            Arc::clone(&db),
            classifier,
            Arc::new(StaticWindow(editor())),
            Arc::new(NeverIdle),
            config,
        )
        .unwrap();
        Fixture {
            tracker,
            db,
            calls,
            task_id,
        }
    }

    fn window(process: &str, title: &str) -> TrackerEvent {
        TrackerEvent::WindowChanged(WindowChanged {
            process_name: process.to_string(),
            window_title: title.to_string(),
        })
    }

    impl Fixture {
        fn send(&mut self, event: TrackerEvent) {
            self.tracker.handle_event(event, Utc::now());
        }

        /// Waits for the next event the tracker posted to itself and handles it.
        async fn process_next(&mut self) -> TrackerEvent {
            let event = self.tracker.events_rx.recv().await.unwrap();
            self.send(event.clone());
            event
        }

        fn state(&self) -> AggregatorState {
            self.tracker.aggregator.state()
        }
    }

    #[tokio::test]
    async fn new_window_is_classified_and_scored() {
        let mut fx = fixture(true, Some(8));

        fx.send(window("code", "report.md - code"));
        assert_eq!(fx.state(), AggregatorState::Pending);

        let event = fx.process_next().await;
        assert!(matches!(event, TrackerEvent::Classified { outcome: Some(_), .. }));
        assert_eq!(fx.state(), AggregatorState::Scoring);

        let snapshot = fx.tracker.handle().snapshot();
        assert!(snapshot.has_real_score);
        assert_eq!(snapshot.last_verdict.unwrap().score.value(), 8);
        assert_eq!(snapshot.window.unwrap().process_name, "code");
    }

    #[tokio::test]
    async fn repeat_notifications_do_not_reclassify() {
        let mut fx = fixture(true, Some(8));

        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        for _ in 0..3 {
            fx.send(window("code", "report.md - code"));
        }
        tokio::task::yield_now().await;

        assert_eq!(fx.state(), AggregatorState::Scoring);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert!(fx.tracker.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn superseded_classification_cannot_score() {
        let mut fx = fixture(true, Some(8));

        fx.send(window("code", "report.md - code"));
        let stale = fx.tracker.pending_ticket.unwrap();
        fx.send(window("firefox", "Video - Firefox"));

        fx.send(TrackerEvent::Classified {
            ticket: stale,
            outcome: Some(AlignmentResult {
                score: AlignmentScore::MAX,
                reason: "late".to_string(),
            }),
        });
        assert_eq!(fx.state(), AggregatorState::Pending);

        fx.process_next().await;
        assert_eq!(fx.state(), AggregatorState::Scoring);
        assert_eq!(
            fx.tracker.handle().snapshot().last_verdict.unwrap().reason,
            "firefox fits"
        );
    }

    #[tokio::test]
    async fn failed_classification_keeps_window_pending() {
        let mut fx = fixture(true, None);

        fx.send(window("code", "report.md - code"));
        let event = fx.process_next().await;

        assert!(matches!(event, TrackerEvent::Classified { outcome: None, .. }));
        assert_eq!(fx.state(), AggregatorState::Pending);
        assert!(!fx.tracker.handle().snapshot().has_real_score);
    }

    #[tokio::test]
    async fn failed_classification_is_retried_on_next_poll() {
        let mut fx = fixture_with(true, Some(9), 1, TrackerConfig::default());

        fx.send(window("code", "report.md - code"));
        let ticket = fx.tracker.pending_ticket.unwrap();
        let first = fx.process_next().await;
        assert!(matches!(first, TrackerEvent::Classified { outcome: None, .. }));
        assert_eq!(fx.state(), AggregatorState::Pending);

        // the same window keeps its pending segment and is classified again
        fx.send(window("code", "report.md - code"));
        assert_eq!(fx.tracker.pending_ticket, Some(ticket));
        let second = fx.process_next().await;
        assert!(matches!(second, TrackerEvent::Classified { outcome: Some(_), .. }));
        assert_eq!(fx.state(), AggregatorState::Scoring);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);

        // once scored, repeats are no-ops again
        for _ in 0..3 {
            fx.send(window("code", "report.md - code"));
        }
        tokio::task::yield_now().await;
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
        assert!(fx.tracker.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn repeat_polls_wait_for_in_flight_classification() {
        let mut fx = fixture(true, Some(4));

        fx.send(window("code", "report.md - code"));
        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        tokio::task::yield_now().await;

        assert_eq!(fx.state(), AggregatorState::Scoring);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert!(fx.tracker.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_window_pauses_without_classifying() {
        let mut fx = fixture(true, Some(7));

        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        fx.send(window("FT", "focus tracker"));

        assert_eq!(fx.state(), AggregatorState::Idle);
        assert!(fx.tracker.handle().snapshot().viewing_self);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

        // returning to the same window starts it again
        fx.send(window("code", "report.md - code"));
        assert_eq!(fx.state(), AggregatorState::Pending);
        assert!(!fx.tracker.handle().snapshot().viewing_self);
    }

    #[tokio::test]
    async fn configured_terminal_counts_as_own_window() {
        let config = TrackerConfig {
            self_process_names: vec!["ft".to_string(), "kitty".to_string()],
            ..TrackerConfig::default()
        };
        let mut fx = fixture_with(true, Some(7), 0, config);

        fx.send(window("Kitty", "ft track"));

        assert_eq!(fx.state(), AggregatorState::Idle);
        assert!(fx.tracker.handle().snapshot().viewing_self);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cleared_window_pauses() {
        let mut fx = fixture(true, Some(7));

        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        fx.send(TrackerEvent::WindowChanged(WindowChanged::cleared()));

        assert_eq!(fx.state(), AggregatorState::Idle);
        assert!(fx.tracker.handle().snapshot().window.is_none());
    }

    #[tokio::test]
    async fn idle_pauses_and_active_resumes_observation() {
        let mut fx = fixture(true, Some(7));

        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        fx.send(TrackerEvent::Idle(IdleTransition::BecameIdle));

        assert_eq!(fx.state(), AggregatorState::Idle);
        assert!(fx.tracker.handle().snapshot().idle);
        // window observer stop posts a cleared notification; ignored while idle
        let cleared = fx.process_next().await;
        assert!(matches!(cleared, TrackerEvent::WindowChanged(w) if w.is_cleared()));
        fx.send(window("firefox", "Video - Firefox"));
        assert_eq!(fx.state(), AggregatorState::Idle);

        fx.send(TrackerEvent::Idle(IdleTransition::BecameActive));
        assert!(fx.tracker.heartbeat.is_running());
        let sampled = fx.process_next().await;
        assert!(matches!(sampled, TrackerEvent::WindowChanged(w) if w.process_name == "code"));
        assert_eq!(fx.state(), AggregatorState::Pending);

        fx.tracker.heartbeat.stop();
        fx.tracker.window_observer.stop();
    }

    #[tokio::test]
    async fn flushes_every_five_ticks() {
        let mut fx = fixture(true, Some(9));
        let task_id = fx.task_id.clone().unwrap();

        fx.send(window("code", "report.md - code"));
        fx.process_next().await;
        for _ in 0..4 {
            fx.send(TrackerEvent::Tick);
        }
        assert!(fx.tracker.pending_flush.is_none());

        fx.send(TrackerEvent::Tick);
        fx.tracker.pending_flush.take().unwrap().await.unwrap();

        let task = fx.db.lock().unwrap().get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.total_elapsed_seconds, 5);
        assert!(task.focus_score_percent.is_some());
        assert_eq!(fx.tracker.handle().snapshot().elapsed_seconds, 5);
    }

    #[tokio::test]
    async fn without_task_events_are_ignored() {
        let mut fx = fixture(false, Some(9));

        fx.send(window("code", "report.md - code"));
        fx.send(TrackerEvent::Tick);
        tokio::task::yield_now().await;

        assert_eq!(fx.state(), AggregatorState::Idle);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.tracker.handle().snapshot(), empty_snapshot());
    }

    #[tokio::test]
    async fn without_task_idle_transitions_are_ignored() {
        let mut fx = fixture(false, Some(9));

        fx.send(TrackerEvent::Idle(IdleTransition::BecameActive));
        assert!(!fx.tracker.heartbeat.is_running());
        assert!(!fx.tracker.window_observer.is_running());

        fx.send(TrackerEvent::Idle(IdleTransition::BecameIdle));
        tokio::task::yield_now().await;
        assert!(!fx.tracker.handle().snapshot().idle);
        assert!(fx.tracker.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resumes_stored_elapsed_time() {
        let mut db = Database::open_in_memory().unwrap();
        let task = db.add_task("Resume me", None).unwrap();
        db.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
        db.update_task_elapsed(&task.id, 120).unwrap();

        let tracker = Tracker::new(
            Arc::new(Mutex::new(db)),
            FakeClassifier {
                calls: Arc::new(AtomicUsize::new(0)),
                score: Some(5),
                fail_first: 0,
            },
            Arc::new(StaticWindow(editor())),
            Arc::new(NeverIdle),
            TrackerConfig::default(),
        )
        .unwrap();

        assert_eq!(tracker.task().unwrap().id, task.id);
        assert_eq!(tracker.handle().snapshot().elapsed_seconds, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn run_tracks_until_shutdown() {
        let fx = fixture(true, Some(6));
        let task_id = fx.task_id.clone().unwrap();
        let handle = fx.tracker.handle();

        let running = tokio::spawn(fx.tracker.run());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(handle.shutdown());
        let snapshot = running.await.unwrap().unwrap();

        assert_eq!(snapshot.elapsed_seconds, 3);
        assert_eq!(snapshot.last_verdict.unwrap().score.value(), 6);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        let task = fx.db.lock().unwrap().get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.total_elapsed_seconds, 3);
    }
}
