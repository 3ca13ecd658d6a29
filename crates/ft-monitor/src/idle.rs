//! Input-idle polling with edge-triggered transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::poller::PollerHandle;
use crate::source::InputIdleSource;

/// How often input recency is checked.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Inactivity after which the user counts as idle.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Raised once per change of the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTransition {
    BecameIdle,
    BecameActive,
}

/// Polls input recency and reports idle/active transitions.
///
/// The user is idle when the time since last input is at least the threshold.
/// A failed query counts as input that just happened. The first poll happens
/// one interval after start.
pub struct IdleDetector<E> {
    source: Arc<dyn InputIdleSource>,
    events: mpsc::UnboundedSender<E>,
    threshold: Duration,
    interval: Duration,
    idle: Arc<AtomicBool>,
    poller: PollerHandle,
}

impl<E> IdleDetector<E>
where
    E: From<IdleTransition> + Send + 'static,
{
    pub fn new(
        source: Arc<dyn InputIdleSource>,
        events: mpsc::UnboundedSender<E>,
        threshold: Duration,
    ) -> Self {
        Self {
            source,
            events,
            threshold,
            interval: IDLE_POLL_INTERVAL,
            idle: Arc::new(AtomicBool::new(false)),
            poller: PollerHandle::default(),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    /// Starts polling. No-op if already running.
    pub fn start(&mut self) {
        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        let idle = Arc::clone(&self.idle);
        let threshold = self.threshold;
        let period = self.interval;
        if self.poller.start(|cancel| {
            idle_loop(source, events, idle, threshold, period, cancel)
        }) {
            tracing::debug!(threshold = ?threshold, "idle detector started");
        }
    }

    /// Stops polling and clears the idle flag without raising an event.
    pub fn stop(&mut self) {
        if self.poller.stop() {
            tracing::debug!("idle detector stopped");
        }
        self.idle.store(false, Ordering::SeqCst);
    }
}

async fn idle_loop<E>(
    source: Arc<dyn InputIdleSource>,
    events: mpsc::UnboundedSender<E>,
    idle: Arc<AtomicBool>,
    threshold: Duration,
    period: Duration,
    cancel: CancellationToken,
) where
    E: From<IdleTransition> + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let since_input = query_idle(&source).await;
                if cancel.is_cancelled() {
                    break;
                }
                let now_idle = since_input >= threshold;
                if idle.swap(now_idle, Ordering::SeqCst) == now_idle {
                    continue;
                }
                let transition = if now_idle {
                    tracing::info!(idle_for = ?since_input, "user became idle");
                    IdleTransition::BecameIdle
                } else {
                    tracing::info!("user became active");
                    IdleTransition::BecameActive
                };
                if events.send(E::from(transition)).is_err() {
                    tracing::debug!("idle event receiver dropped; stopping detector");
                    break;
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}

async fn query_idle(source: &Arc<dyn InputIdleSource>) -> Duration {
    let source = Arc::clone(source);
    let millis = match tokio::task::spawn_blocking(move || source.millis_since_last_input()).await {
        Ok(Ok(millis)) => millis,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "input idle query failed");
            0
        }
        Err(e) => {
            tracing::warn!(error = %e, "input idle query task failed");
            0
        }
    };
    Duration::from_millis(millis)
}
