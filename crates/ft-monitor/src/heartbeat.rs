//! Periodic tick for elapsed-time bookkeeping.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::poller::PollerHandle;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Payload-free heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// Emits a [`Tick`] every interval while running, starting one interval after start.
pub struct Heartbeat<E> {
    events: mpsc::UnboundedSender<E>,
    interval: Duration,
    poller: PollerHandle,
}

impl<E> Heartbeat<E>
where
    E: From<Tick> + Send + 'static,
{
    pub fn new(events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            events,
            interval: HEARTBEAT_INTERVAL,
            poller: PollerHandle::default(),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn start(&mut self) {
        let events = self.events.clone();
        let period = self.interval;
        if self.poller.start(|cancel| tick_loop(events, period, cancel)) {
            tracing::debug!("heartbeat started");
        }
    }

    pub fn stop(&mut self) {
        if self.poller.stop() {
            tracing::debug!("heartbeat stopped");
        }
    }
}

async fn tick_loop<E>(events: mpsc::UnboundedSender<E>, period: Duration, cancel: CancellationToken)
where
    E: From<Tick> + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if events.send(E::from(Tick)).is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}
