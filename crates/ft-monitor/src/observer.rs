//! Foreground window polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::poller::PollerHandle;
use crate::source::{ForegroundWindowSource, WindowSample};

/// How often the foreground window is sampled.
pub const WINDOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Notification raised on every window poll.
///
/// Empty process and title mean "no window" (query failure or observer stopped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowChanged {
    pub process_name: String,
    pub window_title: String,
}

impl WindowChanged {
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        self.process_name.is_empty() && self.window_title.is_empty()
    }
}

impl From<WindowSample> for WindowChanged {
    fn from(sample: WindowSample) -> Self {
        Self {
            process_name: sample.process_name,
            window_title: sample.window_title,
        }
    }
}

/// Polls the foreground window and publishes a [`WindowChanged`] every tick.
///
/// There is no equality check against the previous sample; consumers
/// deduplicate. The first sample is taken immediately on start.
pub struct WindowObserver<E> {
    source: Arc<dyn ForegroundWindowSource>,
    events: mpsc::UnboundedSender<E>,
    interval: Duration,
    poller: PollerHandle,
}

impl<E> WindowObserver<E>
where
    E: From<WindowChanged> + Send + 'static,
{
    pub fn new(source: Arc<dyn ForegroundWindowSource>, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            source,
            events,
            interval: WINDOW_POLL_INTERVAL,
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

    /// Starts polling. No-op if already running.
    pub fn start(&mut self) {
        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        let period = self.interval;
        if self
            .poller
            .start(|cancel| observe_loop(source, events, period, cancel))
        {
            tracing::debug!(interval = ?period, "window observer started");
        }
    }

    /// Stops polling and publishes one final cleared notification.
    pub fn stop(&mut self) {
        if self.poller.stop() {
            tracing::debug!("window observer stopped");
        }
        let _ = self.events.send(E::from(WindowChanged::cleared()));
    }
}

async fn observe_loop<E>(
    source: Arc<dyn ForegroundWindowSource>,
    events: mpsc::UnboundedSender<E>,
    period: Duration,
    cancel: CancellationToken,
) where
    E: From<WindowChanged> + Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = sample_window(&source).await;
                if cancel.is_cancelled() {
                    break;
                }
                if events.send(E::from(WindowChanged::from(sample))).is_err() {
                    tracing::debug!("window event receiver dropped; stopping observer");
                    break;
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}

/// Queries the source off the async workers; failures yield an empty sample.
async fn sample_window(source: &Arc<dyn ForegroundWindowSource>) -> WindowSample {
    let source = Arc::clone(source);
    match tokio::task::spawn_blocking(move || source.current_foreground_window()).await {
        Ok(Ok(sample)) => sample,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "foreground window query failed");
            WindowSample::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "foreground window query task failed");
            WindowSample::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct StaticWindow(WindowSample);

    impl ForegroundWindowSource for StaticWindow {
        fn current_foreground_window(&self) -> io::Result<WindowSample> {
            Ok(self.0.clone())
        }
    }

    struct BrokenWindow;

    impl ForegroundWindowSource for BrokenWindow {
        fn current_foreground_window(&self) -> io::Result<WindowSample> {
            Err(io::Error::other("no display"))
        }
    }

    fn editor() -> WindowSample {
        WindowSample {
            process_name: "code".to_string(),
            window_title: "main.rs - focus".to_string(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WindowChanged>) -> Vec<WindowChanged> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn emits_every_tick_including_repeats() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut observer = WindowObserver::new(Arc::new(StaticWindow(editor())), tx);

        observer.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        observer.stop();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        for event in &events[..3] {
            assert_eq!(event, &WindowChanged::from(editor()));
        }
        assert!(events[3].is_cleared());
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_emits_empty_notification() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut observer = WindowObserver::new(Arc::new(BrokenWindow), tx);

        observer.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        observer.stop();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(WindowChanged::is_cleared));
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_halts_polling() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut observer = WindowObserver::new(Arc::new(StaticWindow(editor())), tx);

        observer.start();
        observer.start();
        assert!(observer.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        observer.stop();
        assert!(!observer.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_cleared());
        assert!(events[1].is_cleared());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_still_clears() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut observer = WindowObserver::new(Arc::new(StaticWindow(editor())), tx);

        observer.stop();

        assert_eq!(drain(&mut rx), vec![WindowChanged::cleared()]);
    }
}
