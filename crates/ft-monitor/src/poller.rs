//! Start/stop bookkeeping shared by the polling loops.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns at most one spawned polling loop.
///
/// Starting while a loop is alive is a no-op; stopping cancels and aborts it.
/// Dropping the handle stops the loop.
#[derive(Debug, Default)]
pub(crate) struct PollerHandle {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PollerHandle {
    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns the loop built by `make` unless one is already running.
    ///
    /// Returns `true` when a new loop was spawned. Must be called inside a
    /// tokio runtime.
    pub(crate) fn start<F, Fut>(&mut self, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }
        let cancel_token = CancellationToken::new();
        self.handle = Some(tokio::spawn(make(cancel_token.clone())));
        self.cancel_token = Some(cancel_token);
        true
    }

    /// Stops the loop. Returns `true` if one was running.
    pub(crate) fn stop(&mut self) -> bool {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take().is_some_and(|handle| {
            let running = !handle.is_finished();
            handle.abort();
            running
        })
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
