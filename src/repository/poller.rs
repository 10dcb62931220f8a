//! Cancellable background poll task.
//!
//! [`spawn_poller`] runs one cycle per interval on a dedicated tokio task.
//! A cycle is awaited to completion before the next tick is taken, so
//! cycles never overlap. [`PollerHandle::stop`] cancels the task and waits,
//! up to a bound, for an in-flight cycle to finish.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// What a cycle asks the poll loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    /// Keep polling.
    Continue,
    /// The owner is gone; exit the loop.
    Stop,
}

/// Handle for a running poll task. Dropping it cancels the task.
pub struct PollerHandle {
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PollerHandle {
    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Cancel the task and wait up to `timeout` for it to exit.
    ///
    /// A task still running after `timeout` is aborted at its next await
    /// point.
    pub async fn stop(mut self, timeout: Duration) {
        self.cancel.cancel();
        let Some(mut handle) = self.join_handle.take() else {
            return;
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "poll task ended abnormally"),
            Err(_) => {
                warn!(?timeout, "poll task did not stop in time; aborting");
                handle.abort();
            }
        }
    }
}

/// Spawn a poll loop calling `cycle` every `interval`.
///
/// The first cycle runs one full `interval` after spawning. Must be called
/// from within a tokio runtime.
#[must_use]
pub fn spawn_poller<F, Fut>(name: String, interval: Duration, mut cycle: F) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = PollControl> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let span = info_span!("repository_poller", store = %name);

    let join_handle = tokio::spawn(
        async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => {
                        debug!("poller cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if cycle().await == PollControl::Stop {
                            debug!("poller owner dropped");
                            break;
                        }
                    }
                }
            }
        }
        .instrument(span),
    );

    PollerHandle {
        cancel,
        join_handle: Some(join_handle),
    }
}
