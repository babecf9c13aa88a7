//! Poll scheduler module
//!
//! Fires a refresh callback at a fixed interval while a chat session is
//! active. Each tick first consults a suppression predicate; a suppressed
//! tick is dropped, not queued.
//!
//! The callback runs inside the timer task, so a slow refresh delays the
//! next tick instead of overlapping it. Ticks missed meanwhile are skipped.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Predicate that returns true while ticks must be skipped
pub type SuppressionPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

struct RunningTimer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Fixed-interval refresh trigger with a suppression gate
///
/// At most one timer runs per scheduler. `start` on a running scheduler
/// replaces the previous timer, and dropping the scheduler stops it.
///
/// # Example
/// ```rust,no_run
/// use staysync::scheduler::PollScheduler;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
///
/// # async fn example() {
/// let composing = Arc::new(AtomicBool::new(false));
/// let gate = composing.clone();
/// let scheduler = PollScheduler::new(Arc::new(move || gate.load(Ordering::SeqCst)));
///
/// scheduler.start(Duration::from_secs(4), || async {
///     println!("refresh");
/// });
///
/// // ... later, on teardown
/// scheduler.stop();
/// # }
/// ```
pub struct PollScheduler {
    suppressed: SuppressionPredicate,
    running: Mutex<Option<RunningTimer>>,
}

impl PollScheduler {
    /// Create a stopped scheduler gated by `suppressed`
    pub fn new(suppressed: SuppressionPredicate) -> Self {
        Self {
            suppressed,
            running: Mutex::new(None),
        }
    }

    /// A scheduler that never suppresses ticks
    pub fn ungated() -> Self {
        Self::new(Arc::new(|| false))
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningTimer>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin invoking `callback` every `period`
    ///
    /// The first tick fires one period after this call. Must be called from
    /// within a Tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running();
        if let Some(previous) = running.take() {
            debug!("Replacing running poll timer");
            Self::cancel(previous);
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let suppressed = Arc::clone(&self.suppressed);
        let period = period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if suppressed() {
                            debug!("Poll tick suppressed");
                            continue;
                        }
                        callback().await;
                    }
                }
            }
        });

        info!("Poll scheduler started ({} ms)", period.as_millis());
        *running = Some(RunningTimer {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Cancel the timer. Calling this on a stopped scheduler is a no-op.
    pub fn stop(&self) {
        if let Some(timer) = self.running().take() {
            Self::cancel(timer);
            info!("Poll scheduler stopped");
        }
    }

    /// Whether a timer is currently installed
    pub fn is_running(&self) -> bool {
        self.running().as_ref().is_some_and(|t| !t.task.is_finished())
    }

    fn cancel(timer: RunningTimer) {
        let _ = timer.shutdown.send(());
        // Also abort in case the callback is mid-flight
        timer.task.abort();
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}
