//! Cancellable one-shot timer for credential refresh.
//!
//! At most one timer is pending at a time: scheduling always cancels the
//! previous handle first, and sign-out clears the handle unconditionally.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct RefreshTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, cancelling any pending timer first.
    /// Returns true when a pending timer was superseded.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Anchor the deadline to this call, not to the spawned task's
        // first poll.
        let deadline = tokio::time::Instant::now() + delay;

        let mut slot = self.handle.lock();
        let superseded = match slot.take() {
            Some(prev) if !prev.is_finished() => {
                prev.abort();
                true
            }
            _ => false,
        };
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        }));
        superseded
    }

    /// Cancel the pending timer, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Drop the stored handle without aborting it.
    ///
    /// Called from inside the fired task itself: the handle refers to the
    /// running task, and aborting it there would cut the refresh short at
    /// its next await point.
    pub fn disarm(&self) {
        self.handle.lock().take();
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timer.schedule(Duration::from_secs(60), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_pending());

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_supersedes_exactly_one_prior_timer() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let mut superseded = 0;
        for _ in 0..5 {
            let counter = fired.clone();
            if timer.schedule(Duration::from_secs(60), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) {
                superseded += 1;
            }
        }
        // N schedules cancel N-1 timers, never two, never zero
        assert_eq!(superseded, 4);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "only the last timer fires");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_still_supersedes_before_spawning() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        assert!(!timer.schedule(Duration::ZERO, async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        // The first task is aborted before the replacement even spawns,
        // so it can never win a race to its (already due) deadline.
        let counter = fired.clone();
        assert!(timer.schedule(Duration::ZERO, async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing_and_is_idempotent() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timer.schedule(Duration::from_secs(60), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timer.cancel());
        assert!(!timer.cancel(), "second cancel is a no-op");
        assert!(!timer.is_pending());

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
