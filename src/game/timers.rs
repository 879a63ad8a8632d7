//! One-shot cancellable timers on the tokio clock

use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

/// Handle to a scheduled callback. Dropping it leaves the timer armed.
#[derive(Debug)]
pub struct TimerHandle {
    handle: AbortHandle,
}

impl TimerHandle {
    /// Stop the timer if it has not fired yet. A callback that already
    /// started runs on its own task and is unaffected, so callbacks must
    /// re-validate whatever state they act on.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// Run `action` once `deadline` is reached
pub fn schedule_at<F, Fut>(deadline: Instant, action: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        sleep_until(deadline).await;
        tokio::spawn(action());
    });

    TimerHandle {
        handle: task.abort_handle(),
    }
}

/// Run `action` after `delay`
pub fn schedule<F, Fut>(delay: Duration, action: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    schedule_at(Instant::now() + delay, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let _handle = schedule(Duration::from_millis(500), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let handle = schedule(Duration::from_millis(100), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
