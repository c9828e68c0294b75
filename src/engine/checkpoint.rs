use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Result of a cancellable delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Checkpoint {
    Elapsed,
    Cancelled,
}

/// Sleep for `total`, waking every `poll` to check `cancel`.
///
/// A cancel request is observed within one poll interval. Cancellation wins
/// over expiry when both are true at the same check.
pub(crate) async fn wait_or_cancel(total: Duration, poll: Duration, cancel: &AtomicBool) -> Checkpoint {
    let poll = poll.max(Duration::from_millis(1));
    let start = Instant::now();

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Checkpoint::Cancelled;
        }
        let elapsed = start.elapsed();
        if elapsed >= total {
            return Checkpoint::Elapsed;
        }
        tokio::time::sleep((total - elapsed).min(poll)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn elapses_without_cancel() {
        let cancel = AtomicBool::new(false);
        let start = Instant::now();
        let r = wait_or_cancel(Duration::from_secs(2), Duration::from_millis(100), &cancel).await;
        assert_eq!(r, Checkpoint::Elapsed);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_seen_within_one_poll() {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        let r = wait_or_cancel(Duration::from_secs(10), Duration::from_millis(100), &cancel).await;
        assert_eq!(r, Checkpoint::Cancelled);
        assert!(start.elapsed() <= Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_returns_immediately() {
        let cancel = AtomicBool::new(true);
        let r = wait_or_cancel(Duration::ZERO, Duration::ZERO, &cancel).await;
        assert_eq!(r, Checkpoint::Cancelled);
    }
}
