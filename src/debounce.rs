//! Trailing-edge debounce for live preview queries. Each caller takes a
//! ticket, waits out the window, and only the newest ticket survives; a
//! superseded caller must not reach the remote endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time;

pub(crate) struct Debouncer {
    window: Duration,
    seq: AtomicU64,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Debouncer {
            window,
            seq: AtomicU64::new(0),
        }
    }

    /// Wait out the window. Returns `false` when a newer call arrived in the
    /// meantime and this one should be dropped without side effects.
    pub(crate) async fn settle(&self) -> bool {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        time::sleep(self.window).await;
        self.seq.load(Ordering::SeqCst) == ticket
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Debouncer;

    #[tokio::test(start_paused = true)]
    async fn lone_call_settles() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        assert!(debouncer.settle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_calls_supersede_older_ones() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (first, second) = tokio::join!(debouncer.settle(), debouncer.settle());
        assert!(!first);
        assert!(second);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_outside_the_window_both_settle() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        assert!(debouncer.settle().await);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(debouncer.settle().await);
    }
}
