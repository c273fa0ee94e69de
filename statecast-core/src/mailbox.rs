//! Single-slot coalescing handoff between producers and the dispatch worker
//!
//! The slot holds at most one snapshot. A `put` replaces whatever is still
//! unclaimed, so a burst of updates between two worker wake-ups collapses to
//! the most recent one and memory stays O(1) no matter how fast producers go.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::state::StateSnapshot;

/// Overwrite-on-write mailbox with a wake signal
///
/// Safe for many concurrent producers and exactly one consumer.
#[derive(Debug, Default)]
pub struct CoalescingMailbox {
    slot: Mutex<Option<StateSnapshot>>,
    wake: Notify,
}

impl CoalescingMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending snapshot and wake the consumer.
    ///
    /// Never blocks beyond the slot's critical section. If the consumer is
    /// not currently waiting, the wake is stored and its next wait returns
    /// immediately.
    pub fn put(&self, snapshot: StateSnapshot) {
        let replaced = self.lock_slot().replace(snapshot);
        if replaced.is_some() {
            tracing::trace!("Coalesced unclaimed state snapshot");
        }
        self.wake.notify_one();
    }

    /// Remove and return the pending snapshot without waiting.
    pub fn try_take(&self) -> Option<StateSnapshot> {
        self.lock_slot().take()
    }

    /// Wait until a snapshot is available or `timeout` elapses.
    ///
    /// Must only be called from the single consumer.
    pub async fn take_or_timeout(&self, timeout: Duration) -> Option<StateSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(snapshot) = self.try_take() {
                return Some(snapshot);
            }
            // A stored permit from an already-claimed put wakes us with an
            // empty slot; keep waiting until the original deadline.
            if tokio::time::timeout_at(deadline, self.wake.notified())
                .await
                .is_err()
            {
                return self.try_take();
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<StateSnapshot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(key: &str, value: &str) -> StateSnapshot {
        StateSnapshot::from_pairs([(key, value)])
    }

    #[tokio::test]
    async fn test_put_then_take() {
        let mailbox = CoalescingMailbox::new();
        mailbox.put(snapshot("level", "1"));

        let taken = mailbox.take_or_timeout(Duration::from_secs(5)).await;
        assert_eq!(taken, Some(snapshot("level", "1")));
        assert!(mailbox.try_take().is_none());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let mailbox = CoalescingMailbox::new();
        for i in 0..100 {
            mailbox.put(snapshot("frame", &i.to_string()));
        }

        let taken = mailbox.take_or_timeout(Duration::from_millis(10)).await;
        assert_eq!(taken, Some(snapshot("frame", "99")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_mailbox_times_out() {
        let mailbox = CoalescingMailbox::new();
        let started = Instant::now();

        assert!(mailbox
            .take_or_timeout(Duration::from_secs(3))
            .await
            .is_none());
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_wake_does_not_end_wait_early() {
        let mailbox = CoalescingMailbox::new();
        mailbox.put(snapshot("a", "1"));
        // Claimed without waiting, leaving the stored wake behind
        assert!(mailbox.try_take().is_some());

        let started = Instant::now();
        assert!(mailbox
            .take_or_timeout(Duration::from_secs(2))
            .await
            .is_none());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_put_from_another_thread_wakes_consumer() {
        let mailbox = Arc::new(CoalescingMailbox::new());
        let producer = Arc::clone(&mailbox);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            producer.put(snapshot("scene", "menu"));
        });

        let taken = mailbox.take_or_timeout(Duration::from_secs(10)).await;
        assert_eq!(taken, Some(snapshot("scene", "menu")));
        handle.join().unwrap();
    }
}
