//! Bounded, never-blocking channel for scoring notices.
//!
//! Refresh cycles push notices from their own tasks; the scheduler drains
//! whatever is buffered once per tick. Neither side ever waits: a full buffer
//! discards a notice according to the configured [`OverflowPolicy`].
//!
//! `DropNewest` is a tokio `mpsc` channel fed with `try_send`. `DropOldest`
//! is a tokio `broadcast` channel with a single receiver, which overwrites
//! the oldest unread value and reports the loss as `Lagged` on the next read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::games::ScoringNotice;

/// Which notice to discard when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Overwrite the oldest unread notice with the new one.
    DropOldest,
    /// Keep the buffer as is and discard the new notice.
    DropNewest,
}

/// Result of a send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Queued,
    /// The notice being sent was discarded: the buffer was full under
    /// `DropNewest`, or the receiver is gone.
    Rejected(ScoringNotice),
}

#[derive(Clone)]
enum Tx {
    Newest(mpsc::Sender<ScoringNotice>),
    Oldest(broadcast::Sender<ScoringNotice>),
}

enum Rx {
    Newest(mpsc::Receiver<ScoringNotice>),
    Oldest(broadcast::Receiver<ScoringNotice>),
}

#[derive(Clone)]
pub struct NotificationSender {
    tx: Tx,
    dropped: Arc<AtomicU64>,
}

pub struct NotificationReceiver {
    rx: Rx,
    dropped: Arc<AtomicU64>,
}

/// Create a channel holding at least `capacity` notices (minimum 1).
///
/// Under `DropOldest` the capacity is rounded up to a power of two.
pub fn notification_channel(
    capacity: usize,
    policy: OverflowPolicy,
) -> (NotificationSender, NotificationReceiver) {
    let capacity = capacity.max(1);
    let dropped = Arc::new(AtomicU64::new(0));
    let (tx, rx) = match policy {
        OverflowPolicy::DropNewest => {
            let (tx, rx) = mpsc::channel(capacity);
            (Tx::Newest(tx), Rx::Newest(rx))
        }
        OverflowPolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (Tx::Oldest(tx), Rx::Oldest(rx))
        }
    };
    (
        NotificationSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        NotificationReceiver { rx, dropped },
    )
}

impl NotificationSender {
    pub fn send(&self, notice: ScoringNotice) -> SendOutcome {
        let rejected = match &self.tx {
            Tx::Newest(tx) => match tx.try_send(notice) {
                Ok(()) => return SendOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(n))
                | Err(mpsc::error::TrySendError::Closed(n)) => n,
            },
            Tx::Oldest(tx) => match tx.send(notice) {
                Ok(_) => return SendOutcome::Queued,
                Err(broadcast::error::SendError(n)) => n,
            },
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        SendOutcome::Rejected(rejected)
    }
}

impl NotificationReceiver {
    /// Take every buffered notice, oldest first.
    pub fn drain(&mut self) -> Vec<ScoringNotice> {
        let mut notices = Vec::new();
        match &mut self.rx {
            Rx::Newest(rx) => {
                while let Ok(notice) = rx.try_recv() {
                    notices.push(notice);
                }
            }
            Rx::Oldest(rx) => loop {
                match rx.try_recv() {
                    Ok(notice) => notices.push(notice),
                    Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                        self.dropped.fetch_add(missed, Ordering::Relaxed);
                        warn!(
                            "Notification buffer overflowed, {} oldest notice(s) DROPPED",
                            missed
                        );
                    }
                    Err(_) => break,
                }
            },
        }
        notices
    }

    /// Number of notices discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::models::ScoringCode;
    use chrono::Utc;

    fn notice(id: &str) -> ScoringNotice {
        ScoringNotice {
            event_id: id.into(),
            event_name: format!("game {}", id),
            code: ScoringCode::Touchdown,
            home_score: "7".into(),
            away_score: "0".into(),
            detected_at: Utc::now(),
        }
    }

    fn ids(notices: Vec<ScoringNotice>) -> Vec<String> {
        notices.into_iter().map(|n| n.event_id).collect()
    }

    #[test]
    fn test_empty_receiver_drains_nothing() {
        for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest] {
            let (_tx, mut rx) = notification_channel(4, policy);
            assert!(rx.drain().is_empty());
        }
    }

    #[test]
    fn test_fifo_order() {
        for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest] {
            let (tx, mut rx) = notification_channel(4, policy);
            tx.send(notice("A"));
            tx.send(notice("B"));
            assert_eq!(ids(rx.drain()), vec!["A", "B"]);
            assert!(rx.drain().is_empty());
        }
    }

    #[test]
    fn test_drop_oldest_overflow() {
        let (tx, mut rx) = notification_channel(2, OverflowPolicy::DropOldest);
        assert_eq!(tx.send(notice("A")), SendOutcome::Queued);
        assert_eq!(tx.send(notice("B")), SendOutcome::Queued);
        assert_eq!(tx.send(notice("C")), SendOutcome::Queued);
        assert_eq!(ids(rx.drain()), vec!["B", "C"]);
        assert_eq!(rx.dropped(), 1);

        // Buffer is usable again after an overflow.
        tx.send(notice("D"));
        assert_eq!(ids(rx.drain()), vec!["D"]);
        assert_eq!(rx.dropped(), 1);
    }

    #[test]
    fn test_drop_newest_overflow() {
        let (tx, mut rx) = notification_channel(2, OverflowPolicy::DropNewest);
        tx.send(notice("A"));
        tx.send(notice("B"));
        match tx.send(notice("C")) {
            SendOutcome::Rejected(n) => assert_eq!(n.event_id, "C"),
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(ids(rx.drain()), vec!["A", "B"]);
        assert_eq!(rx.dropped(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, mut rx) = notification_channel(0, OverflowPolicy::DropNewest);
        assert_eq!(tx.send(notice("A")), SendOutcome::Queued);
        assert!(matches!(tx.send(notice("B")), SendOutcome::Rejected(_)));
        assert_eq!(rx.drain().len(), 1);

        let (tx, mut rx) = notification_channel(0, OverflowPolicy::DropOldest);
        tx.send(notice("A"));
        tx.send(notice("B"));
        assert_eq!(ids(rx.drain()), vec!["B"]);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_rejected() {
        for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest] {
            let (tx, rx) = notification_channel(4, policy);
            drop(rx);
            assert!(matches!(tx.send(notice("A")), SendOutcome::Rejected(_)));
        }
    }

    #[tokio::test]
    async fn test_send_from_other_task() {
        let (tx, mut rx) = notification_channel(8, OverflowPolicy::DropOldest);
        let handle = tokio::spawn(async move {
            for id in ["A", "B", "C"] {
                tx.send(notice(id));
            }
        });
        handle.await.unwrap();
        assert_eq!(rx.drain().len(), 3);
    }
}
