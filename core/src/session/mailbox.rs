use parking_lot::Mutex;
use tokio::sync::Notify;

/// Single-slot hand-off between a producer and the engine.
///
/// `put` publishes under the slot lock before waking the consumer, so a
/// consumer woken by [`Mailbox::ready`] always observes the value. A newer
/// value replaces one that was never taken.
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Notify,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Notify::new(),
        }
    }

    /// Store `value`, returning the unconsumed value it replaced.
    pub fn put(&self, value: T) -> Option<T> {
        let replaced = self.slot.lock().replace(value);
        self.ready.notify_one();
        replaced
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Resolves after the next `put`, or at once if a `put` happened since
    /// the last wake-up.
    pub async fn ready(&self) {
        self.ready.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_put_replaces_unconsumed_value() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.put("first"), None);
        assert_eq!(mailbox.put("second"), Some("first"));
        assert_eq!(mailbox.take(), Some("second"));
        assert!(mailbox.is_empty());
        assert_eq!(mailbox.take(), None);
    }

    #[tokio::test]
    async fn test_ready_wakes_waiting_consumer() {
        let mailbox = Arc::new(Mailbox::new());
        let consumer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                mailbox.ready().await;
                mailbox.take()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.put(7);
        let taken = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken, Some(7));
    }

    #[tokio::test]
    async fn test_put_before_wait_is_not_lost() {
        let mailbox = Mailbox::new();
        mailbox.put("early");
        tokio::time::timeout(Duration::from_secs(1), mailbox.ready())
            .await
            .unwrap();
        assert_eq!(mailbox.take(), Some("early"));
    }
}
