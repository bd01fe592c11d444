use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use crate::store::{ChannelId, Notifier};

/// Best-effort notice dispatch.
///
/// Every send runs in its own task on the engine's tracker. Sends to the
/// same channel are delivered in the order they were queued: each one waits
/// for the previous send to that channel to finish. Failures are logged and
/// dropped.
#[derive(Clone)]
pub struct Notices {
    notifier: Arc<dyn Notifier>,
    tracker: TaskTracker,
    /// Completion signal of the most recently queued send, per channel.
    tails: Arc<Mutex<HashMap<ChannelId, oneshot::Receiver<()>>>>,
}

impl Notices {
    pub fn new(notifier: Arc<dyn Notifier>, tracker: TaskTracker) -> Self {
        Self {
            notifier,
            tracker,
            tails: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn send(&self, channel: &ChannelId, text: impl Into<String>) {
        let notifier = self.notifier.clone();
        let channel = channel.clone();
        let text = text.into();
        let (done, tail) = oneshot::channel();
        let previous = self.tails.lock().insert(channel.clone(), tail);

        self.tracker.spawn(async move {
            if let Some(previous) = previous {
                // Resolves once the earlier send finished or was dropped
                let _ = previous.await;
            }
            if let Err(e) = notifier.notify(&channel, &text).await {
                tracing::warn!(channel_id = %channel, error = %e, "Failed to send notice");
            }
            let _ = done.send(());
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::{InMemoryStore, StoreError};

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _channel: &ChannelId, _text: &str) -> Result<(), StoreError> {
            Err(StoreError::Other("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_send_is_delivered_in_background() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = TaskTracker::new();
        let notices = Notices::new(store.clone(), tracker.clone());

        notices.send(&ChannelId::new("1"), "hello");
        tracker.close();
        tracker.wait().await;

        assert_eq!(store.notices(), vec![(ChannelId::new("1"), "hello".to_string())]);
    }

    /// Delivers after a delay that is longest for the earliest notice.
    struct SlowNotifier {
        delivered: Mutex<Vec<(ChannelId, String)>>,
    }

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn notify(&self, channel: &ChannelId, text: &str) -> Result<(), StoreError> {
            let delay = match text {
                "first" => 300,
                "second" => 200,
                _ => 100,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.delivered.lock().push((channel.clone(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_channel_keeps_queue_order() {
        let notifier = Arc::new(SlowNotifier {
            delivered: Mutex::new(Vec::new()),
        });
        let tracker = TaskTracker::new();
        let notices = Notices::new(notifier.clone(), tracker.clone());
        let requests = ChannelId::new("requests");
        let other = ChannelId::new("other");

        notices.send(&requests, "first");
        notices.send(&requests, "second");
        notices.send(&other, "third");
        notices.send(&requests, "fourth");
        tracker.close();
        tracker.wait().await;

        let delivered = notifier.delivered.lock().clone();
        let in_requests: Vec<&str> = delivered
            .iter()
            .filter(|(c, _)| *c == requests)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(in_requests, vec!["first", "second", "fourth"]);
        // Other channels are not held up
        assert_eq!(delivered[0], (other, "third".to_string()));
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let tracker = TaskTracker::new();
        let notices = Notices::new(Arc::new(FailingNotifier), tracker.clone());

        notices.send(&ChannelId::new("1"), "hello");
        tracker.close();
        tracker.wait().await;
    }
}
