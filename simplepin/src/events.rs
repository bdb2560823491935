use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Dismissable dialog.
    Alert,
    /// Transient confirmation.
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Alert,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn toast(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Toast,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    LoginSucceeded,
    TokenChanged,
    BookmarkAdded,
    Foregrounded,
    Notice(Notice),
    ViewChanged { len: usize },
}

/// Cross-component signalling, owned by whoever composes the application.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: AppEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Live subscription; dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<AppEvent>,
}

impl Subscription {
    /// Next event, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything published so far that this subscriber has not seen yet.
    pub fn drain(&mut self) -> Vec<AppEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(AppEvent::LoginSucceeded), 2);

        assert_eq!(first.recv().await, Some(AppEvent::LoginSucceeded));
        assert_eq!(second.recv().await, Some(AppEvent::LoginSucceeded));
    }

    #[test]
    fn dropping_subscription_releases_it() {
        let bus = EventBus::default();
        let subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(AppEvent::TokenChanged), 0);
    }

    #[test]
    fn drain_returns_pending_events_in_order() {
        let bus = EventBus::default();
        let mut subscription = bus.subscribe();
        bus.publish(AppEvent::Notice(Notice::toast("Saved", "ok")));
        bus.publish(AppEvent::ViewChanged { len: 3 });

        assert_eq!(
            subscription.drain(),
            vec![
                AppEvent::Notice(Notice::toast("Saved", "ok")),
                AppEvent::ViewChanged { len: 3 },
            ]
        );
        assert!(subscription.try_recv().is_none());
    }

    #[test]
    fn lagging_subscriber_skips_to_newest() {
        let bus = EventBus::new(2);
        let mut subscription = bus.subscribe();
        for len in 0..5 {
            bus.publish(AppEvent::ViewChanged { len });
        }
        assert_eq!(
            subscription.drain(),
            vec![
                AppEvent::ViewChanged { len: 3 },
                AppEvent::ViewChanged { len: 4 },
            ]
        );
    }
}
