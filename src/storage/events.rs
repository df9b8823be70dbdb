use tokio::sync::broadcast;

use crate::model::{Episode, Source};

/// Default number of events buffered for slow subscribers
const EVENT_CAPACITY: usize = 64;

/// Notifications published after records were written
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    EpisodesWritten(Vec<Episode>),
    SourcesWritten(Vec<Source>),
}

/// Fan-out of storage events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn publish(&self, event: StorageEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(StorageEvent::SourcesWritten(vec![]));
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(StorageEvent::EpisodesWritten(vec![Episode::new("a")]));

        let expected = StorageEvent::EpisodesWritten(vec![Episode::new("a")]);
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }
}
