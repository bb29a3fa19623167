//! A channel-addressed publish/subscribe bus, standing in for the
//! external broker. Generalizes `Table`'s unicast/broadcast split
//! (`rbp-gameroom::table`) from fixed seat positions to dynamically
//! named channels.
use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// Publish/subscribe contract the rest of the workspace depends on.
/// Swappable for a real broker client without touching call sites.
pub trait MessageBus: Send + Sync {
    fn publish(&self, channel: &str, payload: String);
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;
}

/// In-process bus backed by one `tokio::broadcast` channel per topic,
/// created lazily on first publish or subscribe.
#[derive(Default)]
pub struct InMemoryBus {
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, channel: &str, payload: String) {
        let sender = self.sender(channel);
        match sender.send(payload) {
            Ok(subscribers) => log::debug!("[bus] publish {channel}: delivered to {subscribers}"),
            Err(_) => log::debug!("[bus] publish {channel}: no subscribers"),
        }
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        log::debug!("[bus] subscribe {channel}");
        self.sender(channel).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscriber_does_not_panic() {
        let bus = InMemoryBus::new();
        bus.publish("fulcrum.test", "payload".to_string());
    }

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let bus = InMemoryBus::new();
        let mut receiver = bus.subscribe("fulcrum.test");
        bus.publish("fulcrum.test", "hello".to_string());
        let received = receiver.recv().await.unwrap();
        assert_eq!(received, "hello");
    }

    #[tokio::test]
    async fn each_channel_is_independent() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("fulcrum.a");
        let mut b = bus.subscribe("fulcrum.b");
        bus.publish("fulcrum.a", "only-a".to_string());
        assert_eq!(a.recv().await.unwrap(), "only-a");
        assert!(b.try_recv().is_err());
    }
}
