//! In-process publisher on a tokio broadcast channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use domain::TOPIC_SEPARATOR;

use super::{BusError, EventPublisher, Publication, Result};

/// Check if a topic matches a subscription filter.
///
/// - `#` matches every topic
/// - an exact topic matches itself
/// - a resource name matches all of its events (`blog:post` matches
///   `blog:post:created`)
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    if filter == "#" || topic == filter {
        return true;
    }
    topic
        .strip_prefix(filter)
        .is_some_and(|rest| rest.starts_with(TOPIC_SEPARATOR))
}

/// Publishes events to every live subscriber of a broadcast channel.
///
/// Publishing without subscribers succeeds and drops the event.
pub struct ChannelPublisher {
    sender: broadcast::Sender<Arc<Publication>>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        info!(capacity, "Channel event publisher initialized");
        Self { sender }
    }

    /// Subscribe to topics matching `filter` (see [`topic_matches`]).
    pub fn subscribe(&self, filter: impl Into<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter: filter.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, publication: Publication) -> Result<()> {
        let topic = publication.topic.clone();
        match self.sender.send(Arc::new(publication)) {
            Ok(receivers) => debug!(%topic, receivers, "Event published"),
            Err(_) => debug!(%topic, "No subscribers, event dropped"),
        }
        Ok(())
    }
}

/// Receiving end of a [`ChannelPublisher`], filtered by topic.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<Publication>>,
    filter: String,
}

impl Subscription {
    /// Next matching publication.
    ///
    /// Lagging subscribers skip the events they missed.
    pub async fn recv(&mut self) -> Result<Arc<Publication>> {
        loop {
            match self.receiver.recv().await {
                Ok(publication) if topic_matches(&publication.topic, &self.filter) => {
                    return Ok(publication)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, filter = %self.filter, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    /// Next matching publication already in the channel, if any.
    pub fn try_recv(&mut self) -> Option<Arc<Publication>> {
        loop {
            match self.receiver.try_recv() {
                Ok(publication) if topic_matches(&publication.topic, &self.filter) => {
                    return Some(publication)
                }
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventPayload, Metadata};

    fn publication(topic: &str, id: &str) -> Publication {
        Publication::new(topic, EventPayload::new(id, Vec::new(), Metadata::new()))
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("blog:post:created", "#"));
        assert!(topic_matches("blog:post:created", "blog:post:created"));
        assert!(topic_matches("blog:post:created", "blog:post"));
        assert!(!topic_matches("blog:postage:created", "blog:post"));
        assert!(!topic_matches("blog:comment:created", "blog:post"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_matching_topics() {
        let publisher = ChannelPublisher::new(16);
        let mut posts = publisher.subscribe("blog:post");

        publisher
            .publish(publication("blog:comment:created", "1"))
            .await
            .unwrap();
        publisher
            .publish(publication("blog:post:created", "2"))
            .await
            .unwrap();

        let received = posts.recv().await.unwrap();
        assert_eq!(received.topic, "blog:post:created");
        assert_eq!(received.payload.resource_id, "2");
        assert!(posts.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let publisher = ChannelPublisher::new(4);
        assert_eq!(publisher.subscriber_count(), 0);

        publisher
            .publish(publication("blog:post:deleted", "3"))
            .await
            .unwrap();
    }
}
