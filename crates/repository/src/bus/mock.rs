//! Recording publisher for tests and demos.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventPublisher, Publication, Result};

/// Keeps every publication in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    published: RwLock<Vec<Publication>>,
    fail_on_publish: RwLock<bool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published(&self) -> Vec<Publication> {
        self.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|publication| publication.topic.clone())
            .collect()
    }

    pub async fn take_published(&self) -> Vec<Publication> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, publication: Publication) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("recording publisher set to fail".to_string()));
        }
        self.published.write().await.push(publication);
        Ok(())
    }
}
