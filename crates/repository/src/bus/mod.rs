//! Event publication.
//!
//! Repositories hand committed events to an [`EventPublisher`]. Publication
//! failures are logged by the repository and never reach the caller.

mod channel;
mod mock;

pub use channel::{topic_matches, ChannelPublisher, Subscription};
pub use mock::RecordingPublisher;

use async_trait::async_trait;
use domain::EventPayload;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BusError>;

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    /// `<resource>:<event name>`
    pub topic: String,
    pub payload: EventPayload,
}

impl Publication {
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, publication: Publication) -> Result<()>;
}
