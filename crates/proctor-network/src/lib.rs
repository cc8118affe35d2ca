//! Live push of session events to the interview UI.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use proctor_types::{
    events::{EventPayload, SystemEvent},
    violation::Violation,
    ProctorError, Result,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

#[async_trait]
pub trait ViolationFeed: Send + Sync {
    async fn publish(&self, event: SystemEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, SystemEvent>;

    /// Only the violation records, in emission order.
    fn violations(&self) -> BoxStream<'static, Violation> {
        self.subscribe()
            .filter_map(|event| async move {
                match event.payload {
                    EventPayload::Violation(violation) => Some(violation),
                    _ => None,
                }
            })
            .boxed()
    }
}

/// In-process feed backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalFeed {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ViolationFeed for LocalFeed {
    async fn publish(&self, event: SystemEvent) -> Result<()> {
        if self.tx.send(event).is_err() {
            debug!("No live subscribers for session event");
        }
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn network_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Network(message.into())
}
