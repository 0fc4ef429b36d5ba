use async_trait::async_trait;
use stoodio_core::events::{EventPublisher, PublishError};
use stoodio_shared::DomainEvent;
use tokio::sync::broadcast;

/// In-process fan-out of domain events, feeding live subscribers such as
/// the SSE stream. Events published with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        // Err only means nobody is listening right now
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
