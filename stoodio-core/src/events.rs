use async_trait::async_trait;
use stoodio_shared::DomainEvent;

#[derive(Debug, thiserror::Error)]
#[error("Event publish failed: {0}")]
pub struct PublishError(pub String);

/// Sink for domain events consumed by the notification system
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}
