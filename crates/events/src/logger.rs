//! Background subscriber that mirrors every event into the tracing log.

use tokio::sync::broadcast;

use crate::bus::DomainEvent;

pub struct EventLogger;

impl EventLogger {
    /// Log events until the bus is dropped.
    ///
    /// Returns the number of events seen, which is mostly useful in tests.
    pub async fn run(mut receiver: broadcast::Receiver<DomainEvent>) -> u64 {
        let mut seen = 0u64;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    seen += 1;
                    tracing::info!(
                        event_type = %event.event_type,
                        entity_type = event.source_entity_type.as_deref().unwrap_or("-"),
                        entity_id = ?event.source_entity_id,
                        actor = ?event.actor_user_id,
                        payload = %event.payload,
                        "Domain event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
        seen
    }
}
