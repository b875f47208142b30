//! The `EventHandler` trait: where decoded events are delivered.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::types::KvEvent;

/// Receives decoded events one at a time, in batch order.
///
/// An error is counted and logged by the caller and never stops delivery of
/// the remaining events in the batch.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: KvEvent) -> Result<(), HandlerError>;
}
