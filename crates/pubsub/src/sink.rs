//! The outbound surface the bridge publishes through.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::SinkError;

/// A destination that accepts payloads asynchronously.
///
/// Implementations are shared as `Arc<dyn Sink>` and must accept concurrent
/// calls to `publish` without external locking.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Publishes `payload` unchanged to `destination`.
    ///
    /// Resolves once the service acknowledged or rejected the message.
    /// Returns the server assigned message id.
    async fn publish(&self, destination: &str, payload: Bytes) -> Result<String, SinkError>;
}
