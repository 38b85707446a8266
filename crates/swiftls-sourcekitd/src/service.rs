//! The compiler-service capability trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ServiceResult;
use crate::uid::Vocabulary;
use crate::value::Value;

/// An unsolicited message from the compiler service.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The daemon died or dropped the connection. Synthesized by the client;
    /// there is no payload.
    ConnectionInterrupted,
    /// A daemon notification dictionary.
    Message(Value),
}

/// Capability interface to the compiler service.
///
/// Implemented by [`DylibService`](crate::DylibService) over the loaded C
/// client library, and by the in-process fake used in tests. The worker only
/// ever talks through this trait.
///
/// `send` is a synchronous daemon round-trip: awaiting it on the worker's
/// execution lane blocks the lane, which is the intended serialization point.
/// Fire-and-forget traffic is a spawned task whose completion is re-posted
/// to the lane.
#[async_trait]
pub trait CompilerService: Send + Sync {
    /// The UID vocabulary resolved for this connection.
    fn vocabulary(&self) -> &Vocabulary;

    /// Send a request dictionary and wait for the daemon's reply.
    async fn send(&self, request: Value) -> ServiceResult<Value>;

    /// Subscribe to unsolicited notifications, including the synthesized
    /// [`Notification::ConnectionInterrupted`].
    fn subscribe(&self) -> broadcast::Receiver<Notification>;
}
