//! Network access to the DopamineExp backend.
//!
//! [`Gateway`] is the seam the engine talks through: [`HttpGateway`] is the
//! real implementation, tests substitute scripted ones.

pub mod http;
pub mod operation;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use shared::GatewayError;

pub use http::HttpGateway;
pub use operation::Operation;
pub use sse::{frames, FrameParser, StreamFrame};

/// Raw body chunks of a streamed reply, in arrival order. Dropping it
/// releases the underlying connection.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, GatewayError>>;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Single request/response call. Non-success statuses and network failures
    /// both come back as `Err`; nothing is retried.
    async fn call(&self, operation: Operation, payload: Value) -> Result<Value, GatewayError>;

    /// Open a streamed reply. `Err` means no body was obtained at all; failures
    /// after that arrive as items of the stream.
    async fn stream(&self, operation: Operation, payload: Value) -> Result<ByteStream, GatewayError>;
}
