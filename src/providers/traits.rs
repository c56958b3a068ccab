use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, StreamEvent, TransportError};

/// Produces the streamed reply for one request.
///
/// Implementations send zero or more `Token` fragments followed by exactly
/// one terminal `Done` or `Error` on `tx`, in order, and never interleave
/// events for two requests on the same channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), TransportError>;
}
