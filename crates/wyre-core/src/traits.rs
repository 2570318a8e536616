use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::*;

/// Language-model capability injected by the host.
///
/// Implementations own the provider transport; the engine only sees the
/// normalized delta stream. An `Err` item or a stream that ends before
/// `StreamDelta::Stop` is treated as a failed call.
pub trait LanguageModel: Send + Sync + 'static {
    /// Send a request and receive a stream of deltas.
    fn chat_stream(
        &self,
        request: ModelRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}
