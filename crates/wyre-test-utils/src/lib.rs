//! Mocks and fixtures shared by wyre's test suites.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use wyre_core::error::{Result, WyreError};
use wyre_core::traits::LanguageModel;
use wyre_core::types::{ModelRequest, StopReason, StreamDelta};

/// One scripted reaction to a `chat_stream` call.
enum Step {
    OpenError(WyreError),
    Deltas(Vec<Result<StreamDelta>>),
    HangAfter(Vec<String>),
    Panic(String),
}

/// Scripted language model.
///
/// Each call consumes the next step in order; once the script is exhausted
/// every call answers `"mock response"`.
pub struct MockModel {
    steps: Mutex<VecDeque<Step>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// Reply with `text` in a single chunk.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_chunks(vec![text.into()])
    }

    /// Reply with several chunks, then a usage report and a stop marker.
    pub fn with_chunks(self, chunks: Vec<String>) -> Self {
        let mut deltas: Vec<Result<StreamDelta>> = chunks
            .into_iter()
            .map(|c| Ok(StreamDelta::TextDelta(c)))
            .collect();
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: 10,
            output_tokens: 5,
        }));
        deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
        self.push(Step::Deltas(deltas))
    }

    /// Fail before any stream is returned.
    pub fn with_open_error(self, error: WyreError) -> Self {
        self.push(Step::OpenError(error))
    }

    /// Stream `partial`, then yield an error item.
    pub fn with_stream_error(self, partial: impl Into<String>, error: WyreError) -> Self {
        self.push(Step::Deltas(vec![
            Ok(StreamDelta::TextDelta(partial.into())),
            Err(error),
        ]))
    }

    /// Stream `partial`, then end without a stop marker.
    pub fn with_truncated_stream(self, partial: impl Into<String>) -> Self {
        self.push(Step::Deltas(vec![Ok(StreamDelta::TextDelta(partial.into()))]))
    }

    /// Stream `chunks`, then never yield again.
    pub fn with_hang_after(self, chunks: Vec<String>) -> Self {
        self.push(Step::HangAfter(chunks))
    }

    /// Panic inside the call, as a buggy capability would.
    pub fn with_panic(self, message: impl Into<String>) -> Self {
        self.push(Step::Panic(message.into()))
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Counter of `chat_stream` invocations.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Arc<Mutex<Vec<ModelRequest>>> {
        self.requests.clone()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageModel for MockModel {
    fn chat_stream(
        &self,
        request: ModelRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match step {
                Some(Step::Panic(message)) => panic!("{message}"),
                Some(Step::OpenError(e)) => Err(e),
                Some(Step::Deltas(deltas)) => Ok(stream::iter(deltas).boxed()),
                Some(Step::HangAfter(chunks)) => Ok(stream::iter(
                    chunks.into_iter().map(|c| Ok(StreamDelta::TextDelta(c))),
                )
                .chain(stream::pending())
                .boxed()),
                None => Ok(stream::iter(vec![
                    Ok(StreamDelta::TextDelta("mock response".to_string())),
                    Ok(StreamDelta::Stop(StopReason::EndTurn)),
                ])
                .boxed()),
            }
        })
    }
}

/// Write `content` to a temporary file that lives as long as the handle.
pub fn temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write temp file");
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use wyre_core::types::ChatMessage;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![ChatMessage::user("ping")],
        }
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let model = MockModel::new()
            .with_open_error(WyreError::LlmRequest("HTTP 500".into()))
            .with_response("second");

        assert!(model.chat_stream(request()).await.is_err());
        let mut stream = model.chat_stream(request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamDelta::TextDelta(ref t) if t == "second"));
        assert_eq!(model.calls().load(Ordering::SeqCst), 2);
        assert_eq!(model.requests().lock().unwrap().len(), 2);
    }
}
