use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};

use wyre_core::error::Result;
use wyre_core::traits::LanguageModel;
use wyre_core::types::*;

/// Deterministic model that streams the prompt back word by word.
///
/// Lets graphs run end to end from the CLI without a provider.
#[derive(Debug, Default)]
pub struct EchoModel;

impl EchoModel {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageModel for EchoModel {
    fn chat_stream(
        &self,
        request: ModelRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let prompt = request.prompt().to_string();
            let words = prompt.split_inclusive(' ').count() as u64;

            let mut deltas: Vec<Result<StreamDelta>> = prompt
                .split_inclusive(' ')
                .map(|w| Ok(StreamDelta::TextDelta(w.to_string())))
                .collect();
            deltas.push(Ok(StreamDelta::Usage {
                input_tokens: words,
                output_tokens: words,
            }));
            deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));

            let stream: BoxStream<'_, Result<StreamDelta>> = Box::pin(stream::iter(deltas));
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_echo_streams_prompt() {
        let model = EchoModel::new();
        let request = ModelRequest {
            model: "echo-1".into(),
            system_prompt: None,
            messages: vec![ChatMessage::user("hello blueprint world")],
        };
        let mut stream = model.chat_stream(request).await.unwrap();

        let mut text = String::new();
        let mut chunks = 0;
        let mut stopped = false;
        while let Some(delta) = stream.next().await {
            match delta.unwrap() {
                StreamDelta::TextDelta(t) => {
                    chunks += 1;
                    text.push_str(&t);
                }
                StreamDelta::Stop(_) => stopped = true,
                StreamDelta::Usage { .. } => {}
            }
        }
        assert_eq!(text, "hello blueprint world");
        assert_eq!(chunks, 3);
        assert!(stopped);
    }
}
