use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wyre_core::config::ModelConfig;
use wyre_core::error::{Result, WyreError};
use wyre_core::traits::LanguageModel;
use wyre_core::types::{ChatMessage, ModelRequest, StopReason, StreamDelta};

use crate::coerce::text_of;
use crate::env::Environment;
use crate::graph::EffectSpec;
use crate::report::Reporter;

/// Everything an effect node hands to the dispatcher.
pub struct EffectCall<'a> {
    pub node_id: &'a str,
    pub spec: &'a EffectSpec,
    /// Resolved `in_N` values, in pin order.
    pub inputs: &'a [Value],
    pub variables: &'a HashMap<String, Value>,
    pub env: &'a Environment,
}

/// Text and token counts returned by a completed call.
#[derive(Debug, Clone, Default)]
pub struct EffectOutput {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Performs effect calls against the injected language model.
///
/// Shared by every run of a scheduler; the semaphore caps calls in flight
/// across all of them.
pub struct EffectDispatcher {
    model: Arc<dyn LanguageModel>,
    defaults: ModelConfig,
    permits: Arc<Semaphore>,
}

impl EffectDispatcher {
    pub fn new(model: Arc<dyn LanguageModel>, defaults: ModelConfig, max_concurrent: usize) -> Self {
        Self {
            model,
            defaults,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Render the prompt, stream the model's reply, and return its text.
    ///
    /// Provider errors, stream errors and a stream that ends without a stop
    /// marker all fail with `Effect`. Cancellation wins over a pending call.
    pub async fn invoke(
        &self,
        call: EffectCall<'_>,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> Result<EffectOutput> {
        let prompt = render_prompt(&call.spec.prompt_template, call.inputs, call.variables, call.env);
        let request = ModelRequest {
            model: call
                .spec
                .model
                .clone()
                .unwrap_or_else(|| self.defaults.model_id.clone()),
            system_prompt: call
                .spec
                .system_prompt
                .clone()
                .or_else(|| self.defaults.system_prompt.clone()),
            messages: call
                .env
                .history()
                .iter()
                .cloned()
                .chain(std::iter::once(ChatMessage::user(prompt)))
                .collect(),
        };

        let _permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit.map_err(|_| WyreError::Effect {
                node: call.node_id.to_string(),
                message: "effect limiter closed".into(),
            })?,
            _ = cancel.cancelled() => return Err(WyreError::Cancelled),
        };

        debug!(node_id = %call.node_id, model = %request.model, "Invoking language model");

        tokio::select! {
            result = self.stream_text(call.node_id, request, reporter) => result,
            _ = cancel.cancelled() => {
                info!(node_id = %call.node_id, "Effect call cancelled");
                Err(WyreError::Cancelled)
            }
        }
    }

    async fn stream_text(
        &self,
        node_id: &str,
        request: ModelRequest,
        reporter: &Reporter,
    ) -> Result<EffectOutput> {
        let mut stream = self
            .model
            .chat_stream(request)
            .await
            .map_err(|e| effect_error(node_id, e))?;

        let mut output = EffectOutput::default();
        let mut stopped = false;
        while let Some(delta) = stream.next().await {
            match delta.map_err(|e| effect_error(node_id, e))? {
                StreamDelta::TextDelta(text) => {
                    reporter.progress(node_id, &text);
                    output.text.push_str(&text);
                }
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    output.input_tokens += input_tokens;
                    output.output_tokens += output_tokens;
                }
                StreamDelta::Stop(reason) => {
                    if reason == StopReason::MaxTokens {
                        warn!(node_id = %node_id, "Model stopped at max tokens");
                    }
                    stopped = true;
                }
            }
        }

        if !stopped {
            return Err(WyreError::Effect {
                node: node_id.to_string(),
                message: "stream ended before completion".into(),
            });
        }
        Ok(output)
    }
}

fn effect_error(node_id: &str, e: WyreError) -> WyreError {
    match e {
        WyreError::Cancelled => WyreError::Cancelled,
        WyreError::Effect { .. } => e,
        other => WyreError::Effect {
            node: node_id.to_string(),
            message: other.to_string(),
        },
    }
}

fn leftover_placeholders() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{(?:input|in_\d+|var:[^{}]*|param:[^{}]*)\}")
            .expect("placeholder pattern is valid")
    })
}

/// Substitute `{input}`, `{in_N}`, `{var:name}` and `{param:name}`.
/// Placeholders of those shapes that resolve to nothing are removed.
pub fn render_prompt(
    template: &str,
    inputs: &[Value],
    variables: &HashMap<String, Value>,
    env: &Environment,
) -> String {
    let mut prompt = template.to_string();

    if let Some(input) = env.get("input") {
        prompt = prompt.replace("{input}", &text_of(input));
    }
    for (i, value) in inputs.iter().enumerate() {
        prompt = prompt.replace(&format!("{{in_{i}}}"), &text_of(value));
    }
    for (name, value) in variables {
        prompt = prompt.replace(&format!("{{var:{name}}}"), &text_of(value));
    }
    for (name, value) in env.data() {
        prompt = prompt.replace(&format!("{{param:{name}}}"), &text_of(value));
    }

    leftover_placeholders().replace_all(&prompt, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wyre_core::types::{Role, RunEvent, RunId};
    use wyre_test_utils::MockModel;

    fn reporter() -> (Reporter, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Reporter::new(RunId::new(), tx, None), rx)
    }

    fn dispatcher(model: MockModel) -> EffectDispatcher {
        EffectDispatcher::new(Arc::new(model), ModelConfig::default(), 2)
    }

    async fn invoke(dispatcher: &EffectDispatcher, reporter: &Reporter) -> Result<EffectOutput> {
        let spec = EffectSpec::new("Say {in_0}");
        let call = EffectCall {
            node_id: "llm",
            spec: &spec,
            inputs: &[json!("hi")],
            variables: &HashMap::new(),
            env: &Environment::new(),
        };
        dispatcher.invoke(call, &CancellationToken::new(), reporter).await
    }

    #[test]
    fn test_render_prompt_placeholders() {
        let mut env = Environment::new();
        env.set_str("input", "the question");
        env.set("limit", json!(3));
        let mut vars = HashMap::new();
        vars.insert("tone".to_string(), json!("dry"));

        let prompt = render_prompt(
            "{input} | {in_0} | {var:tone} | {param:limit} | {in_5}{var:nope}{param:nope} | {other}",
            &[json!(["a", "b"])],
            &vars,
            &env,
        );
        assert_eq!(prompt, "the question | [\"a\",\"b\"] | dry | 3 |  | {other}");
    }

    #[test]
    fn test_render_prompt_without_input_strips_placeholder() {
        let prompt = render_prompt("Q: {input}", &[], &HashMap::new(), &Environment::new());
        assert_eq!(prompt, "Q: ");
    }

    #[tokio::test]
    async fn test_streams_chunks_as_progress() {
        let model = MockModel::new().with_chunks(vec!["hel".into(), "lo".into()]);
        let requests = model.requests();
        let dispatcher = dispatcher(model);
        let (reporter, mut rx) = reporter();

        let output = invoke(&dispatcher, &reporter).await.unwrap();
        assert_eq!(output.text, "hello");
        assert_eq!(output.input_tokens, 10);
        assert_eq!(output.output_tokens, 5);

        let mut chunks = Vec::new();
        while let Ok(RunEvent::Progress { chunk, .. }) = rx.try_recv() {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["hel", "lo"]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].prompt(), "Say hi");
        assert_eq!(requests[0].model, "echo-1");
    }

    #[tokio::test]
    async fn test_provider_error_is_effect_error() {
        let model = MockModel::new().with_open_error(WyreError::LlmRequest("HTTP 401".into()));
        let (reporter, _rx) = reporter();
        let err = invoke(&dispatcher(model), &reporter).await.unwrap_err();
        match err {
            WyreError::Effect { node, message } => {
                assert_eq!(node, "llm");
                assert!(message.contains("401"));
            }
            other => panic!("expected effect error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_error_is_effect_error() {
        let model =
            MockModel::new().with_stream_error("partial", WyreError::LlmStream("reset".into()));
        let (reporter, _rx) = reporter();
        let err = invoke(&dispatcher(model), &reporter).await.unwrap_err();
        assert!(matches!(err, WyreError::Effect { .. }));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_effect_error() {
        let model = MockModel::new().with_truncated_stream("half an ans");
        let (reporter, _rx) = reporter();
        let err = invoke(&dispatcher(model), &reporter).await.unwrap_err();
        assert!(matches!(err, WyreError::Effect { ref message, .. } if message.contains("before completion")));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hanging_call() {
        let model = MockModel::new().with_hang_after(vec!["thinking".into()]);
        let dispatcher = dispatcher(model);
        let (reporter, _rx) = reporter();
        let cancel = CancellationToken::new();
        let spec = EffectSpec::new("slow");

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let call = EffectCall {
            node_id: "llm",
            spec: &spec,
            inputs: &[],
            variables: &HashMap::new(),
            env: &Environment::new(),
        };
        let err = dispatcher.invoke(call, &cancel, &reporter).await.unwrap_err();
        assert!(matches!(err, WyreError::Cancelled));
    }

    #[tokio::test]
    async fn test_node_model_overrides_default() {
        let model = MockModel::new().with_response("ok");
        let requests = model.requests();
        let dispatcher = dispatcher(model);
        let (reporter, _rx) = reporter();
        let spec = EffectSpec::new("x").with_model("big-model");
        let call = EffectCall {
            node_id: "llm",
            spec: &spec,
            inputs: &[],
            variables: &HashMap::new(),
            env: &Environment::new(),
        };
        dispatcher
            .invoke(call, &CancellationToken::new(), &reporter)
            .await
            .unwrap();
        assert_eq!(requests.lock().unwrap()[0].model, "big-model");
    }

    #[tokio::test]
    async fn test_history_precedes_prompt() {
        let model = MockModel::new().with_response("ok");
        let requests = model.requests();
        let dispatcher = dispatcher(model);
        let (reporter, _rx) = reporter();
        let spec = EffectSpec::new("And now {in_0}?");
        let mut env = Environment::new();
        env.push_exchange("What is a pin?", "A typed port on a node.");
        let call = EffectCall {
            node_id: "llm",
            spec: &spec,
            inputs: &[json!("edges")],
            variables: &HashMap::new(),
            env: &env,
        };
        dispatcher
            .invoke(call, &CancellationToken::new(), &reporter)
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        let sent: Vec<(Role, &str)> = requests[0]
            .messages
            .iter()
            .map(|m| (m.role.clone(), m.content.as_str()))
            .collect();
        assert_eq!(
            sent,
            vec![
                (Role::User, "What is a pin?"),
                (Role::Assistant, "A typed port on a node."),
                (Role::User, "And now edges?"),
            ]
        );
        assert_eq!(requests[0].prompt(), "And now edges?");
    }
}
