use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use wyre_core::config::{ModelConfig, RetryConfig};
use wyre_core::error::{Result, WyreError};
use wyre_core::traits::LanguageModel;
use wyre_core::types::*;

/// A model that retries failed requests and falls back to alternative providers.
///
/// Only the opening of a stream is retried. Once deltas flow, failures belong
/// to the caller, and a cancelled call is never retried.
pub struct RetryingModel {
    primary: Box<dyn LanguageModel>,
    fallbacks: Vec<(ModelConfig, Box<dyn LanguageModel>)>,
    retry_config: RetryConfig,
}

impl RetryingModel {
    pub fn new(
        primary: Box<dyn LanguageModel>,
        fallbacks: Vec<(ModelConfig, Box<dyn LanguageModel>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &WyreError) -> bool {
    match e {
        WyreError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        WyreError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = 2u64
        .saturating_pow(attempt)
        .saturating_mul(config.initial_backoff_ms)
        .min(config.max_backoff_ms);
    // Jitter in 0.8x..1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl RetryingModel {
    /// Open a stream on the primary model, retrying transient failures.
    async fn open_primary(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'_, Result<StreamDelta>>> {
        let max_retries = self.retry_config.max_retries;
        let mut attempt = 0;
        loop {
            let err = match self.primary.chat_stream(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };
            if attempt >= max_retries || !is_retryable(&err) {
                return Err(err);
            }
            let backoff = calculate_backoff(attempt, &self.retry_config);
            warn!(
                attempt = attempt + 1,
                max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying model request"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// First fallback that opens a stream, each addressed by its own model id.
    async fn open_fallback(
        &self,
        request: &ModelRequest,
    ) -> Option<BoxStream<'_, Result<StreamDelta>>> {
        for (config, model) in &self.fallbacks {
            let rerouted = ModelRequest {
                model: config.model_id.clone(),
                ..request.clone()
            };
            match model.chat_stream(rerouted).await {
                Ok(stream) => {
                    info!(
                        model = %config.model_id,
                        provider = %config.provider,
                        "Fell back to alternative model"
                    );
                    return Some(stream);
                }
                Err(e) => warn!(model = %config.model_id, error = %e, "Fallback model failed"),
            }
        }
        None
    }
}

impl LanguageModel for RetryingModel {
    fn chat_stream(
        &self,
        request: ModelRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let err = match self.open_primary(&request).await {
                Ok(stream) => return Ok(stream),
                Err(WyreError::Cancelled) => return Err(WyreError::Cancelled),
                Err(e) => e,
            };
            if self.fallbacks.is_empty() {
                return Err(err);
            }
            info!(error = %err, "Primary model exhausted, trying fallbacks");
            self.open_fallback(&request).await.ok_or(err)
        })
    }
}
