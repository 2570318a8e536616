use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WyreError};

/// Top-level wyre configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: RunLimits,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
}

/// Budgets and concurrency caps applied to every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// Nodes entered plus loop iterations allowed per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Upper bound on iterations of any single loop node.
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,
    /// Runs executing at once; the rest wait in a queue.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Effect calls in flight at once across all runs.
    #[serde(default = "default_max_concurrent_effects")]
    pub max_concurrent_effects: usize,
    /// Capacity of the host-wide event bus.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_loop_iterations: default_max_loop_iterations(),
            max_concurrent_runs: default_max_concurrent_runs(),
            max_concurrent_effects: default_max_concurrent_effects(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_steps() -> usize { 500 }
fn default_max_loop_iterations() -> usize { 100 }
fn default_max_concurrent_runs() -> usize { 4 }
fn default_max_concurrent_effects() -> usize { 4 }
fn default_event_buffer() -> usize { 256 }

/// Language-model defaults used by effect nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model used when a node does not name one.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            system_prompt: None,
            retry: None,
        }
    }
}

fn default_provider() -> String { "echo".to_string() }
fn default_model_id() -> String { "echo-1".to_string() }

/// Retry configuration for model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

impl EngineConfig {
    /// Load from a TOML file, expanding `${ENV_VAR}` references first.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WyreError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| WyreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make every run fail or hang.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.engine;
        if limits.max_steps == 0 {
            return Err(WyreError::Config("engine.max_steps must be at least 1".into()));
        }
        if limits.max_concurrent_runs == 0 {
            return Err(WyreError::Config(
                "engine.max_concurrent_runs must be at least 1".into(),
            ));
        }
        if limits.max_concurrent_effects == 0 {
            return Err(WyreError::Config(
                "engine.max_concurrent_effects must be at least 1".into(),
            ));
        }
        if limits.event_buffer == 0 {
            return Err(WyreError::Config("engine.event_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Leave the reference as written if the variable is unset
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
