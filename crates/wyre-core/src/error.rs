use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PinKind, PinRef};

#[derive(Debug, Error)]
pub enum WyreError {
    // Graph errors
    #[error("Graph structure error: {0}")]
    GraphStructure(String),

    #[error("Data pin cycle: {}", format_path(.path))]
    DataCycle { path: Vec<PinRef> },

    #[error("Cannot coerce {from} to {to}: {detail}")]
    Coercion {
        from: PinKind,
        to: PinKind,
        detail: String,
    },

    // Run errors
    #[error("Step budget exceeded ({0} steps)")]
    StepBudgetExceeded(usize),

    #[error("Effect failed at node {node}: {message}")]
    Effect { node: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    // LLM capability errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WyreError {
    pub fn coercion(from: PinKind, to: PinKind, detail: impl Into<String>) -> Self {
        Self::Coercion {
            from,
            to,
            detail: detail.into(),
        }
    }

    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.into(),
        }
    }

    /// The category reported to the host in a `failed` event.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GraphStructure(_) => ErrorKind::GraphStructure,
            Self::DataCycle { .. } => ErrorKind::DataCycle,
            Self::Coercion { .. } => ErrorKind::Coercion,
            Self::StepBudgetExceeded(_) => ErrorKind::StepBudgetExceeded,
            Self::Effect { .. }
            | Self::LlmRequest(_)
            | Self::LlmStream(_)
            | Self::UnsupportedProvider(_) => ErrorKind::Effect,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NodeExecution { .. } => ErrorKind::NodeExecution,
            Self::Config(_) | Self::ConfigNotFound(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Config
            }
        }
    }
}

fn format_path(path: &[PinRef]) -> String {
    path.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Error category carried by terminal `failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    GraphStructure,
    DataCycle,
    Coercion,
    StepBudgetExceeded,
    Effect,
    Cancelled,
    NodeExecution,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GraphStructure => "GraphStructureError",
            Self::DataCycle => "DataCycleError",
            Self::Coercion => "CoercionError",
            Self::StepBudgetExceeded => "StepBudgetExceeded",
            Self::Effect => "EffectError",
            Self::Cancelled => "Cancelled",
            Self::NodeExecution => "NodeExecutionError",
            Self::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, WyreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_path_display() {
        let err = WyreError::DataCycle {
            path: vec![
                PinRef::new("sum", "result"),
                PinRef::new("mul", "result"),
                PinRef::new("sum", "result"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Data pin cycle: sum.result -> mul.result -> sum.result"
        );
        assert_eq!(err.kind(), ErrorKind::DataCycle);
    }

    #[test]
    fn test_llm_errors_are_effect_errors() {
        assert_eq!(
            WyreError::LlmStream("reset".into()).kind(),
            ErrorKind::Effect
        );
        assert_eq!(WyreError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(ErrorKind::Effect.to_string(), "EffectError");
    }
}
