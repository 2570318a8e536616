use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value kind carried by a data pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    #[serde(alias = "ARRAY")]
    Array,
    #[serde(alias = "STRING")]
    String,
    #[serde(alias = "OBJECT")]
    Object,
    #[serde(alias = "BOOLEAN")]
    Boolean,
    #[serde(alias = "NUMBER")]
    Number,
    /// Shape known only at run time.
    #[serde(alias = "ANY")]
    Any,
}

impl PinKind {
    /// The kind matching a runtime value's shape. `null` maps to `Any`.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Object(_) => Self::Object,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Null => Self::Any,
        }
    }

    /// Value used for an unset pin of this kind.
    pub fn zero_value(&self) -> serde_json::Value {
        match self {
            Self::Array => serde_json::Value::Array(vec![]),
            Self::String => serde_json::Value::String(String::new()),
            Self::Object => serde_json::Value::Object(serde_json::Map::new()),
            Self::Boolean => serde_json::Value::Bool(false),
            Self::Number => serde_json::json!(0),
            Self::Any => serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for PinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Array => "ARRAY",
            Self::String => "STRING",
            Self::Object => "OBJECT",
            Self::Boolean => "BOOLEAN",
            Self::Number => "NUMBER",
            Self::Any => "ANY",
        };
        f.write_str(name)
    }
}

/// A pin addressed as `node.pin`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PinRef {
    pub node: String,
    pub pin: String,
}

impl PinRef {
    pub fn new(node: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pin: pin.into(),
        }
    }
}

impl std::fmt::Display for PinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.pin)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A chat message handed to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A normalized request to the language-model capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl ModelRequest {
    /// The text of the last user message, if any.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Stop reason from the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the model.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// The response is complete.
    Stop(StopReason),
}

/// Event emitted for a run, in order, to the host.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Run is waiting for a concurrency permit.
    Queued { run_id: RunId },
    /// Run acquired a permit and began executing.
    Started {
        run_id: RunId,
        started_at: DateTime<Utc>,
    },
    /// Interpreter entered an exec node.
    StepStarted {
        run_id: RunId,
        node_id: String,
        label: String,
        step: usize,
    },
    /// Streamed chunk from an effect call.
    Progress {
        run_id: RunId,
        node_id: String,
        chunk: String,
    },
    /// Cumulative token usage after an effect call.
    Usage {
        run_id: RunId,
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Run finished; outputs keyed by End node output name.
    Completed {
        run_id: RunId,
        outputs: BTreeMap<String, serde_json::Value>,
    },
    /// Run failed.
    Failed {
        run_id: RunId,
        kind: ErrorKind,
        detail: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::Queued { run_id }
            | Self::Started { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::Usage { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Failed { run_id, .. } => run_id,
        }
    }

    /// Whether this is the run's final event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_kind_of_value() {
        assert_eq!(PinKind::of(&serde_json::json!([1, 2])), PinKind::Array);
        assert_eq!(PinKind::of(&serde_json::json!("x")), PinKind::String);
        assert_eq!(PinKind::of(&serde_json::json!({"a": 1})), PinKind::Object);
        assert_eq!(PinKind::of(&serde_json::json!(true)), PinKind::Boolean);
        assert_eq!(PinKind::of(&serde_json::json!(2.5)), PinKind::Number);
        assert_eq!(PinKind::of(&serde_json::Value::Null), PinKind::Any);
    }

    #[test]
    fn test_pin_kind_accepts_upper_and_lower_case() {
        let kinds: Vec<PinKind> = serde_json::from_str(r#"["ARRAY", "number", "ANY"]"#).unwrap();
        assert_eq!(kinds, vec![PinKind::Array, PinKind::Number, PinKind::Any]);
    }

    #[test]
    fn test_request_prompt_is_last_user_message() {
        let request = ModelRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
        };
        assert_eq!(request.prompt(), "second");
    }

    #[test]
    fn test_terminal_events() {
        let id = RunId::new();
        assert!(!RunEvent::Queued { run_id: id.clone() }.is_terminal());
        let failed = RunEvent::Failed {
            run_id: id.clone(),
            kind: ErrorKind::Cancelled,
            detail: "stop".into(),
        };
        assert!(failed.is_terminal());
        assert_eq!(failed.run_id(), &id);
    }
}
