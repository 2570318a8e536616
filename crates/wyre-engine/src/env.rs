use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use wyre_core::types::ChatMessage;

/// Values supplied to a run when it starts.
///
/// Start parameters are read from here by name, and the `input` key feeds
/// the `{input}` placeholder of prompt templates. A host can carry one
/// run's outputs into the next run's environment. `history` is sent ahead
/// of the rendered prompt on every effect call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    data: HashMap<String, Value>,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Store `raw` as JSON when it parses, otherwise as plain text.
    pub fn set_raw(&mut self, key: impl Into<String>, raw: &str) {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.data.insert(key.into(), value);
    }

    /// Merge another environment into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &Environment) {
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Merge a finished run's outputs so the next run can read them.
    pub fn carry_forward(&mut self, outputs: &BTreeMap<String, Value>) {
        for (k, v) in outputs {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// Conversation context preceding each effect prompt, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Append one exchange, typically the last run's prompt and answer.
    pub fn push_exchange(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.history.push(ChatMessage::user(prompt));
        self.history.push(ChatMessage::assistant(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_operations() {
        let mut env = Environment::new();
        env.set_str("topic", "graphs");
        env.set("count", json!(3));

        assert_eq!(env.get_str("topic"), Some("graphs"));
        assert_eq!(env.get("count"), Some(&json!(3)));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn test_merge() {
        let mut a = Environment::new();
        a.set_str("x", "1");
        a.set_str("y", "2");

        let mut b = Environment::new();
        b.set_str("y", "overwritten");

        a.merge(&b);
        assert_eq!(a.get_str("x"), Some("1"));
        assert_eq!(a.get_str("y"), Some("overwritten"));
    }

    #[test]
    fn test_set_raw_parses_json() {
        let mut env = Environment::new();
        env.set_raw("n", "42");
        env.set_raw("list", "[1, 2]");
        env.set_raw("word", "hello world");

        assert_eq!(env.get("n"), Some(&json!(42)));
        assert_eq!(env.get("list"), Some(&json!([1, 2])));
        assert_eq!(env.get_str("word"), Some("hello world"));
    }

    #[test]
    fn test_history_accumulates_exchanges() {
        let mut env = Environment::new().with_history(vec![ChatMessage::user("earlier")]);
        env.push_exchange("question", "answer");

        let contents: Vec<&str> = env.history().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["earlier", "question", "answer"]);
        assert_eq!(env.history()[2].role, wyre_core::types::Role::Assistant);
    }

    #[test]
    fn test_carry_forward_outputs() {
        let mut env = Environment::new();
        let mut outputs = BTreeMap::new();
        outputs.insert("output".to_string(), json!("previous answer"));
        env.carry_forward(&outputs);
        assert_eq!(env.get_str("output"), Some("previous answer"));
    }
}
