use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use wyre_core::types::PinKind;

use crate::ops::PureOp;

/// Name of the single exec input pin carried by every exec-capable node.
pub const EXEC_IN: &str = "exec_in";

/// Upper bound on author-sized pin families: sequence `then_N`, switch
/// `case_N` and effect `in_N`.
pub const MAX_NUMBERED_PINS: usize = 64;

/// A typed data pin slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDef {
    pub name: String,
    pub kind: PinKind,
}

impl PinDef {
    pub fn new(name: impl Into<String>, kind: PinKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A node in a blueprint graph.
///
/// Pins are derived from the node's kind; the graph owns the edges.
/// `defaults` hold literal values for input pins that have no incoming
/// edge, and the fallback used when coercing into that pin fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Human-readable name shown in step events.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Literal values for input pins, keyed by pin name.
    #[serde(default)]
    pub defaults: HashMap<String, Value>,
}

/// The closed set of node kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point. Publishes run parameters read from the environment.
    Start {
        #[serde(default)]
        parameters: Vec<Parameter>,
    },
    /// Records `result` under `output_name` and ends the current chain.
    End {
        #[serde(default = "default_output_name")]
        output_name: String,
    },
    /// Runs `then_0..then_{n-1}` in order, then continues along `exec_out`.
    Sequence {
        #[serde(default = "default_sequence_outputs")]
        outputs: usize,
    },
    Branch,
    /// Follows the first `case_i` whose label equals `value`, else `default`.
    Switch {
        #[serde(default)]
        cases: Vec<String>,
    },
    Loop {
        #[serde(default)]
        mode: LoopMode,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
    },
    SetVariable {
        name: String,
    },
    /// A language-model call.
    Effect(EffectSpec),
    Pure(PureOp),
}

fn default_output_name() -> String {
    "output".to_string()
}

fn default_sequence_outputs() -> usize {
    2
}

fn default_max_iterations() -> usize {
    100
}

/// A start parameter, published on the start node's output pin of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default = "default_parameter_kind")]
    pub kind: PinKind,
}

fn default_parameter_kind() -> PinKind {
    PinKind::Any
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: PinKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// How a loop node decides whether to run another iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// `count` is resolved once; the body runs that many times.
    #[default]
    Count,
    /// `condition` is resolved before every iteration.
    While,
    /// `array` is resolved once; the body runs per element.
    ForEach,
}

/// Configuration of a language-model effect node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Model id; the configured default when absent.
    #[serde(default)]
    pub model: Option<String>,
    /// Prompt with `{input}`, `{in_N}`, `{var:name}` and `{param:name}` placeholders.
    #[serde(default)]
    pub prompt_template: String,
    /// Number of `in_N` data inputs.
    #[serde(default = "default_effect_inputs")]
    pub inputs: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Route failures to `on_error` instead of failing the run.
    #[serde(default)]
    pub error_tolerant: bool,
}

fn default_effect_inputs() -> usize {
    1
}

impl EffectSpec {
    pub fn new(prompt_template: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt_template: prompt_template.into(),
            inputs: default_effect_inputs(),
            system_prompt: None,
            error_tolerant: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_inputs(mut self, inputs: usize) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn error_tolerant(mut self) -> Self {
        self.error_tolerant = true;
        self
    }
}

impl Node {
    /// Create a node with no label or defaults.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind,
            defaults: HashMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the literal value of an input pin.
    pub fn with_default(mut self, pin: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(pin.into(), value);
        self
    }

    /// Display name: the label, or the id when unlabeled.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn is_pure(&self) -> bool {
        matches!(self.kind, NodeKind::Pure(_))
    }

    pub fn input_kind(&self, pin: &str) -> Option<PinKind> {
        if let NodeKind::Effect(spec) = &self.kind {
            return pin_index(pin, "in_")
                .filter(|&i| i < spec.inputs)
                .map(|_| PinKind::Any);
        }
        self.kind
            .inputs()
            .into_iter()
            .find(|p| p.name == pin)
            .map(|p| p.kind)
    }

    pub fn output_kind(&self, pin: &str) -> Option<PinKind> {
        self.kind
            .outputs()
            .into_iter()
            .find(|p| p.name == pin)
            .map(|p| p.kind)
    }
}

/// `N` from a numbered pin such as `in_N`, rejecting leading zeros.
fn pin_index(pin: &str, prefix: &str) -> Option<usize> {
    let digits = pin.strip_prefix(prefix)?;
    let index: usize = digits.parse().ok()?;
    (index.to_string() == digits).then_some(index)
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::End { .. } => "end",
            Self::Sequence { .. } => "sequence",
            Self::Branch => "branch",
            Self::Switch { .. } => "switch",
            Self::Loop { .. } => "loop",
            Self::SetVariable { .. } => "set_variable",
            Self::Effect(_) => "effect",
            Self::Pure(op) => op.name(),
        }
    }

    /// Input data pins.
    pub fn inputs(&self) -> Vec<PinDef> {
        match self {
            Self::Start { .. } | Self::Sequence { .. } => vec![],
            Self::End { .. } => vec![PinDef::new("result", PinKind::Any)],
            Self::Branch => vec![PinDef::new("condition", PinKind::Boolean)],
            Self::Switch { .. } => vec![PinDef::new("value", PinKind::String)],
            Self::Loop { mode, .. } => match mode {
                LoopMode::Count => vec![PinDef::new("count", PinKind::Number)],
                LoopMode::While => vec![PinDef::new("condition", PinKind::Boolean)],
                LoopMode::ForEach => vec![PinDef::new("array", PinKind::Array)],
            },
            Self::SetVariable { .. } => vec![PinDef::new("value", PinKind::Any)],
            Self::Effect(spec) => (0..spec.inputs)
                .map(|i| PinDef::new(format!("in_{i}"), PinKind::Any))
                .collect(),
            Self::Pure(op) => op.inputs(),
        }
    }

    /// Output data pins.
    pub fn outputs(&self) -> Vec<PinDef> {
        match self {
            Self::Start { parameters } => parameters
                .iter()
                .map(|p| PinDef::new(p.name.clone(), p.kind))
                .collect(),
            Self::End { .. } | Self::Sequence { .. } | Self::Branch | Self::Switch { .. } => {
                vec![]
            }
            Self::Loop { .. } => vec![
                PinDef::new("index", PinKind::Number),
                PinDef::new("element", PinKind::Any),
            ],
            Self::SetVariable { .. } => vec![PinDef::new("value", PinKind::Any)],
            Self::Effect(_) => vec![
                PinDef::new("response", PinKind::String),
                PinDef::new("error", PinKind::String),
            ],
            Self::Pure(op) => op.outputs(),
        }
    }

    /// Exec output pins, in the order they are listed to authors.
    pub fn exec_outputs(&self) -> Vec<String> {
        match self {
            Self::Start { .. } | Self::SetVariable { .. } => vec!["exec_out".into()],
            Self::End { .. } | Self::Pure(_) => vec![],
            Self::Sequence { outputs } => (0..*outputs)
                .map(|i| format!("then_{i}"))
                .chain(std::iter::once("exec_out".to_string()))
                .collect(),
            Self::Branch => vec!["true".into(), "false".into()],
            Self::Switch { cases } => (0..cases.len())
                .map(|i| format!("case_{i}"))
                .chain(std::iter::once("default".to_string()))
                .collect(),
            Self::Loop { .. } => vec!["loop_body".into(), "completed".into()],
            Self::Effect(_) => vec!["exec_out".into(), "on_error".into()],
        }
    }

    /// Whether exec edges may enter this node.
    pub fn has_exec_input(&self) -> bool {
        !matches!(self, Self::Start { .. } | Self::Pure(_))
    }
}
