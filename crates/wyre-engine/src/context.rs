use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use wyre_core::error::{Result, WyreError};
use wyre_core::types::RunId;

use crate::env::Environment;
use crate::ops::Outputs;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Nodes entered plus loop iterations.
    pub steps: usize,
    /// How many times each pure node was computed.
    pub pure_evaluations: HashMap<String, usize>,
    pub effect_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunStats {
    pub fn evaluations_of(&self, node_id: &str) -> usize {
        self.pure_evaluations.get(node_id).copied().unwrap_or(0)
    }
}

/// The run state a memoized pure output was computed from, including
/// everything read through upstream pure nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoReads {
    /// Exec nodes whose recorded outputs were read.
    pub nodes: HashSet<String>,
    pub variables: HashSet<String>,
}

impl MemoReads {
    pub fn merge(&mut self, other: &MemoReads) {
        self.nodes.extend(other.nodes.iter().cloned());
        self.variables.extend(other.variables.iter().cloned());
    }
}

#[derive(Debug)]
struct MemoEntry {
    outputs: Outputs,
    reads: MemoReads,
}

/// Pending work on the interpreter's explicit call stack.
#[derive(Debug)]
pub(crate) enum Frame {
    /// Execute this node.
    Enter(String),
    /// Sequence node with `then_{next}` still to run.
    Sequence {
        node: String,
        next: usize,
        branches: usize,
    },
    /// Loop node between iterations.
    Loop { node: String, state: LoopState },
}

#[derive(Debug)]
pub(crate) struct LoopState {
    pub iteration: usize,
    pub cap: usize,
    pub source: LoopSource,
}

#[derive(Debug)]
pub(crate) enum LoopSource {
    Count { remaining: usize },
    While,
    Items(Vec<Value>),
}

/// Mutable state of one run. Owned by the run's task and never shared.
pub struct ExecutionContext {
    run_id: RunId,
    env: Environment,
    cancel: CancellationToken,
    max_steps: usize,
    /// Pure outputs computed during the current pass.
    memo: HashMap<String, MemoEntry>,
    /// Outputs published by exec nodes.
    produced: HashMap<String, Outputs>,
    variables: HashMap<String, Value>,
    outputs: BTreeMap<String, Value>,
    stats: RunStats,
    pub(crate) stack: Vec<Frame>,
}

impl ExecutionContext {
    pub fn new(
        run_id: RunId,
        env: Environment,
        max_steps: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            env,
            cancel,
            max_steps,
            memo: HashMap::new(),
            produced: HashMap::new(),
            variables: HashMap::new(),
            outputs: BTreeMap::new(),
            stats: RunStats::default(),
            stack: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Count one step, failing once the budget is exceeded.
    pub fn tick(&mut self) -> Result<usize> {
        self.stats.steps += 1;
        self.check_budget()?;
        Ok(self.stats.steps)
    }

    pub fn check_budget(&self) -> Result<()> {
        if self.stats.steps > self.max_steps {
            return Err(WyreError::StepBudgetExceeded(self.max_steps));
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(WyreError::Cancelled);
        }
        Ok(())
    }

    pub fn memoized(&self, node_id: &str) -> Option<&Outputs> {
        self.memo.get(node_id).map(|e| &e.outputs)
    }

    pub fn memo_reads(&self, node_id: &str) -> Option<&MemoReads> {
        self.memo.get(node_id).map(|e| &e.reads)
    }

    pub(crate) fn memoize(&mut self, node_id: &str, outputs: Outputs, reads: MemoReads) {
        *self
            .stats
            .pure_evaluations
            .entry(node_id.to_string())
            .or_insert(0) += 1;
        self.memo
            .insert(node_id.to_string(), MemoEntry { outputs, reads });
    }

    /// Drop every cached pure output.
    pub fn invalidate_memo(&mut self) {
        self.memo.clear();
    }

    /// Publish an exec node's output, dropping memo entries that read it.
    pub fn record(&mut self, node_id: &str, pin: &str, value: Value) {
        self.produced
            .entry(node_id.to_string())
            .or_default()
            .insert(pin.to_string(), value);
        self.memo.retain(|_, e| !e.reads.nodes.contains(node_id));
    }

    pub fn produced(&self, node_id: &str, pin: &str) -> Option<&Value> {
        self.produced.get(node_id).and_then(|o| o.get(pin))
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
        self.memo.retain(|_, e| !e.reads.variables.contains(name));
    }

    pub fn set_output(&mut self, name: &str, value: Value) {
        self.outputs.insert(name.to_string(), value);
    }

    /// The collected End outputs, or `{"output": ""}` when no End node ran.
    pub fn take_outputs(&mut self) -> BTreeMap<String, Value> {
        let mut outputs = std::mem::take(&mut self.outputs);
        if outputs.is_empty() {
            outputs.insert("output".to_string(), Value::String(String::new()));
        }
        outputs
    }
}
