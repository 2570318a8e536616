//! Pull-based resolution of data pins.
//!
//! A consumer asks for an input pin; the evaluator walks upstream through
//! pure nodes with an explicit work stack, memoizing each node's outputs for
//! the current pass. Impure producers are read from the context's recorded
//! outputs.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use wyre_core::error::{Result, WyreError};
use wyre_core::types::{PinKind, PinRef};

use crate::coerce::coerce;
use crate::context::{ExecutionContext, MemoReads};
use crate::graph::{Graph, Node, NodeKind};
use crate::ops::PureOp;

pub struct Evaluator<'g> {
    graph: &'g Graph,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// The value of `node.pin`, coerced to the pin's declared kind.
    pub fn resolve(&self, ctx: &mut ExecutionContext, node: &Node, pin: &str) -> Result<Value> {
        let kind = node.input_kind(pin).ok_or_else(|| {
            WyreError::node(&node.id, format!("{} node has no input '{pin}'", node.kind.name()))
        })?;

        let Some(source) = self.graph.data_source(&node.id, pin) else {
            return self.literal(node, pin, kind);
        };

        let producer = self.graph.node(&source.node)?;
        if producer.is_pure() && ctx.memoized(&producer.id).is_none() {
            self.evaluate_pure(ctx, source)?;
        }

        let raw = if producer.is_pure() {
            ctx.memoized(&producer.id)
                .and_then(|outputs| outputs.get(&source.pin))
                .cloned()
        } else {
            ctx.produced(&producer.id, &source.pin).cloned()
        }
        .unwrap_or(Value::Null);

        let from = producer.output_kind(&source.pin).unwrap_or(PinKind::Any);
        match coerce(raw, from, kind) {
            Ok(value) => Ok(value),
            Err(e) => match node.defaults.get(pin) {
                Some(default) => {
                    warn!(
                        node_id = %node.id,
                        pin,
                        error = %e,
                        "Coercion failed, using pin default"
                    );
                    coerce(default.clone(), PinKind::Any, kind)
                }
                None => Err(e),
            },
        }
    }

    /// Resolve every declared input of `node`.
    pub fn resolve_all(
        &self,
        ctx: &mut ExecutionContext,
        node: &Node,
    ) -> Result<HashMap<String, Value>> {
        let mut values = HashMap::new();
        for pin in node.kind.inputs() {
            let value = self.resolve(ctx, node, &pin.name)?;
            values.insert(pin.name, value);
        }
        Ok(values)
    }

    fn literal(&self, node: &Node, pin: &str, kind: PinKind) -> Result<Value> {
        match node.defaults.get(pin) {
            Some(value) => coerce(value.clone(), PinKind::Any, kind),
            None => Ok(kind.zero_value()),
        }
    }

    /// Compute the pure node behind `root` and everything it depends on.
    ///
    /// The work stack holds the requested output pins of nodes in progress;
    /// meeting one of them again is a cycle.
    fn evaluate_pure(&self, ctx: &mut ExecutionContext, root: &PinRef) -> Result<()> {
        let mut stack: Vec<PinRef> = vec![root.clone()];

        while let Some(top) = stack.last() {
            let node = self.graph.node(&top.node)?;
            if ctx.memoized(&node.id).is_some() {
                stack.pop();
                continue;
            }

            if let Some(dependency) = self.pending_dependency(ctx, node) {
                if let Some(pos) = stack.iter().position(|p| p.node == dependency.node) {
                    let mut path = stack[pos..].to_vec();
                    path.push(dependency);
                    return Err(WyreError::DataCycle { path });
                }
                stack.push(dependency);
                continue;
            }

            let NodeKind::Pure(op) = &node.kind else {
                return Err(WyreError::node(&node.id, "not a pure node"));
            };
            let inputs = self.resolve_all(ctx, node)?;
            let outputs = op.evaluate(&node.id, &inputs, ctx.variables())?;
            debug!(node_id = %node.id, op = op.name(), "Pure node evaluated");
            let reads = self.reads_of(ctx, node, op);
            ctx.memoize(&node.id, outputs, reads);
            stack.pop();
        }
        Ok(())
    }

    /// What `node` read: its variable, the exec nodes feeding it, and
    /// whatever its pure producers read in turn.
    fn reads_of(&self, ctx: &ExecutionContext, node: &Node, op: &PureOp) -> MemoReads {
        let mut reads = MemoReads::default();
        if let PureOp::GetVariable { name } = op {
            reads.variables.insert(name.clone());
        }
        for pin in node.kind.inputs() {
            let Some(source) = self.graph.data_source(&node.id, &pin.name) else {
                continue;
            };
            match self.graph.get(&source.node) {
                Some(producer) if producer.is_pure() => {
                    if let Some(upstream) = ctx.memo_reads(&producer.id) {
                        reads.merge(upstream);
                    }
                }
                Some(_) => {
                    reads.nodes.insert(source.node.clone());
                }
                None => {}
            }
        }
        reads
    }

    /// First upstream pure output of `node` not yet computed this pass.
    fn pending_dependency(&self, ctx: &ExecutionContext, node: &Node) -> Option<PinRef> {
        node.kind.inputs().iter().find_map(|pin| {
            let source = self.graph.data_source(&node.id, &pin.name)?;
            let producer = self.graph.get(&source.node)?;
            (producer.is_pure() && ctx.memoized(&producer.id).is_none()).then(|| source.clone())
        })
    }
}
