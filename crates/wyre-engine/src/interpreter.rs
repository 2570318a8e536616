//! Control-flow interpreter.
//!
//! Walks exec edges from the start node using an explicit stack of frames.
//! Following an exec pin pushes its targets in reverse declaration order, so
//! the first target's whole chain drains before the second begins. Sequence
//! and loop nodes park a frame beneath their sub-chains and resume when it
//! surfaces again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use wyre_core::error::{Result, WyreError};
use wyre_core::types::PinKind;

use crate::coerce::{coerce, text_of, truthy};
use crate::context::{ExecutionContext, Frame, LoopSource, LoopState};
use crate::dispatch::{EffectCall, EffectDispatcher};
use crate::evaluator::Evaluator;
use crate::graph::{EffectSpec, Graph, LoopMode, Node, NodeKind};
use crate::report::Reporter;

/// Where control goes after a node executes.
enum Transition {
    Follow(String),
    /// End of the current chain.
    Halt,
    Sequence(usize),
    Loop(LoopState),
}

impl Transition {
    fn follow(pin: &str) -> Self {
        Self::Follow(pin.to_string())
    }
}

pub struct Interpreter {
    graph: Arc<Graph>,
    dispatcher: Arc<EffectDispatcher>,
    max_loop_iterations: usize,
}

impl Interpreter {
    pub fn new(
        graph: Arc<Graph>,
        dispatcher: Arc<EffectDispatcher>,
        max_loop_iterations: usize,
    ) -> Self {
        Self {
            graph,
            dispatcher,
            max_loop_iterations,
        }
    }

    /// Execute the graph to completion and return the End outputs.
    pub async fn run(
        &self,
        ctx: &mut ExecutionContext,
        reporter: &Reporter,
    ) -> Result<BTreeMap<String, Value>> {
        ctx.ensure_active()?;
        let start = self.graph.start();
        self.seed_parameters(ctx, start)?;
        self.enter(ctx, reporter, start)?;
        ctx.stack.clear();
        self.follow(ctx, &start.id, "exec_out");

        while let Some(frame) = ctx.stack.pop() {
            ctx.ensure_active()?;
            match frame {
                Frame::Enter(id) => {
                    let node = self.graph.node(&id)?;
                    self.enter(ctx, reporter, node)?;
                    match self.execute(ctx, reporter, node).await? {
                        Transition::Follow(pin) => self.follow(ctx, &id, &pin),
                        Transition::Halt => {}
                        Transition::Sequence(branches) => ctx.stack.push(Frame::Sequence {
                            node: id,
                            next: 0,
                            branches,
                        }),
                        Transition::Loop(state) => ctx.stack.push(Frame::Loop { node: id, state }),
                    }
                }
                Frame::Sequence {
                    node,
                    next,
                    branches,
                } => {
                    // Unwired branches are skipped without parking a frame.
                    let wired = (next..branches)
                        .map(|i| (i, format!("then_{i}")))
                        .find(|(_, pin)| !self.graph.exec_targets(&node, pin).is_empty());
                    match wired {
                        Some((i, pin)) => {
                            ctx.stack.push(Frame::Sequence {
                                node: node.clone(),
                                next: i + 1,
                                branches,
                            });
                            self.follow(ctx, &node, &pin);
                        }
                        None => self.follow(ctx, &node, "exec_out"),
                    }
                }
                Frame::Loop { node, mut state } => {
                    if state.iteration > 0 {
                        ctx.check_budget()?;
                    }
                    let loop_node = self.graph.node(&node)?;
                    if self.next_iteration(ctx, loop_node, &mut state)? {
                        ctx.stack.push(Frame::Loop {
                            node: node.clone(),
                            state,
                        });
                        self.follow(ctx, &node, "loop_body");
                    } else {
                        debug!(node_id = %node, iterations = state.iteration, "Loop completed");
                        self.follow(ctx, &node, "completed");
                    }
                }
            }
        }

        Ok(ctx.take_outputs())
    }

    /// Publish start parameters from the environment, falling back to the
    /// start node's defaults.
    fn seed_parameters(&self, ctx: &mut ExecutionContext, start: &Node) -> Result<()> {
        let NodeKind::Start { parameters } = &start.kind else {
            return Ok(());
        };
        for param in parameters {
            let raw = ctx
                .env()
                .get(&param.name)
                .or_else(|| start.defaults.get(&param.name))
                .cloned()
                .unwrap_or(Value::Null);
            let value = coerce(raw, PinKind::Any, param.kind)?;
            ctx.record(&start.id, &param.name, value);
        }
        Ok(())
    }

    fn enter(&self, ctx: &mut ExecutionContext, reporter: &Reporter, node: &Node) -> Result<()> {
        let step = ctx.tick()?;
        debug!(
            run_id = %ctx.run_id(),
            node_id = %node.id,
            kind = node.kind.name(),
            step,
            "Entering node"
        );
        reporter.step_started(&node.id, node.label(), step);
        Ok(())
    }

    fn follow(&self, ctx: &mut ExecutionContext, node_id: &str, pin: &str) {
        for target in self.graph.exec_targets(node_id, pin).iter().rev() {
            ctx.stack.push(Frame::Enter(target.clone()));
        }
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        reporter: &Reporter,
        node: &Node,
    ) -> Result<Transition> {
        let eval = Evaluator::new(&self.graph);
        match &node.kind {
            NodeKind::Start { .. } => Ok(Transition::follow("exec_out")),
            NodeKind::End { output_name } => {
                let value = eval.resolve(ctx, node, "result")?;
                debug!(node_id = %node.id, output = %output_name, "Recorded output");
                ctx.set_output(output_name, value);
                Ok(Transition::Halt)
            }
            NodeKind::Sequence { outputs } => Ok(Transition::Sequence(*outputs)),
            NodeKind::Branch => {
                let condition = eval.resolve(ctx, node, "condition")?;
                let pin = if truthy(&condition) { "true" } else { "false" };
                debug!(node_id = %node.id, branch = pin, "Branch taken");
                Ok(Transition::follow(pin))
            }
            NodeKind::Switch { cases } => {
                let value = text_of(&eval.resolve(ctx, node, "value")?);
                let pin = cases
                    .iter()
                    .position(|c| *c == value)
                    .map(|i| format!("case_{i}"))
                    .unwrap_or_else(|| "default".to_string());
                debug!(node_id = %node.id, case = %pin, "Switch matched");
                Ok(Transition::Follow(pin))
            }
            NodeKind::Loop {
                mode,
                max_iterations,
            } => self.begin_loop(ctx, &eval, node, *mode, *max_iterations),
            NodeKind::SetVariable { name } => {
                let value = eval.resolve(ctx, node, "value")?;
                ctx.set_variable(name, value.clone());
                ctx.record(&node.id, "value", value);
                Ok(Transition::follow("exec_out"))
            }
            NodeKind::Effect(spec) => self.run_effect(ctx, reporter, &eval, node, spec).await,
            NodeKind::Pure(_) => Err(WyreError::node(&node.id, "pure nodes cannot be executed")),
        }
    }

    fn begin_loop(
        &self,
        ctx: &mut ExecutionContext,
        eval: &Evaluator<'_>,
        node: &Node,
        mode: LoopMode,
        max_iterations: usize,
    ) -> Result<Transition> {
        if self.graph.exec_targets(&node.id, "loop_body").is_empty() {
            debug!(node_id = %node.id, "Loop has no body");
            return Ok(Transition::follow("completed"));
        }

        let source = match mode {
            LoopMode::Count => {
                let count = eval.resolve(ctx, node, "count")?.as_f64().unwrap_or(0.0);
                let remaining = if count > 0.0 { count.floor() as usize } else { 0 };
                LoopSource::Count { remaining }
            }
            LoopMode::While => LoopSource::While,
            LoopMode::ForEach => match eval.resolve(ctx, node, "array")? {
                Value::Array(items) => LoopSource::Items(items),
                _ => LoopSource::Items(vec![]),
            },
        };

        Ok(Transition::Loop(LoopState {
            iteration: 0,
            cap: max_iterations.min(self.max_loop_iterations),
            source,
        }))
    }

    /// Decide whether the loop runs again; if so, count the iteration and
    /// publish `index` and `element`.
    fn next_iteration(
        &self,
        ctx: &mut ExecutionContext,
        node: &Node,
        state: &mut LoopState,
    ) -> Result<bool> {
        ctx.invalidate_memo();
        let proceed = match &state.source {
            LoopSource::Count { remaining } => *remaining > 0,
            LoopSource::While => {
                truthy(&Evaluator::new(&self.graph).resolve(ctx, node, "condition")?)
            }
            LoopSource::Items(items) => state.iteration < items.len(),
        };
        if !proceed {
            return Ok(false);
        }
        if state.iteration >= state.cap {
            warn!(node_id = %node.id, cap = state.cap, "Loop iteration cap reached");
            return Ok(false);
        }

        ctx.tick()?;
        let element = match &mut state.source {
            LoopSource::Count { remaining } => {
                *remaining -= 1;
                Value::Null
            }
            LoopSource::While => Value::Null,
            LoopSource::Items(items) => items.get(state.iteration).cloned().unwrap_or(Value::Null),
        };
        ctx.record(&node.id, "index", Value::from(state.iteration as u64));
        ctx.record(&node.id, "element", element);
        state.iteration += 1;
        Ok(true)
    }

    async fn run_effect(
        &self,
        ctx: &mut ExecutionContext,
        reporter: &Reporter,
        eval: &Evaluator<'_>,
        node: &Node,
        spec: &EffectSpec,
    ) -> Result<Transition> {
        let inputs = (0..spec.inputs)
            .map(|i| eval.resolve(ctx, node, &format!("in_{i}")))
            .collect::<Result<Vec<_>>>()?;
        ctx.stats_mut().effect_calls += 1;

        let call = EffectCall {
            node_id: &node.id,
            spec,
            inputs: &inputs,
            variables: ctx.variables(),
            env: ctx.env(),
        };
        let result = self
            .dispatcher
            .invoke(call, ctx.cancel_token(), reporter)
            .await;

        match result {
            Ok(output) => {
                let stats = ctx.stats_mut();
                stats.input_tokens += output.input_tokens;
                stats.output_tokens += output.output_tokens;
                reporter.usage(stats.input_tokens, stats.output_tokens);
                ctx.record(&node.id, "response", Value::String(output.text));
                ctx.record(&node.id, "error", Value::String(String::new()));
                Ok(Transition::follow("exec_out"))
            }
            Err(WyreError::Cancelled) => Err(WyreError::Cancelled),
            Err(e) if spec.error_tolerant => {
                warn!(node_id = %node.id, error = %e, "Effect failed, continuing on error path");
                ctx.record(&node.id, "response", Value::String(String::new()));
                ctx.record(&node.id, "error", Value::String(e.to_string()));
                if self.graph.exec_targets(&node.id, "on_error").is_empty() {
                    Ok(Transition::follow("exec_out"))
                } else {
                    Ok(Transition::follow("on_error"))
                }
            }
            Err(e) => Err(e),
        }
    }
}
