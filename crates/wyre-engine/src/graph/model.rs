use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use wyre_core::error::{Result, WyreError};
use wyre_core::types::PinRef;

use super::edge::{Edge, EdgeKind};
use super::node::{Node, NodeKind, EXEC_IN, MAX_NUMBERED_PINS};
use crate::coerce::can_coerce;
use crate::ops::PureOp;

/// Graph as authored: nodes and edges, unvalidated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }
}

/// A validated, immutable blueprint graph.
///
/// Shared read-only across a run as `Arc<Graph>`.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// Exec targets per exec output pin, in edge declaration order.
    exec_out: HashMap<PinRef, Vec<String>>,
    /// The single producer feeding each connected data input pin.
    data_in: HashMap<PinRef, PinRef>,
    start: usize,
}

impl Graph {
    /// Validate `spec` and build lookup tables.
    ///
    /// Every problem found is reported in one `GraphStructure` error. Data
    /// cycles are not detected here; the evaluator reports them.
    pub fn new(spec: GraphSpec) -> Result<Self> {
        let mut problems: Vec<String> = Vec::new();

        let mut index = HashMap::new();
        // Nodes whose pin lists are too large to enumerate; their edges are skipped.
        let mut oversized: HashSet<&str> = HashSet::new();
        for (i, node) in spec.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                problems.push(format!("duplicate node id '{}'", node.id));
            }
            if !check_node_config(node, &mut problems) {
                oversized.insert(node.id.as_str());
            }
        }

        let starts: Vec<usize> = spec
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Start { .. }))
            .map(|(i, _)| i)
            .collect();
        match starts.len() {
            1 => {}
            0 => problems.push("graph has no start node".into()),
            n => problems.push(format!("graph has {n} start nodes")),
        }

        let mut exec_out: HashMap<PinRef, Vec<String>> = HashMap::new();
        let mut data_in: HashMap<PinRef, PinRef> = HashMap::new();

        for edge in &spec.edges {
            let (Some(&from_idx), Some(&to_idx)) =
                (index.get(&edge.from.node), index.get(&edge.to.node))
            else {
                for end in [&edge.from, &edge.to] {
                    if !index.contains_key(&end.node) {
                        problems.push(format!(
                            "edge {} -> {} references missing node '{}'",
                            edge.from, edge.to, end.node
                        ));
                    }
                }
                continue;
            };
            let from = &spec.nodes[from_idx];
            let to = &spec.nodes[to_idx];
            if oversized.contains(from.id.as_str()) || oversized.contains(to.id.as_str()) {
                continue;
            }

            match edge.kind {
                EdgeKind::Exec => {
                    if !from.kind.exec_outputs().contains(&edge.from.pin) {
                        problems.push(format!(
                            "{} node '{}' has no exec output '{}'",
                            from.kind.name(),
                            from.id,
                            edge.from.pin
                        ));
                        continue;
                    }
                    if !to.kind.has_exec_input() || edge.to.pin != EXEC_IN {
                        problems.push(format!(
                            "exec edge {} -> {} must end at an exec input",
                            edge.from, edge.to
                        ));
                        continue;
                    }
                    exec_out
                        .entry(edge.from.clone())
                        .or_default()
                        .push(to.id.clone());
                }
                EdgeKind::Data => {
                    let Some(from_kind) = from.output_kind(&edge.from.pin) else {
                        problems.push(format!(
                            "{} node '{}' has no data output '{}'",
                            from.kind.name(),
                            from.id,
                            edge.from.pin
                        ));
                        continue;
                    };
                    let Some(to_kind) = to.input_kind(&edge.to.pin) else {
                        problems.push(format!(
                            "{} node '{}' has no data input '{}'",
                            to.kind.name(),
                            to.id,
                            edge.to.pin
                        ));
                        continue;
                    };
                    if !can_coerce(from_kind, to_kind) {
                        problems.push(format!(
                            "data edge {} -> {} joins {} to {}",
                            edge.from, edge.to, from_kind, to_kind
                        ));
                        continue;
                    }
                    if let Some(existing) = data_in.insert(edge.to.clone(), edge.from.clone()) {
                        problems.push(format!(
                            "input {} has two producers: {} and {}",
                            edge.to, existing, edge.from
                        ));
                    }
                }
            }
        }

        if !problems.is_empty() {
            return Err(WyreError::GraphStructure(problems.join("; ")));
        }

        debug!(
            nodes = spec.nodes.len(),
            edges = spec.edges.len(),
            "Graph validated"
        );

        Ok(Self {
            nodes: spec.nodes,
            index,
            exec_out,
            data_in,
            start: starts[0],
        })
    }

    /// Parse and validate a graph from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: GraphSpec = serde_json::from_str(text)?;
        Self::new(spec)
    }

    /// The node with `id`, or a structure error naming it.
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| WyreError::GraphStructure(format!("node '{id}' not found")))
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn start(&self) -> &Node {
        &self.nodes[self.start]
    }

    /// Nodes entered when control leaves `node.pin`, in declaration order.
    pub fn exec_targets(&self, node: &str, pin: &str) -> &[String] {
        self.exec_out
            .get(&PinRef::new(node, pin))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The output pin feeding `node.pin`, if connected.
    pub fn data_source(&self, node: &str, pin: &str) -> Option<&PinRef> {
        self.data_in.get(&PinRef::new(node, pin))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Record configuration problems of a single node. Returns false when the
/// node declares more numbered pins than allowed.
fn check_node_config(node: &Node, problems: &mut Vec<String>) -> bool {
    let numbered = match &node.kind {
        NodeKind::Sequence { outputs } => *outputs,
        NodeKind::Switch { cases } => cases.len(),
        NodeKind::Effect(spec) => spec.inputs,
        _ => 0,
    };
    if numbered > MAX_NUMBERED_PINS {
        problems.push(format!(
            "{} node '{}' declares {numbered} numbered pins (limit {MAX_NUMBERED_PINS})",
            node.kind.name(),
            node.id
        ));
    }

    match &node.kind {
        NodeKind::Sequence { outputs: 0 } => {
            problems.push(format!("sequence node '{}' has no outputs", node.id))
        }
        NodeKind::Effect(spec) => {
            if spec.prompt_template.trim().is_empty() {
                problems.push(format!("effect node '{}' has no prompt template", node.id));
            }
            if spec.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
                problems.push(format!("effect node '{}' names an empty model", node.id));
            }
        }
        NodeKind::SetVariable { name } | NodeKind::Pure(PureOp::GetVariable { name })
            if name.trim().is_empty() =>
        {
            problems.push(format!("node '{}' has an empty variable name", node.id))
        }
        NodeKind::Start { parameters } => {
            let mut seen = HashSet::new();
            for p in parameters {
                if !seen.insert(p.name.as_str()) {
                    problems.push(format!(
                        "start node '{}' declares parameter '{}' twice",
                        node.id, p.name
                    ));
                }
            }
        }
        _ => {}
    }
    numbered <= MAX_NUMBERED_PINS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{EffectSpec, Parameter};
    use crate::ops::MathOp;
    use serde_json::json;
    use wyre_core::types::PinKind;

    fn start() -> Node {
        Node::new("start", NodeKind::Start { parameters: vec![] })
    }

    fn end(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::End {
                output_name: "output".into(),
            },
        )
    }

    fn structure_message(result: Result<Graph>) -> String {
        match result {
            Err(WyreError::GraphStructure(msg)) => msg,
            other => panic!("expected structure error, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_graph() {
        let graph = Graph::new(
            GraphSpec::new()
                .node(start())
                .node(end("end"))
                .edge(Edge::exec("start", "exec_out", "end")),
        )
        .unwrap();
        assert_eq!(graph.start().id, "start");
        assert_eq!(graph.exec_targets("start", "exec_out"), ["end".to_string()]);
        assert!(graph.exec_targets("end", "exec_out").is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_fan_out_keeps_declaration_order() {
        let graph = Graph::new(
            GraphSpec::new()
                .node(start())
                .node(end("b"))
                .node(end("a"))
                .edge(Edge::exec("start", "exec_out", "b"))
                .edge(Edge::exec("start", "exec_out", "a")),
        )
        .unwrap();
        assert_eq!(graph.exec_targets("start", "exec_out"), ["b", "a"]);
    }

    #[test]
    fn test_two_producers_rejected() {
        let lit = |id: &str| {
            Node::new(
                id,
                NodeKind::Pure(PureOp::Literal {
                    value_kind: PinKind::Number,
                    value: json!(1),
                }),
            )
        };
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(start())
                .node(end("end"))
                .node(lit("x"))
                .node(lit("y"))
                .edge(Edge::data("x", "value", "end", "result"))
                .edge(Edge::data("y", "value", "end", "result")),
        ));
        assert!(msg.contains("two producers"), "{msg}");
    }

    #[test]
    fn test_all_problems_reported_together() {
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(end("end"))
                .node(end("end"))
                .node(Node::new("seq", NodeKind::Sequence { outputs: 0 }))
                .node(Node::new("llm", NodeKind::Effect(EffectSpec::new(""))))
                .edge(Edge::exec("ghost", "exec_out", "end")),
        ));
        assert!(msg.contains("duplicate node id 'end'"), "{msg}");
        assert!(msg.contains("no start node"), "{msg}");
        assert!(msg.contains("no outputs"), "{msg}");
        assert!(msg.contains("no prompt template"), "{msg}");
        assert!(msg.contains("missing node 'ghost'"), "{msg}");
        assert_eq!(msg.matches("; ").count(), 4);
    }

    #[test]
    fn test_oversized_pin_families_rejected() {
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(start())
                .node(Node::new("seq", NodeKind::Sequence { outputs: 50_000_000 }))
                .node(Node::new(
                    "llm",
                    NodeKind::Effect(EffectSpec::new("hi").with_inputs(1 << 34)),
                ))
                .node(Node::new(
                    "sw",
                    NodeKind::Switch {
                        cases: (0..=MAX_NUMBERED_PINS).map(|i| i.to_string()).collect(),
                    },
                ))
                .edge(Edge::exec("start", "exec_out", "seq"))
                .edge(Edge::data("start", "topic", "llm", "in_5")),
        ));
        assert!(msg.contains("sequence node 'seq' declares 50000000"), "{msg}");
        assert!(msg.contains("effect node 'llm' declares 17179869184"), "{msg}");
        assert!(msg.contains("switch node 'sw' declares 65"), "{msg}");
        assert_eq!(msg.matches("; ").count(), 2);
    }

    #[test]
    fn test_undeclared_pins_rejected() {
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(start())
                .node(end("end"))
                .edge(Edge::exec("start", "loop_body", "end"))
                .edge(Edge::data("start", "nothing", "end", "result")),
        ));
        assert!(msg.contains("no exec output 'loop_body'"), "{msg}");
        assert!(msg.contains("no data output 'nothing'"), "{msg}");
    }

    #[test]
    fn test_exec_edge_into_pure_node_rejected() {
        let sum = Node::new("sum", NodeKind::Pure(PureOp::Math { op: MathOp::Add }));
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(start())
                .node(sum)
                .edge(Edge::exec("start", "exec_out", "sum")),
        ));
        assert!(msg.contains("must end at an exec input"), "{msg}");
    }

    #[test]
    fn test_incompatible_kinds_rejected() {
        let params = vec![Parameter::new("items", PinKind::Array)];
        let sum = Node::new("sum", NodeKind::Pure(PureOp::Math { op: MathOp::Add }));
        let msg = structure_message(Graph::new(
            GraphSpec::new()
                .node(Node::new("start", NodeKind::Start { parameters: params }))
                .node(sum)
                .edge(Edge::data("start", "items", "sum", "a")),
        ));
        assert!(msg.contains("joins ARRAY to NUMBER"), "{msg}");
    }

    #[test]
    fn test_from_json() {
        let graph = Graph::from_json(
            r#"{
                "nodes": [
                    {"id": "start", "kind": "start", "parameters": [{"name": "topic", "kind": "STRING"}]},
                    {"id": "done", "kind": "end", "output_name": "answer"}
                ],
                "edges": [
                    {"from": "start.exec_out", "to": "done.exec_in", "kind": "exec"},
                    {"from": "start.topic", "to": "done.result"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            graph.data_source("done", "result"),
            Some(&PinRef::new("start", "topic"))
        );
        assert!(graph.node("missing").is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(
            Graph::from_json("{not json"),
            Err(WyreError::Json(_))
        ));
    }
}
