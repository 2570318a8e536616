//! Blueprint graph model.
//!
//! A graph is a set of `Node`s joined by `Edge`s of two kinds: exec edges
//! carry control from an exec output pin to a node's exec input, data edges
//! carry values from an output pin to an input pin. `Graph::new` validates a
//! `GraphSpec` once; the result is immutable and shared across a run.

pub mod edge;
pub mod model;
pub mod node;

pub use edge::{parse_pin_ref, Edge, EdgeKind};
pub use model::{Graph, GraphSpec};
pub use node::{EffectSpec, LoopMode, Node, NodeKind, Parameter, PinDef, EXEC_IN};
