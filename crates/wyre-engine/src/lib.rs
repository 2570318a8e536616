pub mod coerce;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod evaluator;
pub mod graph;
pub mod interpreter;
pub mod ops;
pub mod report;
pub mod session;

pub use coerce::{can_coerce, coerce};
pub use context::{ExecutionContext, RunStats};
pub use dispatch::{EffectDispatcher, EffectOutput};
pub use env::Environment;
pub use evaluator::Evaluator;
pub use graph::{Edge, EdgeKind, EffectSpec, Graph, GraphSpec, LoopMode, Node, NodeKind, Parameter};
pub use interpreter::Interpreter;
pub use ops::PureOp;
pub use report::Reporter;
pub use session::{RunHandle, RunOutcome, RunScheduler};
