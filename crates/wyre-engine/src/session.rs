//! Run scheduling and the worker boundary between host and interpreter.
//!
//! Every submitted run gets its own task, event channel and cancellation
//! token. A shared semaphore caps how many runs execute at once; the rest
//! wait in `queued`. The interpreter itself runs on an inner task so a panic
//! surfaces as a `failed` event instead of taking the host down.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wyre_core::config::{EngineConfig, RunLimits};
use wyre_core::error::{Result, WyreError};
use wyre_core::event::EventBus;
use wyre_core::traits::LanguageModel;
use wyre_core::types::{RunEvent, RunId};

use crate::context::{ExecutionContext, RunStats};
use crate::dispatch::EffectDispatcher;
use crate::env::Environment;
use crate::graph::{Graph, GraphSpec};
use crate::interpreter::Interpreter;
use crate::report::Reporter;

/// Final result of one run, as returned to the host.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub result: Result<BTreeMap<String, Value>>,
    pub stats: RunStats,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Host-side handle to a submitted run.
pub struct RunHandle {
    pub run_id: RunId,
    /// Ordered events for this run; closes after the terminal event.
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Request cooperative cancellation. A queued run never starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> RunOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome {
                run_id: self.run_id,
                result: Err(WyreError::node("session", join_failure(e))),
                stats: RunStats::default(),
            },
        }
    }

    /// Drain every event, then wait for the outcome.
    pub async fn collect(mut self) -> (Vec<RunEvent>, RunOutcome) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.wait().await)
    }
}

/// Accepts runs and executes them under the configured caps.
pub struct RunScheduler {
    dispatcher: Arc<EffectDispatcher>,
    limits: RunLimits,
    permits: Arc<Semaphore>,
    bus: Arc<EventBus>,
}

impl RunScheduler {
    pub fn new(model: Arc<dyn LanguageModel>, config: &EngineConfig) -> Self {
        let limits = config.engine.clone();
        let dispatcher = EffectDispatcher::new(
            model,
            config.model.clone(),
            limits.max_concurrent_effects,
        );
        info!(
            max_concurrent_runs = limits.max_concurrent_runs,
            max_concurrent_effects = limits.max_concurrent_effects,
            max_steps = limits.max_steps,
            "Run scheduler ready"
        );
        Self {
            dispatcher: Arc::new(dispatcher),
            permits: Arc::new(Semaphore::new(limits.max_concurrent_runs.max(1))),
            bus: Arc::new(EventBus::new(limits.event_buffer)),
            limits,
        }
    }

    /// Publish every run's events on `bus` instead of the scheduler's own.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// The bus carrying every run's events, sized by `engine.event_buffer`.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Validate `spec` and submit it; an invalid graph fails the run
    /// with `GraphStructure` without queueing it.
    pub fn submit_spec(&self, spec: GraphSpec, env: Environment) -> RunHandle {
        match Graph::new(spec) {
            Ok(graph) => self.submit(Arc::new(graph), env),
            Err(e) => self.reject(e),
        }
    }

    /// Queue a run of `graph` with the given initial environment.
    pub fn submit(&self, graph: Arc<Graph>, env: Environment) -> RunHandle {
        let (run_id, reporter, events, cancel) = self.open_run();
        reporter.emit(RunEvent::Queued {
            run_id: run_id.clone(),
        });

        let worker = RunWorker {
            graph,
            env,
            dispatcher: self.dispatcher.clone(),
            permits: self.permits.clone(),
            limits: self.limits.clone(),
            reporter,
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(worker.run());

        RunHandle {
            run_id,
            events,
            cancel,
            join,
        }
    }

    fn reject(&self, e: WyreError) -> RunHandle {
        let (run_id, reporter, events, cancel) = self.open_run();
        reporter.emit(RunEvent::Queued {
            run_id: run_id.clone(),
        });
        let outcome = finish(&reporter, Err(e), RunStats::default());
        drop(reporter);
        RunHandle {
            run_id,
            events,
            cancel,
            join: tokio::spawn(async move { outcome }),
        }
    }

    fn open_run(
        &self,
    ) -> (
        RunId,
        Reporter,
        mpsc::UnboundedReceiver<RunEvent>,
        CancellationToken,
    ) {
        let run_id = RunId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Reporter::new(run_id.clone(), tx, Some(self.bus.clone()));
        (run_id, reporter, rx, CancellationToken::new())
    }
}

/// Everything one run's task owns.
struct RunWorker {
    graph: Arc<Graph>,
    env: Environment,
    dispatcher: Arc<EffectDispatcher>,
    permits: Arc<Semaphore>,
    limits: RunLimits,
    reporter: Reporter,
    cancel: CancellationToken,
}

impl RunWorker {
    async fn run(self) -> RunOutcome {
        let RunWorker {
            graph,
            env,
            dispatcher,
            permits,
            limits,
            reporter,
            cancel,
        } = self;
        let run_id = reporter.run_id().clone();

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WyreError::Cancelled),
            permit = permits.acquire_owned() => {
                permit.map_err(|_| WyreError::node("session", "run limiter closed"))
            }
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                info!(run_id = %run_id, "Run cancelled while queued");
                return finish(&reporter, Err(e), RunStats::default());
            }
        };

        reporter.emit(RunEvent::Started {
            run_id: run_id.clone(),
            started_at: chrono::Utc::now(),
        });
        info!(run_id = %run_id, nodes = graph.len(), "Run started");

        let interpreter = Interpreter::new(graph, dispatcher, limits.max_loop_iterations);
        let mut ctx = ExecutionContext::new(run_id, env, limits.max_steps, cancel);
        let task_reporter = reporter.clone();
        let task = tokio::spawn(async move {
            let result = interpreter.run(&mut ctx, &task_reporter).await;
            (result, ctx.stats().clone())
        });

        let (result, stats) = match task.await {
            Ok(finished) => finished,
            Err(e) => (
                Err(WyreError::node("session", join_failure(e))),
                RunStats::default(),
            ),
        };
        finish(&reporter, result, stats)
    }
}

/// Emit the run's single terminal event.
fn finish(
    reporter: &Reporter,
    result: Result<BTreeMap<String, Value>>,
    stats: RunStats,
) -> RunOutcome {
    let run_id = reporter.run_id().clone();
    match &result {
        Ok(outputs) => {
            info!(
                run_id = %run_id,
                steps = stats.steps,
                effect_calls = stats.effect_calls,
                "Run completed"
            );
            reporter.emit(RunEvent::Completed {
                run_id: run_id.clone(),
                outputs: outputs.clone(),
            });
        }
        Err(e) => {
            if matches!(e, WyreError::Cancelled) {
                info!(run_id = %run_id, "Run cancelled");
            } else {
                error!(run_id = %run_id, kind = %e.kind(), error = %e, "Run failed");
            }
            reporter.emit(RunEvent::Failed {
                run_id: run_id.clone(),
                kind: e.kind(),
                detail: e.to_string(),
            });
        }
    }
    RunOutcome {
        run_id,
        result,
        stats,
    }
}

fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return "run task was aborted".to_string();
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("run panicked: {message}")
}
