use std::sync::Arc;

use tokio::sync::mpsc;

use wyre_core::event::EventBus;
use wyre_core::types::{RunEvent, RunId};

/// Sends one run's events to its handle and to the host-wide bus.
#[derive(Clone)]
pub struct Reporter {
    run_id: RunId,
    tx: mpsc::UnboundedSender<RunEvent>,
    bus: Option<Arc<EventBus>>,
}

impl Reporter {
    pub fn new(
        run_id: RunId,
        tx: mpsc::UnboundedSender<RunEvent>,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self { run_id, tx, bus }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event.clone());
        }
        // The handle may have been dropped; the run continues regardless.
        let _ = self.tx.send(event);
    }

    pub fn step_started(&self, node_id: &str, label: &str, step: usize) {
        self.emit(RunEvent::StepStarted {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            label: label.to_string(),
            step,
        });
    }

    pub fn progress(&self, node_id: &str, chunk: &str) {
        self.emit(RunEvent::Progress {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            chunk: chunk.to_string(),
        });
    }

    pub fn usage(&self, input_tokens: u64, output_tokens: u64) {
        self.emit(RunEvent::Usage {
            run_id: self.run_id.clone(),
            input_tokens,
            output_tokens,
        });
    }
}
