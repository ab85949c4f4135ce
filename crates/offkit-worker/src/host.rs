//! Host-runtime binding for lifecycle triggers.
//!
//! The host runtime fires named triggers (`install`, `activate`, `fetch`)
//! and must not let the lifecycle progress past a trigger until its work
//! settles; awaiting [`WorkerHost::dispatch`] is that wait. The core
//! lifecycle logic lives in [`CacheWorker`]; this layer only routes events
//! and reports state transitions to the embedder.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use offkit_net::Request;

use crate::worker::{CacheWorker, ServedResponse, WorkerError, WorkerState};

/// A lifecycle trigger fired by the host runtime.
#[derive(Debug)]
pub enum LifecycleEvent {
    /// A new worker version was loaded for the first time.
    Install,
    /// The previous version has no remaining clients.
    Activate,
    /// A resource load attributable to this origin.
    Fetch(Request),
}

/// Notifications emitted back to the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker reached a new lifecycle state.
    StateChange(WorkerState),
}

/// Thin adapter mapping host triggers onto a worker.
pub struct WorkerHost {
    worker: Arc<CacheWorker>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHost {
    /// Bind a worker. Returns the host and the embedder's event stream.
    pub fn new(worker: Arc<CacheWorker>) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { worker, event_tx }, event_rx)
    }

    /// The bound worker.
    pub fn worker(&self) -> &Arc<CacheWorker> {
        &self.worker
    }

    /// Dispatch one trigger and wait for its work to settle.
    ///
    /// `Fetch` resolves to the served response; lifecycle triggers resolve
    /// to `None`.
    pub async fn dispatch(
        &self,
        event: LifecycleEvent,
    ) -> Result<Option<ServedResponse>, WorkerError> {
        match event {
            LifecycleEvent::Install => {
                self.worker.install().await?;
                let _ = self
                    .event_tx
                    .send(WorkerEvent::StateChange(WorkerState::Installed));
                Ok(None)
            }
            LifecycleEvent::Activate => {
                self.worker.activate().await?;
                let _ = self
                    .event_tx
                    .send(WorkerEvent::StateChange(WorkerState::Active));
                Ok(None)
            }
            LifecycleEvent::Fetch(request) => {
                debug!(url = %request.url, "Dispatching fetch event");
                self.worker.intercept(request).await.map(Some)
            }
        }
    }
}
