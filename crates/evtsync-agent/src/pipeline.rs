//! Bounded producer/consumer pipeline from webhook ingress to the bus.
//!
//! The pipeline owns a fixed-capacity channel. [`EventPipeline::submit`]
//! waits while the channel is full, so a slow bus pushes back on webhook
//! handlers instead of growing memory. Workers share the receiving end and
//! the first idle worker takes the next event.

use crate::bus::MessageBus;
use evtsync_core::IngestionEvent;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bounded ingestion pipeline.
pub struct EventPipeline {
    sender: mpsc::Sender<IngestionEvent>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<IngestionEvent>>>,
    bus: Arc<dyn MessageBus>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl EventPipeline {
    /// Create a pipeline with a queue of `capacity` events.
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero.
    pub fn new(capacity: usize, bus: Arc<dyn MessageBus>) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidSize("capacity"));
        }
        let (sender, receiver) = mpsc::channel(capacity);

        Ok(Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            bus,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            capacity,
        })
    }

    /// Queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Enqueue an event, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline has been stopped.
    pub async fn submit(&self, event: IngestionEvent) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Stopped);
        }
        tokio::select! {
            sent = self.sender.send(event) => sent.map_err(|_| PipelineError::Stopped),
            () = self.cancel.cancelled() => Err(PipelineError::Stopped),
        }
    }

    /// Spawn `workers` long-lived publishing tasks.
    ///
    /// # Errors
    ///
    /// Returns error if `workers` is zero, the pipeline is already running,
    /// or it has been stopped.
    pub fn start(&self, workers: usize) -> Result<(), PipelineError> {
        if workers == 0 {
            return Err(PipelineError::InvalidSize("workers"));
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Stopped);
        }

        let mut handles = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() {
            return Err(PipelineError::AlreadyStarted);
        }

        for worker in 0..workers {
            let receiver = self.receiver.clone();
            let bus = self.bus.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(run_worker(worker, receiver, bus, cancel)));
        }

        tracing::info!(workers, capacity = self.capacity, "Event pipeline started");
        Ok(())
    }

    /// Stop accepting events and wait for the workers to exit.
    ///
    /// Publishes still in flight are abandoned and queued events are dropped,
    /// so a stalled bus cannot hold shutdown open.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Pipeline worker panicked");
            }
        }

        tracing::info!(dropped = self.pending(), "Event pipeline stopped");
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<IngestionEvent>>>,
    bus: Arc<dyn MessageBus>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                event = receiver.recv() => event,
                () = cancel.cancelled() => None,
            }
        };
        let Some(event) = next else {
            break;
        };

        let published = tokio::select! {
            published = bus.publish(&event) => published,
            () = cancel.cancelled() => {
                tracing::warn!(worker, ip = %event.ip, "Publish abandoned on shutdown");
                break;
            }
        };
        if let Err(e) = published {
            tracing::error!(
                worker,
                error = %e,
                ip = %event.ip,
                event_type = %event.event_type,
                "Failed to publish event"
            );
        }
    }
    tracing::debug!(worker, "Pipeline worker exited");
}

/// Errors for pipeline operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// A size parameter was zero
    #[error("pipeline {0} must be at least 1")]
    InvalidSize(&'static str),
    /// Workers are already running
    #[error("pipeline already started")]
    AlreadyStarted,
    /// The pipeline no longer accepts events
    #[error("pipeline stopped")]
    Stopped,
}
