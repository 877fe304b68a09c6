//! The monitoring-and-delivery pipeline.
//!
//! Two long-lived tasks share a bounded [`DeliveryQueue`]:
//!
//! - the scheduler ticks at the configured interval, collects metrics and
//!   directory stats into a [`Sample`](crate::core::sample::Sample) and enqueues it
//! - the [`SheetUploader`] leases batches from the queue and appends them to a
//!   [`SheetSink`], retrying transient failures with backoff
//!
//! A [`PipelineHandle`] controls the running pipeline and exposes its status.

mod queue;
mod scheduler;
pub mod status;
mod uploader;

pub use queue::{DeliveryQueue, Lease};
pub use scheduler::ControlSignal;
pub use status::{PipelineEvent, RunState, StatusBoard, StatusSnapshot};
pub use uploader::{BatchOutcome, RetryPolicy, SheetUploader};

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::core::config::{Config, SharedConfig};
use crate::core::file_scanner::FileScanner;
use crate::core::sink::SheetSink;
use crate::core::system_monitor::{MetricsCollector, MetricsSource};
use crate::error::{MonitorError, Result};

const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// A pipeline that has not been started yet
pub struct Pipeline {
    collector: MetricsCollector,
    sink: Arc<dyn SheetSink>,
    status: Arc<StatusBoard>,
}

impl Pipeline {
    pub fn new(source: Box<dyn MetricsSource>, sink: Arc<dyn SheetSink>) -> Self {
        Self {
            collector: MetricsCollector::new(source),
            sink,
            status: Arc::new(StatusBoard::new()),
        }
    }

    pub fn state(&self) -> RunState {
        self.status.state()
    }

    /// Validate `config` and spawn the scheduler and uploader on the current runtime.
    ///
    /// The first sample is taken immediately.
    ///
    /// # Errors
    ///
    /// [`MonitorError::ConfigInvalid`] if the config fails validation, or
    /// [`MonitorError::Other`] when called outside a Tokio runtime.
    pub fn start(self, config: Config) -> Result<PipelineHandle> {
        config.validate()?;

        let runtime = Handle::try_current()
            .map_err(|e| MonitorError::other(format!("No Tokio runtime: {}", e)))?;

        log::info!(
            "Starting pipeline: every {}s, {} director{}, sink {}",
            config.interval_seconds,
            config.directories.len(),
            if config.directories.len() == 1 { "y" } else { "ies" },
            self.sink.name()
        );

        let queue = Arc::new(DeliveryQueue::new(
            config.delivery.queue_capacity,
            self.status.clone(),
        ));
        let config = SharedConfig::new(config);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        let uploader = SheetUploader::new(
            queue.clone(),
            self.sink.clone(),
            config.clone(),
            self.status.clone(),
        );
        let uploader = runtime.spawn(uploader.run());

        let scheduler = scheduler::Scheduler {
            collector: self.collector,
            scanner: FileScanner::new(),
            queue: queue.clone(),
            sink: self.sink,
            config: config.clone(),
            status: self.status.clone(),
            next_sequence_id: 1,
        };

        self.status.set_state(RunState::Running);
        runtime.spawn(scheduler.run(control_rx, uploader));

        Ok(PipelineHandle {
            control: control_tx,
            status: self.status,
            queue,
            config,
        })
    }
}

/// Controls a running pipeline.
///
/// Clones share the same pipeline. Dropping the last handle shuts it down with
/// the configured drain timeout.
#[derive(Clone)]
pub struct PipelineHandle {
    control: mpsc::Sender<ControlSignal>,
    status: Arc<StatusBoard>,
    queue: Arc<DeliveryQueue>,
    config: SharedConfig,
}

impl PipelineHandle {
    /// Stop sampling; ticks keep their schedule but produce nothing. No-op if paused.
    pub async fn pause(&self) -> Result<RunState> {
        let (ack, rx) = oneshot::channel();
        self.send(ControlSignal::Pause { ack }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn resume(&self) -> Result<RunState> {
        let (ack, rx) = oneshot::channel();
        self.send(ControlSignal::Resume { ack }).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Replace the active config between ticks.
    ///
    /// An invalid config is rejected and the current one stays active.
    pub async fn reload(&self, config: Config) -> Result<()> {
        config.validate()?;
        let (ack, rx) = oneshot::channel();
        self.send(ControlSignal::Reload {
            config: Box::new(config),
            ack,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    /// Stop ticking, give the uploader `drain_timeout` to flush the queue and
    /// return the final status.
    pub async fn shutdown(self, drain_timeout: Duration) -> StatusSnapshot {
        let (done, rx) = oneshot::channel();
        let signal = ControlSignal::Shutdown {
            drain_timeout,
            done,
        };

        if self.control.send(signal).await.is_err() {
            return self.status();
        }

        match rx.await {
            Ok(snapshot) => snapshot,
            Err(_) => self.status(),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot(self.queue.len())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.status.subscribe()
    }

    /// The config snapshot currently in effect
    pub fn config(&self) -> Arc<Config> {
        self.config.snapshot()
    }

    async fn send(&self, signal: ControlSignal) -> Result<()> {
        self.control.send(signal).await.map_err(|_| stopped())
    }
}

fn stopped() -> MonitorError {
    MonitorError::other("pipeline has stopped")
}
