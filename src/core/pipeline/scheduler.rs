//! Tick loop that produces samples and reacts to control signals.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Instant, Interval, MissedTickBehavior};

use super::queue::DeliveryQueue;
use super::status::{PipelineEvent, RunState, StatusBoard, StatusSnapshot};
use crate::core::config::{Config, SharedConfig};
use crate::core::file_scanner::FileScanner;
use crate::core::sample::Sample;
use crate::core::sink::SheetSink;
use crate::core::system_monitor::MetricsCollector;

/// Signals sent from a [`PipelineHandle`](super::PipelineHandle) to the scheduler
#[derive(Debug)]
pub enum ControlSignal {
    Pause {
        ack: oneshot::Sender<RunState>,
    },
    Resume {
        ack: oneshot::Sender<RunState>,
    },
    /// Already validated by the sender
    Reload {
        config: Box<Config>,
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        drain_timeout: Duration,
        done: oneshot::Sender<StatusSnapshot>,
    },
}

pub(super) struct Scheduler {
    pub(super) collector: MetricsCollector,
    pub(super) scanner: FileScanner,
    pub(super) queue: Arc<DeliveryQueue>,
    pub(super) sink: Arc<dyn SheetSink>,
    pub(super) config: SharedConfig,
    pub(super) status: Arc<StatusBoard>,
    /// Id for the next produced sample
    pub(super) next_sequence_id: u64,
}

impl Scheduler {
    /// Run until a shutdown signal arrives or every handle is dropped
    pub(super) async fn run(
        mut self,
        mut control: mpsc::Receiver<ControlSignal>,
        uploader: JoinHandle<()>,
    ) {
        let mut ticker = new_ticker(self.config.snapshot().interval(), true);

        let (drain_timeout, done) = loop {
            tokio::select! {
                biased;

                signal = control.recv() => match signal {
                    Some(ControlSignal::Pause { ack }) => {
                        if self.status.state() == RunState::Running {
                            self.status.set_state(RunState::Paused);
                        }
                        let _ = ack.send(self.status.state());
                    }
                    Some(ControlSignal::Resume { ack }) => {
                        if self.status.state() == RunState::Paused {
                            self.status.set_state(RunState::Running);
                        }
                        let _ = ack.send(self.status.state());
                    }
                    Some(ControlSignal::Reload { config, ack }) => {
                        self.reload(*config, &mut ticker);
                        let _ = ack.send(());
                    }
                    Some(ControlSignal::Shutdown { drain_timeout, done }) => {
                        break (drain_timeout, Some(done));
                    }
                    None => {
                        log::info!("All pipeline handles dropped, shutting down");
                        break (self.config.snapshot().drain_timeout(), None);
                    }
                },

                _ = ticker.tick() => self.tick(),
            }
        };

        let snapshot = self.drain(uploader, drain_timeout).await;

        if let Some(done) = done {
            let _ = done.send(snapshot);
        }
    }

    /// Produce one sample, or skip the tick when paused or metrics are unavailable
    fn tick(&mut self) {
        if self.status.state() != RunState::Running {
            log::trace!("Tick while {}, not sampling", self.status.state());
            return;
        }

        let config = self.config.snapshot();

        let reading = match run_blocking(|| self.collector.collect()) {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("Skipping tick: {}", e);
                self.status.record_skipped_tick(e.to_string());
                return;
            }
        };

        let directory_stats = if config.monitor_directories {
            run_blocking(|| self.scanner.scan_all(&config.directories))
        } else {
            Vec::new()
        };

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;

        let sample = Sample {
            sequence_id,
            timestamp: Utc::now(),
            cpu_percent: reading.cpu_percent,
            ram_percent: reading.ram_percent,
            net_bytes_sent_delta: reading.net_bytes_sent_delta,
            net_bytes_recv_delta: reading.net_bytes_recv_delta,
            directory_stats,
        };

        log::debug!(
            "Sample {}: cpu {:.1}%, ram {:.1}%, net +{}/+{} bytes",
            sequence_id,
            sample.cpu_percent,
            sample.ram_percent,
            sample.net_bytes_sent_delta,
            sample.net_bytes_recv_delta
        );

        self.status.record_sample(sequence_id);
        self.queue.push(sample);
    }

    /// Swap in a validated config between ticks
    fn reload(&mut self, config: Config, ticker: &mut Interval) {
        let previous = self.config.replace(config);
        let current = self.config.snapshot();

        if previous.interval() != current.interval() {
            log::info!(
                "Sampling interval changed from {}s to {}s",
                previous.interval_seconds,
                current.interval_seconds
            );
            *ticker = new_ticker(current.interval(), false);
        }

        if previous.delivery.queue_capacity != current.delivery.queue_capacity {
            self.queue.set_capacity(current.delivery.queue_capacity);
        }

        if previous.sink != current.sink {
            self.sink.reconfigure(&current.sink);
        }

        log::info!("Configuration reloaded");
        self.status.emit(PipelineEvent::ConfigReloaded);
    }

    /// Let the uploader flush the queue, then discard what is left.
    ///
    /// Takes `self` by value since the collector is not `Sync`.
    async fn drain(self, mut uploader: JoinHandle<()>, drain_timeout: Duration) -> StatusSnapshot {
        self.status.set_state(RunState::ShuttingDown);
        self.queue.close();

        log::info!(
            "Draining {} queued sample(s) (timeout {:?})",
            self.queue.len(),
            drain_timeout
        );

        match timeout(drain_timeout, &mut uploader).await {
            Ok(Ok(())) => log::debug!("Uploader finished draining"),
            Ok(Err(e)) => log::error!("Uploader task failed: {}", e),
            Err(_) => {
                log::warn!("Drain timed out after {:?}, abandoning delivery", drain_timeout);
                uploader.abort();
                // Wait for the abort so the lease is not committed after the discard
                let _ = uploader.await;
            }
        }

        let lost = self.queue.discard_remaining() as u64;
        if lost > 0 {
            log::error!("{} sample(s) lost at shutdown", lost);
            self.status.record_lost(lost);
        }

        self.status.set_state(RunState::Stopped);
        self.status.snapshot(self.queue.len())
    }
}

/// Run synchronous OS or filesystem work, moving other tasks off this worker
/// first on a multi-thread runtime
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

/// Ticker that never bursts to catch up on missed ticks
fn new_ticker(period: Duration, immediate: bool) -> Interval {
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
