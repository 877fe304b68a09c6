//! Run state, counters and events shared between the pipeline tasks and
//! whoever controls them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::ShuttingDown => "shutting down",
            RunState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Notable things that happened in the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        state: RunState,
    },
    TickSkipped {
        reason: String,
    },
    SampleEvicted {
        sequence_id: u64,
    },
    BatchDelivered {
        first_sequence_id: u64,
        last_sequence_id: u64,
        attempts: u32,
    },
    /// Non-retryable failure; the batch was dropped without retrying
    DeliveryFatal {
        error: String,
        dropped: u64,
    },
    /// Every allowed attempt failed transiently; the batch was dropped
    RetryExhausted {
        attempts: u32,
        error: String,
        dropped: u64,
    },
    ConfigReloaded,
    SamplesLost {
        count: u64,
    },
}

/// Point-in-time copy of the pipeline status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub last_delivery: Option<DateTime<Utc>>,
    pub last_sequence_id: u64,
    pub delivered_samples: u64,
    pub dropped_samples: u64,
    pub queued_samples: usize,
    pub skipped_ticks: u64,
    pub lost_on_shutdown: u64,
    pub possible_duplicate_rows: u64,
    pub last_fatal_error: Option<String>,
}

/// Shared status, written by the scheduler, queue and uploader.
///
/// Each counter has a single owner that increments it; readers only load.
#[derive(Debug)]
pub struct StatusBoard {
    state: RwLock<RunState>,
    last_delivery: RwLock<Option<DateTime<Utc>>>,
    last_fatal_error: RwLock<Option<String>>,
    last_sequence_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    skipped_ticks: AtomicU64,
    lost_on_shutdown: AtomicU64,
    possible_duplicates: AtomicU64,
    events: broadcast::Sender<PipelineEvent>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RunState::Idle),
            last_delivery: RwLock::new(None),
            last_fatal_error: RwLock::new(None),
            last_sequence_id: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            lost_on_shutdown: AtomicU64::new(0),
            possible_duplicates: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    pub fn set_state(&self, state: RunState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            log::info!("Pipeline {} -> {}", previous, state);
            self.emit(PipelineEvent::StateChanged { state });
        }
    }

    pub fn record_sample(&self, sequence_id: u64) {
        self.last_sequence_id.store(sequence_id, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self, reason: String) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
        self.emit(PipelineEvent::TickSkipped { reason });
    }

    pub fn record_evicted(&self, sequence_id: u64) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.emit(PipelineEvent::SampleEvicted { sequence_id });
    }

    pub fn record_delivered(&self, first: u64, last: u64, count: u64, attempts: u32) {
        self.delivered.fetch_add(count, Ordering::Relaxed);
        *self.last_delivery.write() = Some(Utc::now());
        self.emit(PipelineEvent::BatchDelivered {
            first_sequence_id: first,
            last_sequence_id: last,
            attempts,
        });
    }

    pub fn record_possible_duplicates(&self, rows: u64) {
        self.possible_duplicates.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_fatal(&self, error: String, dropped: u64) {
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
        *self.last_fatal_error.write() = Some(error.clone());
        self.emit(PipelineEvent::DeliveryFatal { error, dropped });
    }

    pub fn record_exhausted(&self, attempts: u32, error: String, dropped: u64) {
        self.dropped.fetch_add(dropped, Ordering::Relaxed);
        *self.last_fatal_error.write() = Some(error.clone());
        self.emit(PipelineEvent::RetryExhausted {
            attempts,
            error,
            dropped,
        });
    }

    pub fn record_lost(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.dropped.fetch_add(count, Ordering::Relaxed);
        self.lost_on_shutdown.fetch_add(count, Ordering::Relaxed);
        self.emit(PipelineEvent::SamplesLost { count });
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, queued_samples: usize) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            last_delivery: *self.last_delivery.read(),
            last_sequence_id: self.last_sequence_id.load(Ordering::Relaxed),
            delivered_samples: self.delivered.load(Ordering::Relaxed),
            dropped_samples: self.dropped.load(Ordering::Relaxed),
            queued_samples,
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            lost_on_shutdown: self.lost_on_shutdown.load(Ordering::Relaxed),
            possible_duplicate_rows: self.possible_duplicates.load(Ordering::Relaxed),
            last_fatal_error: self.last_fatal_error.read().clone(),
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
