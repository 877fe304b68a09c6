//! Bounded FIFO between the scheduler (producer) and the uploader (consumer).
//!
//! The uploader takes a *lease* on the oldest entries instead of popping them,
//! so a batch that is being retried still counts toward the capacity. When the
//! queue is full the oldest entry outside the lease is evicted.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

use super::status::StatusBoard;
use crate::core::sample::Sample;

#[derive(Debug)]
struct Inner {
    entries: VecDeque<Arc<Sample>>,
    /// Number of front entries handed out in the current lease
    leased: usize,
    /// Effective bound, never below `leased + 1`
    capacity: usize,
    /// Capacity asked for by the last reload, applied once the lease resolves
    requested: usize,
    closed: bool,
}

impl Inner {
    /// Evict the oldest entry not covered by the lease
    fn evict_one(&mut self) -> Option<Arc<Sample>> {
        if self.entries.len() > self.leased {
            self.entries.remove(self.leased)
        } else {
            None
        }
    }

    /// Evict unleased entries until the queue fits its capacity
    fn shrink_to_capacity(&mut self) -> Vec<Arc<Sample>> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_one() {
                Some(sample) => evicted.push(sample),
                None => break,
            }
        }
        evicted
    }
}

/// Samples handed to the consumer; resolved with [`DeliveryQueue::commit`]
#[derive(Debug)]
pub struct Lease {
    samples: Vec<Arc<Sample>>,
}

impl Lease {
    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Single-producer, single-consumer bounded sample queue
#[derive(Debug)]
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    status: Arc<StatusBoard>,
}

impl DeliveryQueue {
    pub fn new(capacity: usize, status: Arc<StatusBoard>) -> Self {
        let capacity = capacity.max(2);
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                leased: 0,
                capacity,
                requested: capacity,
                closed: false,
            }),
            notify: Notify::new(),
            status,
        }
    }

    /// Enqueue a sample, evicting the oldest unleased one when full.
    ///
    /// Returns the evicted sample, if any. Never blocks. Samples pushed
    /// after [`close`](Self::close) are rejected and returned as-is.
    pub fn push(&self, sample: Sample) -> Option<Arc<Sample>> {
        let evicted = {
            let mut inner = self.inner.lock();
            if inner.closed {
                log::warn!("Queue closed, discarding sample {}", sample.sequence_id);
                return Some(Arc::new(sample));
            }

            let evicted = if inner.entries.len() >= inner.capacity {
                inner.evict_one()
            } else {
                None
            };
            inner.entries.push_back(Arc::new(sample));
            evicted
        };

        if let Some(old) = &evicted {
            log::warn!("Delivery queue full, evicted sample {}", old.sequence_id);
            self.status.record_evicted(old.sequence_id);
        }

        self.notify.notify_one();
        evicted
    }

    /// Wait for samples and lease up to `max` of the oldest.
    ///
    /// The lease is capped at `capacity - 1` so the producer can always evict.
    /// Returns `None` once the queue is closed and empty.
    pub async fn lease(&self, max: usize) -> Option<Lease> {
        loop {
            {
                let mut inner = self.inner.lock();
                debug_assert_eq!(inner.leased, 0, "previous lease not committed");

                if !inner.entries.is_empty() {
                    let count = max.max(1).min(inner.capacity - 1).min(inner.entries.len());
                    inner.leased = count;
                    let samples = inner.entries.iter().take(count).cloned().collect();
                    return Some(Lease { samples });
                }

                if inner.closed {
                    return None;
                }
            }

            self.notify.notified().await;
        }
    }

    /// Remove the leased samples from the queue.
    ///
    /// A capacity reduction deferred by [`set_capacity`](Self::set_capacity)
    /// takes effect here.
    pub fn commit(&self, lease: Lease) {
        let evicted = {
            let mut inner = self.inner.lock();
            let count = lease.len().min(inner.leased);
            inner.entries.drain(..count);
            inner.leased = 0;

            if inner.capacity != inner.requested {
                log::info!("Delivery queue capacity now {}", inner.requested);
                inner.capacity = inner.requested;
            }
            inner.shrink_to_capacity()
        };

        self.record_shrink_evictions(evicted);
    }

    /// Stop accepting samples and wake the consumer so it can drain
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }

    /// Drop everything still queued, including an uncommitted lease.
    pub fn discard_remaining(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.leased = 0;
        count
    }

    /// Change the capacity, evicting the oldest unleased samples if it shrinks.
    ///
    /// Leased samples are never evicted, so while a lease is out the capacity
    /// is held at `leased + 1` and the requested value applies on commit.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(2);
        let evicted = {
            let mut inner = self.inner.lock();
            inner.requested = capacity;
            inner.capacity = capacity.max(inner.leased + 1);
            if inner.capacity > capacity {
                log::warn!(
                    "Delivery queue held at {} until {} in-flight sample(s) resolve (requested {})",
                    inner.capacity,
                    inner.leased,
                    capacity
                );
            }
            inner.shrink_to_capacity()
        };

        self.record_shrink_evictions(evicted);
    }

    fn record_shrink_evictions(&self, evicted: Vec<Arc<Sample>>) {
        for sample in evicted {
            log::warn!("Queue shrunk, evicted sample {}", sample.sequence_id);
            self.status.record_evicted(sample.sequence_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}
