use std::collections::HashMap;

use crate::error::Result;

use super::metrics::{InterfaceCounters, MetricsReading, RawReading};
use super::source::MetricsSource;

/// Previous cumulative counters per interface, used to derive per-tick deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetCounters {
    /// `(sent, recv)` keyed by interface name
    last: HashMap<String, (u64, u64)>,
}

impl NetCounters {
    /// Feed the current per-interface counters, returning the summed
    /// `(sent_delta, recv_delta)`.
    ///
    /// An interface seen for the first time only establishes its baseline, and
    /// one that vanished is forgotten. A counter that went backwards (NIC reset,
    /// wraparound) yields zero and becomes the new baseline.
    pub fn advance(&mut self, interfaces: &[InterfaceCounters]) -> (u64, u64) {
        let mut next = HashMap::with_capacity(interfaces.len());
        let (mut sent, mut recv) = (0u64, 0u64);

        for iface in interfaces {
            match self.last.get(&iface.name) {
                Some(&(last_sent, last_recv)) => {
                    sent = sent.saturating_add(counter_delta(&iface.name, last_sent, iface.sent_total));
                    recv = recv.saturating_add(counter_delta(&iface.name, last_recv, iface.recv_total));
                }
                None if !self.last.is_empty() => {
                    log::debug!("Network interface {} appeared", iface.name);
                }
                None => {}
            }
            next.insert(iface.name.clone(), (iface.sent_total, iface.recv_total));
        }

        for name in self.last.keys().filter(|name| !next.contains_key(*name)) {
            log::debug!("Network interface {} disappeared", name);
        }

        self.last = next;
        (sent, recv)
    }
}

fn counter_delta(interface: &str, previous: u64, current: u64) -> u64 {
    if current < previous {
        log::debug!(
            "Network counter of {} went backwards ({} -> {}), rebaselining",
            interface,
            previous,
            current
        );
    }
    current.saturating_sub(previous)
}

/// Produces one [`MetricsReading`] per call from a [`MetricsSource`]
pub struct MetricsCollector {
    source: Box<dyn MetricsSource>,
    counters: NetCounters,
}

impl MetricsCollector {
    pub fn new(source: Box<dyn MetricsSource>) -> Self {
        Self {
            source,
            counters: NetCounters::default(),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Read the source and convert cumulative counters to deltas.
    ///
    /// A failed read leaves the network baseline untouched.
    pub fn collect(&mut self) -> Result<MetricsReading> {
        let RawReading {
            cpu_percent,
            ram_percent,
            interfaces,
        } = self.source.read()?;

        let (net_bytes_sent_delta, net_bytes_recv_delta) = self.counters.advance(&interfaces);

        Ok(MetricsReading {
            cpu_percent: clamp_percent(cpu_percent),
            ram_percent: clamp_percent(ram_percent),
            net_bytes_sent_delta,
            net_bytes_recv_delta,
        })
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
