use serde::{Deserialize, Serialize};

/// Cumulative byte counters of one network interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub sent_total: u64,
    pub recv_total: u64,
}

impl InterfaceCounters {
    pub fn new(name: impl Into<String>, sent_total: u64, recv_total: u64) -> Self {
        Self {
            name: name.into(),
            sent_total,
            recv_total,
        }
    }
}

/// Values as read from the OS, network counters cumulative since boot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub interfaces: Vec<InterfaceCounters>,
}

/// One collector result, network counters converted to per-tick deltas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReading {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub net_bytes_sent_delta: u64,
    pub net_bytes_recv_delta: u64,
}
