use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::{MonitorError, Result};

use super::metrics::{InterfaceCounters, RawReading};

/// Something that can report instantaneous CPU/RAM usage and cumulative
/// network counters.
pub trait MetricsSource: Send {
    fn name(&self) -> &str;

    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::MetricsUnavailable`] when the OS source cannot be read.
    fn read(&mut self) -> Result<RawReading>;
}

/// Reads metrics through `sysinfo`
pub struct SysinfoSource {
    system: System,
    networks: Networks,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());

        Self {
            system: System::new_with_specifics(refresh_kind),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Create a source whose first CPU reading is already meaningful.
    ///
    /// CPU usage is computed between two refreshes, so this blocks for
    /// `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`.
    pub fn primed() -> Self {
        let mut source = Self::new();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        source.system.refresh_cpu_usage();
        source
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoSource {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn read(&mut self) -> Result<RawReading> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);

        if self.system.cpus().is_empty() {
            return Err(MonitorError::metrics_unavailable("no CPUs reported"));
        }

        let total = self.system.total_memory();
        if total == 0 {
            return Err(MonitorError::metrics_unavailable("total memory reported as zero"));
        }
        let ram_percent = (self.system.used_memory() as f64 / total as f64 * 100.0) as f32;

        let interfaces = self
            .networks
            .iter()
            .map(|(name, data)| {
                InterfaceCounters::new(name.as_str(), data.total_transmitted(), data.total_received())
            })
            .collect();

        Ok(RawReading {
            cpu_percent: self.system.global_cpu_usage(),
            ram_percent,
            interfaces,
        })
    }
}
