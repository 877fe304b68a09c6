//! Host metrics collection.
//!
//! A [`MetricsSource`] reads raw OS values; the [`MetricsCollector`] owns the
//! network counter baseline and turns cumulative counters into per-tick deltas.

mod collector;
mod metrics;
mod source;

pub use collector::{MetricsCollector, NetCounters};
pub use metrics::{InterfaceCounters, MetricsReading, RawReading};
pub use source::{MetricsSource, SysinfoSource};
