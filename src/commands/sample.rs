use anyhow::{Context, Result};
use chrono::Utc;
use clap::ArgMatches;

use crate::core::sample::{Sample, SheetRow};
use crate::core::system_monitor::{MetricsCollector, SysinfoSource};
use crate::core::FileScanner;
use crate::ui::format_directory_stats;

/// Collect a single sample and print it
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let (config, _) = super::load_validated(matches)?;

    let mut collector = MetricsCollector::new(Box::new(SysinfoSource::primed()));
    let reading = collector.collect()?;

    let directory_stats = if config.monitor_directories {
        FileScanner::new().scan_all(&config.directories)
    } else {
        Vec::new()
    };

    let sample = Sample {
        sequence_id: 1,
        timestamp: Utc::now(),
        cpu_percent: reading.cpu_percent,
        ram_percent: reading.ram_percent,
        net_bytes_sent_delta: reading.net_bytes_sent_delta,
        net_bytes_recv_delta: reading.net_bytes_recv_delta,
        directory_stats,
    };

    if matches.get_flag("row") {
        let row = SheetRow::from(&sample);
        println!("{}", serde_json::to_string(&row.values)?);
        return Ok(());
    }

    if matches.get_flag("human") {
        println!("CPU: {:.1}%", sample.cpu_percent);
        println!("RAM: {:.1}%", sample.ram_percent);
        if !sample.directory_stats.is_empty() {
            format_directory_stats(&sample.directory_stats);
        }
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&sample).context("Failed to serialize sample")?;
    println!("{}", json);
    Ok(())
}
