use chrono::{DateTime, Local, Utc};
use colored::Colorize;

use crate::core::pipeline::{RunState, StatusSnapshot};
use crate::core::sample::DirectoryStats;

/// Format a byte count in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a UTC timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "never".to_string(),
    }
}

fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.len()));
}

/// Label/value pairs shown by [`format_status`]
pub fn status_lines(status: &StatusSnapshot) -> Vec<(&'static str, String)> {
    let mut lines = vec![
        ("State", status.state.to_string()),
        ("Last delivery", format_time(status.last_delivery)),
        ("Last sequence id", status.last_sequence_id.to_string()),
        ("Delivered samples", status.delivered_samples.to_string()),
        ("Dropped samples", status.dropped_samples.to_string()),
        ("Queued samples", status.queued_samples.to_string()),
        ("Skipped ticks", status.skipped_ticks.to_string()),
    ];

    if status.lost_on_shutdown > 0 {
        lines.push(("Lost at shutdown", status.lost_on_shutdown.to_string()));
    }
    if status.possible_duplicate_rows > 0 {
        lines.push((
            "Possible duplicate rows",
            status.possible_duplicate_rows.to_string(),
        ));
    }
    if let Some(error) = &status.last_fatal_error {
        lines.push(("Last delivery error", error.clone()));
    }

    lines
}

/// Print the pipeline status
pub fn format_status(status: &StatusSnapshot) {
    print_section_header("Pipeline Status");

    for (label, value) in status_lines(status) {
        let value = match label {
            "State" => match status.state {
                RunState::Running => value.green(),
                RunState::Paused | RunState::ShuttingDown => value.yellow(),
                RunState::Idle | RunState::Stopped => value.normal(),
            },
            "Dropped samples" if status.dropped_samples > 0 => value.yellow(),
            "Lost at shutdown" | "Last delivery error" => value.red(),
            _ => value.normal(),
        };
        println!("  {}: {}", label, value);
    }

    println!();
}

/// Print one line per monitored directory
pub fn format_directory_stats(stats: &[DirectoryStats]) {
    print_section_header("Directories");

    for entry in stats {
        match &entry.error {
            None => println!(
                "  {} {} ({} files, {} dirs)",
                entry.path.display().to_string().cyan(),
                format_size(entry.total_size_bytes),
                entry.file_count,
                entry.dir_count
            ),
            Some(error) => println!(
                "  {} {}",
                entry.path.display().to_string().cyan(),
                error.red()
            ),
        }
    }
}
