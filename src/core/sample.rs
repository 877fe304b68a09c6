//! The record produced once per tick and its spreadsheet row form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Size and file count of one monitored directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStats {
    pub path: PathBuf,
    pub total_size_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectoryStats {
    pub fn failed(path: PathBuf, error: String) -> Self {
        Self {
            path,
            total_size_bytes: 0,
            file_count: 0,
            dir_count: 0,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One sampling result. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sequence_id: u64,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub net_bytes_sent_delta: u64,
    pub net_bytes_recv_delta: u64,
    pub directory_stats: Vec<DirectoryStats>,
}

/// A single row appended to the sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub sequence_id: u64,
    pub values: Vec<Value>,
}

impl SheetRow {
    /// Column titles written when a worksheet is created
    pub const HEADERS: [&'static str; 7] = [
        "Sequence",
        "Timestamp (UTC)",
        "CPU (%)",
        "RAM (%)",
        "Net Sent (bytes)",
        "Net Received (bytes)",
        "Directories",
    ];

    pub fn header_values() -> Vec<Value> {
        Self::HEADERS.iter().map(|h| Value::from(*h)).collect()
    }
}

impl From<&Sample> for SheetRow {
    fn from(sample: &Sample) -> Self {
        // Serializing a Vec of plain structs cannot fail
        let directories =
            serde_json::to_string(&sample.directory_stats).unwrap_or_else(|_| "[]".to_string());

        Self {
            sequence_id: sample.sequence_id,
            values: vec![
                Value::from(sample.sequence_id),
                Value::from(sample.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                Value::from(round2(sample.cpu_percent)),
                Value::from(round2(sample.ram_percent)),
                Value::from(sample.net_bytes_sent_delta),
                Value::from(sample.net_bytes_recv_delta),
                Value::from(directories),
            ],
        }
    }
}

fn round2(value: f32) -> f64 {
    (f64::from(value) * 100.0).round() / 100.0
}
