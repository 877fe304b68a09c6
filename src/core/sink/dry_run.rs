use async_trait::async_trait;
use std::io::Write;

use super::{SheetSink, SinkError};
use crate::core::sample::SheetRow;

/// Prints each row as a JSON line instead of delivering it
#[derive(Debug, Default)]
pub struct DryRunSink;

impl DryRunSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SheetSink for DryRunSink {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn append(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for row in rows {
            let line = serde_json::to_string(&row.values)
                .map_err(|e| SinkError::fatal(format!("Failed to encode row: {}", e)))?;
            writeln!(out, "{}", line)
                .map_err(|e| SinkError::transient(format!("stdout: {}", e), false))?;
        }
        Ok(())
    }
}
