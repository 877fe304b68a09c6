//! Remote destinations for sample rows.
//!
//! A [`SheetSink`] appends a batch of [`SheetRow`]s and reports failures as
//! either retryable or not. Built-in sinks are Google Sheets and a dry-run
//! sink that prints rows to stdout.

mod dry_run;
pub mod google_sheets;
#[cfg(test)]
mod stub_server;

pub use dry_run::DryRunSink;
pub use google_sheets::GoogleSheetsSink;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::SinkConfig;
use crate::core::sample::SheetRow;
use crate::error::MonitorError;

/// Failure of a single append attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Worth retrying. `maybe_applied` is set when the sink may have stored
    /// the rows despite the failure (timeouts, 5xx), so a retry can duplicate them.
    #[error("{message}")]
    Transient { message: String, maybe_applied: bool },

    /// Credentials, permissions or a rejected request; retrying will not help
    #[error("{0}")]
    Fatal(String),
}

impl SinkError {
    pub fn transient<S: Into<String>>(message: S, maybe_applied: bool) -> Self {
        SinkError::Transient {
            message: message.into(),
            maybe_applied,
        }
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        SinkError::Fatal(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient { .. })
    }

    pub fn maybe_applied(&self) -> bool {
        matches!(
            self,
            SinkError::Transient {
                maybe_applied: true,
                ..
            }
        )
    }
}

impl From<SinkError> for MonitorError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Transient { message, .. } => MonitorError::DeliveryTransient(message),
            SinkError::Fatal(message) => MonitorError::DeliveryFatal(message),
        }
    }
}

/// A destination that accepts appended rows.
///
/// Each row carries its `sequence_id`; whether the sink discards rows it has
/// already stored is declared through `DeliverySemantics` in the config.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Sink name used in logs (e.g. `"google-sheets"`)
    fn name(&self) -> &str;

    /// Append a batch of rows in order.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Transient`] for failures worth retrying and
    /// [`SinkError::Fatal`] for everything else.
    async fn append(&self, rows: &[SheetRow]) -> Result<(), SinkError>;

    /// Called when a reloaded config changes the sink settings
    fn reconfigure(&self, _config: &SinkConfig) {}
}
