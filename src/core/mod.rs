// Core monitoring logic

pub mod config;
pub mod file_scanner;
pub mod pipeline;
pub mod sample;
pub mod sink;
pub mod system_monitor;

// Re-export commonly used items
pub use config::{Config, SharedConfig};
pub use file_scanner::FileScanner;
pub use sample::{DirectoryStats, Sample, SheetRow};
