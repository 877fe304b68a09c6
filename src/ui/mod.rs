// Terminal output formatting

pub mod formatters;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_directory_stats, format_size, format_status, format_time};
