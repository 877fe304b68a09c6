use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::sink::GoogleSheetsSink;

/// Validate the config and test the spreadsheet connection
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let (config, path) = super::load_validated(matches)?;
    config
        .validate_sink()
        .with_context(|| format!("Config file: {:?}", path))?;

    println!("{}", "Configuration is valid".green());
    println!("Connecting to Google Sheets...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let sink = GoogleSheetsSink::new(config.sink.clone());
    let info = runtime
        .block_on(sink.check())
        .context("Connection test failed")?;

    println!("  Spreadsheet: {} ({})", info.title.bold(), info.spreadsheet_id.dimmed());
    println!("  Worksheets: {}", info.worksheets.join(", "));

    if info.worksheet_present {
        println!(
            "{}",
            format!("Worksheet {:?} found", config.sink.worksheet_name).green()
        );
    } else {
        println!(
            "{}",
            format!(
                "Worksheet {:?} not found; it will be created on the first upload",
                config.sink.worksheet_name
            )
            .yellow()
        );
    }

    Ok(())
}
