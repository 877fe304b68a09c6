// Command handlers module
pub mod check;
pub mod config;
pub mod run;
pub mod sample;

// Re-exports for cleaner imports
pub use check::execute as check;
pub use run::execute as run;
pub use sample::execute as sample;

use anyhow::{Context, Result};
use clap::ArgMatches;
use std::path::PathBuf;

use crate::core::Config;

/// Config file chosen with `--config`, or the default location
pub fn config_path(matches: &ArgMatches) -> Result<PathBuf> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(path.clone()),
        None => Config::default_path(),
    }
}

/// Load the config file and check it can drive the pipeline
fn load_validated(matches: &ArgMatches) -> Result<(Config, PathBuf)> {
    let path = config_path(matches)?;
    let config = Config::load_from(&path)?;
    config
        .validate()
        .with_context(|| format!("Config file: {:?}", path))?;
    Ok((config, path))
}
