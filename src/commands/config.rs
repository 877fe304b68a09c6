use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::config_path;
use crate::core::Config;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let path = config_path(matches)?;

    match matches.subcommand() {
        Some(("path", _)) => {
            println!("{}", path.display());
            Ok(())
        }
        Some(("show", _)) => show(&path),
        Some(("init", sub_matches)) => init(&path, sub_matches.get_flag("force")),
        Some(("add-dir", sub_matches)) => add_directory(&path, sub_matches),
        Some(("remove-dir", sub_matches)) => remove_directory(&path, sub_matches),
        Some(("set-interval", sub_matches)) => set_interval(&path, sub_matches),
        _ => {
            println!("Use 'sheetmon config --help' for more information.");
            Ok(())
        }
    }
}

fn show(path: &Path) -> Result<()> {
    let config = Config::load_from(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Err(e) = config.validate() {
        println!();
        println!("{}", format!("⚠️  {}", e).yellow());
    }

    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {:?} (use --force to overwrite)",
            path
        );
    }

    Config::default().save_to(path)?;

    println!(
        "{} {}",
        "✓ Default config written to:".green(),
        path.display()
    );
    println!(
        "{}",
        "Set sink.credentials_ref and sink.destination_id before running.".dimmed()
    );
    Ok(())
}

fn add_directory(path: &Path, matches: &ArgMatches) -> Result<()> {
    let dir = matches
        .get_one::<PathBuf>("path")
        .context("Path argument is required")?;

    let dir = if dir.exists() {
        dir.canonicalize()
            .with_context(|| format!("Failed to resolve path: {:?}", dir))?
    } else {
        println!(
            "{}",
            format!("⚠️  Warning: Path '{}' does not exist", dir.display()).yellow()
        );
        println!(
            "{}",
            "It will be reported as an error in every sample until created.".dimmed()
        );
        dir.clone()
    };

    let mut config = Config::load_from(path)?;
    if !config.add_directory(dir.clone()) {
        println!(
            "{}",
            format!("Already monitoring {}", dir.display()).yellow()
        );
        return Ok(());
    }
    config.save_to(path)?;

    println!("{} {}", "✓ Now monitoring:".green(), dir.display());
    Ok(())
}

fn remove_directory(path: &Path, matches: &ArgMatches) -> Result<()> {
    let dir = matches
        .get_one::<PathBuf>("path")
        .context("Path argument is required")?;

    let mut config = Config::load_from(path)?;
    let mut removed = config.remove_directory(dir);
    if !removed {
        if let Ok(canonical) = dir.canonicalize() {
            removed = config.remove_directory(&canonical);
        }
    }

    if !removed {
        bail!("{:?} is not a monitored directory", dir);
    }
    config.save_to(path)?;

    println!("{} {}", "✓ Stopped monitoring:".green(), dir.display());
    Ok(())
}

fn set_interval(path: &Path, matches: &ArgMatches) -> Result<()> {
    let seconds = *matches
        .get_one::<u64>("seconds")
        .context("Interval argument is required")?;

    if seconds == 0 {
        bail!("Interval must be at least one second");
    }

    let mut config = Config::load_from(path)?;
    config.interval_seconds = seconds;
    config.save_to(path)?;

    println!("{} {}s", "✓ Sampling interval set to".green(), seconds);
    Ok(())
}
