//! Run the monitoring pipeline in the foreground.
//!
//! Pipeline events are printed as they happen, standing in for desktop
//! notifications. On Unix, `SIGHUP` reloads the config file and `SIGUSR1`
//! toggles pause/resume.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::core::pipeline::{Pipeline, PipelineEvent, PipelineHandle, RunState};
use crate::core::sink::{DryRunSink, GoogleSheetsSink, SheetSink};
use crate::core::system_monitor::SysinfoSource;
use crate::core::Config;
use crate::ui::format_status;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let (config, path) = super::load_validated(matches)?;
    let dry_run = matches.get_flag("dry-run");

    if !dry_run {
        config
            .validate_sink()
            .with_context(|| format!("Config file: {:?}", path))?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("sheetmon-worker")
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run_pipeline(config, path, dry_run))
}

async fn run_pipeline(config: Config, path: PathBuf, dry_run: bool) -> Result<()> {
    let sink: Arc<dyn SheetSink> = if dry_run {
        Arc::new(DryRunSink::new())
    } else {
        Arc::new(GoogleSheetsSink::new(config.sink.clone()))
    };

    let source = tokio::task::spawn_blocking(SysinfoSource::primed)
        .await
        .context("Failed to initialize metrics source")?;

    let handle = Pipeline::new(Box::new(source), sink).start(config)?;
    let notifier = tokio::spawn(print_events(handle.subscribe()));

    println!(
        "{}",
        format!(
            "Monitoring every {}s. Press Ctrl+C to stop.",
            handle.config().interval_seconds
        )
        .green()
    );

    wait_for_signals(&handle, &path).await?;

    println!("{}", "Shutting down...".dimmed());
    let drain_timeout = handle.config().drain_timeout();
    let status = handle.shutdown(drain_timeout).await;
    notifier.abort();

    format_status(&status);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals(handle: &PipelineHandle, path: &Path) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    let mut user1 =
        signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                return Ok(());
            }
            _ = hangup.recv() => reload_from_disk(handle, path).await,
            _ = user1.recv() => toggle_pause(handle).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_handle: &PipelineHandle, _path: &Path) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}

/// Re-read the config file; an invalid file leaves the running config alone
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload_from_disk(handle: &PipelineHandle, path: &Path) {
    log::info!("Reloading configuration from {:?}", path);

    let config = match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Reload failed: {:#}", e);
            return;
        }
    };

    if let Err(e) = handle.reload(config).await {
        log::error!("Reload rejected: {}", e);
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn toggle_pause(handle: &PipelineHandle) {
    let result = match handle.status().state {
        RunState::Paused => handle.resume().await,
        _ => handle.pause().await,
    };

    if let Err(e) = result {
        log::warn!("Could not toggle pause: {}", e);
    }
}

async fn print_events(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(missed)) => {
                log::warn!("Missed {} pipeline event(s)", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StateChanged { state } => {
            println!("{}", format!("Monitoring {}", state).cyan());
        }
        PipelineEvent::DeliveryFatal { error, dropped } => {
            println!(
                "{}",
                format!("Upload failed, {} sample(s) dropped: {}", dropped, error).red()
            );
        }
        PipelineEvent::RetryExhausted { error, dropped, .. } => {
            println!(
                "{}",
                format!("Upload gave up, {} sample(s) dropped: {}", dropped, error).red()
            );
        }
        PipelineEvent::SamplesLost { count } => {
            println!("{}", format!("{} sample(s) were never uploaded", count).red());
        }
        PipelineEvent::ConfigReloaded => {
            println!("{}", "Configuration reloaded".green());
        }
        PipelineEvent::TickSkipped { .. }
        | PipelineEvent::SampleEvicted { .. }
        | PipelineEvent::BatchDelivered { .. } => {
            log::trace!("{:?}", event);
        }
    }
}
