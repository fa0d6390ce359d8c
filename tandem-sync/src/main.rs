//! Tandem simulator (tandem-sim) - Main entry point
//!
//! Runs a scripted session of the synchronization engine against the
//! simulated pipelines and prints every engine event as a JSON line on
//! stdout. Logs go to stderr, or to `[logging] file` when configured.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tandem_common::SyncConfig;
use tandem_sync::clock::{HostClock, MonotonicClock};
use tandem_sync::pipeline::{
    AudioFormat, MediaItem, MediaSourceLoader, SimAudioPipeline, SimLoader, SimVisualPipeline, SymphoniaLoader,
};
use tandem_sync::{Collaborators, SyncEngine};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for tandem-sim
#[derive(Parser, Debug)]
#[command(name = "tandem-sim")]
#[command(about = "Run the A/V synchronization engine against simulated pipelines")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,

    /// Length of the simulated item; also how long the simulation runs
    #[arg(long, default_value = "10")]
    duration_secs: f64,

    /// Sample rate of the simulated audio asset
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Number of initial asset loads that fail
    #[arg(long, default_value = "0")]
    fail_loads: u32,

    /// Seek here one second into the run
    #[arg(long)]
    seek_to: Option<f64>,

    /// Probe this audio file with symphonia instead of simulating the asset
    #[arg(long)]
    audio_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SyncConfig::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "tandem_sync={level},tandem_common={level},tandem_sim={level}",
        level = config.logging.level
    );
    let log_file = open_log_file(config.logging.file.as_deref())?;
    let stderr_layer = log_file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    info!(
        "Starting tandem-sim {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
    let visual = Arc::new(SimVisualPipeline::new(Arc::clone(&clock)));
    let audio = Arc::new(SimAudioPipeline::new(Arc::clone(&clock)));

    let (loader, audio_url): (Arc<dyn MediaSourceLoader>, String) = match &args.audio_file {
        Some(path) => {
            let symphonia_loader: Arc<dyn MediaSourceLoader> = Arc::new(SymphoniaLoader::new());
            (symphonia_loader, path.to_string_lossy().to_string())
        }
        None => {
            let sim_loader = SimLoader::new(AudioFormat {
                sample_rate: args.sample_rate,
                channels: 2,
                total_samples: (args.duration_secs.max(0.0) * args.sample_rate as f64).round() as u64,
            });
            sim_loader.fail_next(args.fail_loads);
            let sim_loader: Arc<dyn MediaSourceLoader> = Arc::new(sim_loader);
            (sim_loader, "sim://audio".to_string())
        }
    };

    let engine = SyncEngine::new(
        config,
        Collaborators {
            clock,
            visual,
            audio,
            loader,
        },
    )
    .context("Failed to initialize sync engine")?;

    let events = engine.handle().event_stream();
    let printer = tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }
    });

    let (handle, engine_task) = engine.spawn();

    let item = MediaItem::new("simulated item", "sim://visual", audio_url);
    handle.play(item).context("Engine stopped before play")?;

    let script = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(position) = args.seek_to {
            handle.seek(position)?;
        }
        tokio::time::sleep(Duration::from_secs_f64((args.duration_secs - 1.0).max(0.0))).await;
        Ok::<(), tandem_sync::Error>(())
    };

    tokio::select! {
        result = script => result.context("Engine stopped during the scripted session")?,
        _ = shutdown_signal() => {}
    }

    match handle.measure_drift().await {
        Ok(Some(sample)) => info!("Final drift: {:.2}ms", sample.drift_ms()),
        Ok(None) => info!("Final drift: audio not playing"),
        Err(e) => warn!("Drift query failed: {}", e),
    }
    let status = handle.status().await;
    info!("Final status: {:?}", status);

    handle.shutdown().context("Engine already stopped")?;
    engine_task.await.context("Engine task panicked")?;
    drop(handle);
    printer.await.context("Event printer panicked")?;

    info!("Simulation complete");
    Ok(())
}

/// Open the configured log file for appending, creating parent directories
fn open_log_file(path: Option<&Path>) -> Result<Option<File>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(Some(file))
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
