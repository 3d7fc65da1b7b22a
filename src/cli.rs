// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running a scripted switchover demo
//! - Showing the configuration

use camera_handoff::backends::camera::DeviceDirectory;
use camera_handoff::backends::camera::synthetic::SyntheticBackend;
use camera_handoff::pipelines::switchover::{
    FrameConsumer, FrameEnvelope, Pipeline, PipelineEvent, SnapshotConsumer,
};
use camera_handoff::{AppError, AppResult, Config, SwitchError, SwitchOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default folder name for demo snapshots
const DEFAULT_SAVE_FOLDER: &str = "camera-handoff";

pub struct DemoOptions {
    pub switches: u32,
    pub interval_ms: u64,
    pub output: Option<PathBuf>,
    pub snapshot_every: Option<u32>,
    pub fail: bool,
    pub fade_out: bool,
}

/// List all available cameras
pub fn list_cameras() -> AppResult<()> {
    let cameras = SyntheticBackend::demo().enumerate();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        let marker = if camera.is_default { " (default)" } else { "" };
        println!("  [{}] {}{}", camera.id, camera.name, marker);

        // Sort by resolution (highest first)
        let mut formats = camera.formats.clone();
        formats.sort_by_key(|f| std::cmp::Reverse(f.area()));
        let format_strs: Vec<String> = formats.iter().map(ToString::to_string).collect();
        if !format_strs.is_empty() {
            println!("      Formats: {}", format_strs.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Print the effective configuration
pub fn print_config() -> AppResult<()> {
    let config = load_config();
    if let Ok(path) = Config::path() {
        println!("# {}", path.display());
    }
    let json = serde_json::to_string_pretty(&config).map_err(|e| AppError::Other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Switch between the synthetic cameras a few times
pub fn run_demo(options: DemoOptions) -> AppResult<()> {
    let mut config = load_config();
    if options.fade_out {
        config.fade_out_on_switch = true;
    }
    let snapshot_every = options.snapshot_every.unwrap_or(config.snapshot_every);
    let interval = Duration::from_millis(options.interval_ms);

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Other(format!("Failed to set Ctrl+C handler: {}", e)))?;

    let backend = SyntheticBackend::demo();
    let delivered = Arc::new(AtomicU64::new(0));
    let consumer = demo_consumer(options.output.clone(), snapshot_every, Arc::clone(&delivered));

    let rt = tokio::runtime::Runtime::new()?;
    let last_device = rt.block_on(async {
        let pipeline = Pipeline::spawn(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            consumer,
            &config,
        );
        let mut events = pipeline.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                print_event(&event);
            }
        });

        let start = Instant::now();
        let mut last_device = None;

        let first = match pipeline.switch_to(config.last_device_id.as_deref()).await {
            Err(SwitchError::DeviceNotFound(_)) if config.last_device_id.is_some() => {
                pipeline.switch_to(None).await
            }
            other => other,
        };
        match first {
            Ok(outcome) => {
                print_outcome(&outcome);
                last_device = Some(outcome.device.id.clone());
            }
            Err(e) => {
                pipeline.shutdown().await?;
                return Err::<_, AppError>(e.into());
            }
        }

        for round in 1..=options.switches {
            if wait(interval, &stop_flag).await {
                println!();
                println!("Stopping early...");
                break;
            }

            if options.fail && round == options.switches.div_ceil(2) {
                if let Some(device) = &last_device {
                    println!("Unplugging {}...", device);
                    backend.fail_device(device, "simulated unplug");
                }
                if wait(interval, &stop_flag).await {
                    break;
                }
            }

            match pipeline.cycle().await {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    last_device = Some(outcome.device.id.clone());
                }
                Err(e) => println!("Switch failed: {}", e),
            }
        }

        if !stop_flag.load(Ordering::SeqCst) {
            wait(interval, &stop_flag).await;
        }

        let status = pipeline.status().await?;
        pipeline.teardown().await?;
        println!();
        println!(
            "Delivered {} frames in {:.1}s ({} suppressed, {} stale dropped, {} malformed)",
            delivered.load(Ordering::Relaxed),
            start.elapsed().as_secs_f64(),
            status.frames_suppressed,
            status.stale_frames_dropped,
            status.composite_failures,
        );
        pipeline.shutdown().await?;
        Ok::<_, AppError>(last_device)
    })?;

    if last_device.is_some() && last_device != config.last_device_id {
        config.last_device_id = last_device;
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    if let Some(dir) = options.output {
        println!("Snapshots: {}", dir.display());
    }
    Ok(())
}

fn demo_consumer(
    output: Option<PathBuf>,
    snapshot_every: u32,
    delivered: Arc<AtomicU64>,
) -> Arc<dyn FrameConsumer> {
    let snapshots = output.map(|dir| SnapshotConsumer::new(dir, snapshot_every));
    Arc::new(move |frame: FrameEnvelope| {
        delivered.fetch_add(1, Ordering::Relaxed);
        if let Some(snapshots) = &snapshots {
            snapshots.consume(frame);
        }
    })
}

fn print_outcome(outcome: &SwitchOutcome) {
    println!(
        "Switched to {} [{}] {} in {}ms",
        outcome.device.name,
        outcome.device.id,
        outcome.format,
        outcome.elapsed.as_millis()
    );
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::CameraFailed { device_id, reason } => {
            println!("  camera {} failed: {}", device_id, reason)
        }
        PipelineEvent::CameraStateChanged {
            camera_on,
            device_id,
        } => println!(
            "  camera {} ({})",
            if *camera_on { "on" } else { "off" },
            device_id.as_deref().unwrap_or("none")
        ),
        PipelineEvent::SwitchPhase { session, phase } if phase.is_terminal() => {
            println!("  switch {} {}", session, phase)
        }
        PipelineEvent::SwitchPhase { .. } | PipelineEvent::DevicesChanged(_) => {}
    }
}

/// Sleep for `duration`, returning early (with `true`) on Ctrl+C
async fn wait(duration: Duration, stop_flag: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if stop_flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    stop_flag.load(Ordering::SeqCst)
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    })
}

/// Get default snapshot directory
pub fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
