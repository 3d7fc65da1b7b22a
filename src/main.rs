// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-handoff")]
#[command(about = "Live camera switchover with fade and blackout compositing")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Run a scripted switchover on the synthetic cameras
    Demo {
        /// Number of camera switches after the first one
        #[arg(short, long, default_value = "4")]
        switches: u32,

        /// Time between switches in milliseconds
        #[arg(short, long, default_value = "1500")]
        interval_ms: u64,

        /// Save PNG snapshots of delivered frames
        #[arg(long)]
        snapshots: bool,

        /// Snapshot directory (default: ~/Pictures/camera-handoff)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save one frame out of this many (default from config)
        #[arg(long)]
        snapshot_every: Option<u32>,

        /// Unplug the active camera halfway through
        #[arg(long)]
        fail: bool,

        /// Fade the outgoing camera out while the next one starts
        #[arg(long)]
        fade_out: bool,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_handoff=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Demo {
            switches,
            interval_ms,
            snapshots,
            output,
            snapshot_every,
            fail,
            fade_out,
        } => cli::run_demo(cli::DemoOptions {
            switches,
            interval_ms,
            output: output.or_else(|| snapshots.then(cli::default_snapshot_dir)),
            snapshot_every,
            fail,
            fade_out,
        }),
        Commands::Config => cli::print_config(),
    }?;

    Ok(())
}
