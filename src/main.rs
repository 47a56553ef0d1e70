//! Kagami - Headless Camera-to-Puppet Motion Capture Service
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kagami::{
    capture::SyntheticDevice,
    config::{Config, HudMode},
    hud::{self, HudOptions},
    landmark::TrackingChannel,
    pipeline::{Pipeline, PipelineOptions},
    rig::{MemoryParameterTable, ParameterTable, RigMapper, RigParam},
    AppState,
};

/// Kagami - Headless camera-to-puppet motion capture service
#[derive(Parser, Debug)]
#[command(name = "kagami", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable face tracking
    #[arg(long)]
    no_face: bool,

    /// Enable body pose tracking
    #[arg(long)]
    pose: bool,

    /// Enable hand tracking
    #[arg(long)]
    hand: bool,

    /// HUD mode: points, wireframe, or mask (overrides config)
    #[arg(long)]
    hud: Option<String>,

    /// Disable the selfie mirror flip
    #[arg(long)]
    no_mirror: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", kagami::NAME, kagami::VERSION);

    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if args.no_face {
        config.face.enabled = false;
    }
    if args.pose {
        config.pose.enabled = true;
    }
    if args.hand {
        config.hand.enabled = true;
    }
    if args.no_mirror {
        config.capture.mirror = false;
    }
    if let Some(ref mode) = args.hud {
        config.hud.mode = match mode.to_lowercase().as_str() {
            "points" | "point" | "cloud" => HudMode::Points,
            "wireframe" | "wire" | "mesh" => HudMode::Wireframe,
            "mask" => HudMode::Mask,
            other => {
                anyhow::bail!("unknown HUD mode: {other}");
            }
        };
    }

    // Validate configuration
    config.validate()?;

    info!("Capture resolution: {:?}", config.capture.resolution);
    info!(
        "Channels: face={} pose={} hand={}",
        config.face.enabled, config.pose.enabled, config.hand.enabled
    );
    info!("HUD mode: {:?}", config.hud.mode);

    // Create shared application state
    let state = AppState::new(config.clone());

    // Start tracking pipelines for each enabled channel
    for (channel, enabled) in [
        (TrackingChannel::Face, config.face.enabled),
        (TrackingChannel::Pose, config.pose.enabled),
        (TrackingChannel::Hand, config.hand.enabled),
    ] {
        if !enabled {
            continue;
        }
        let channel_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = run_tracking(channel_state, channel).await {
                error!("{} tracking error: {}", channel, e);
            }
        });
    }

    // Start the rig mapper render loop
    let mapper_state = Arc::clone(&state);
    tokio::spawn(async move {
        run_rig_mapper(mapper_state).await;
    });

    // Start the HUD renderer
    let hud_state = Arc::clone(&state);
    tokio::spawn(async move {
        run_hud(hud_state).await;
    });

    // Wait for Ctrl+C / SIGTERM
    shutdown_signal().await;
    info!("Shutdown signal received");
    state.shutdown();

    // Give tasks a moment to clean up
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Kagami stopped");
    Ok(())
}

/// Run one channel's tracking pipeline until shutdown.
async fn run_tracking(state: Arc<AppState>, channel: TrackingChannel) -> kagami::Result<()> {
    let config = state.config.read().await;
    let options = PipelineOptions::from_config(channel, &config);
    let models = config.models.clone();
    drop(config);

    let mut shutdown_rx = state.subscribe_shutdown();

    // The camera backend is an external collaborator; the built-in device
    // yields a synthetic test pattern so the service runs anywhere.
    let device = SyntheticDevice;

    let mut pipeline = Pipeline::new(options, state.bus(channel).clone());
    pipeline.start(&device, &models).await?;

    let _ = shutdown_rx.recv().await;
    info!("{} tracking shutting down", channel);
    pipeline.stop();
    Ok(())
}

/// Render-tick loop: map the latest solved poses onto the puppet's
/// parameter table, decoupled from inference cadence.
async fn run_rig_mapper(state: Arc<AppState>) {
    let config = state.config.read().await;
    let tuning = config.mapper.clone();
    drop(config);

    let mut shutdown_rx = state.subscribe_shutdown();
    let mut mapper = RigMapper::new(tuning.clone());
    let mut table = MemoryParameterTable::full();

    let mut ticker =
        tokio::time::interval(Duration::from_secs_f32(1.0 / tuning.render_fps.max(1.0)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let face = state.bus(TrackingChannel::Face).latest();
                let pose = state.bus(TrackingChannel::Pose).latest();

                let face_solve = face.as_ref().and_then(|u| u.solved.as_ref()).and_then(|s| s.as_face());
                let pose_solve = pose.as_ref().and_then(|u| u.solved.as_ref()).and_then(|s| s.as_pose());

                mapper.apply(face_solve, pose_solve, &mut table);

                ticks += 1;
                if ticks % (tuning.render_fps as u64).max(1) == 0 {
                    debug!(
                        angle_x = ?table.get(RigParam::AngleX),
                        mouth_open = ?table.get(RigParam::MouthOpen),
                        eye_l = ?table.get(RigParam::EyeOpenLeft),
                        "rig state"
                    );
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Rig mapper shutting down");
                return;
            }
        }
    }
}

/// HUD loop: draw the latest smoothed landmark set into the shared
/// overlay surface.
async fn run_hud(state: Arc<AppState>) {
    let config = state.config.read().await;
    let mode = config.hud.mode;
    let options = HudOptions {
        mesh_overlay: config.hud.mesh_overlay,
    };
    let mirrored = config.capture.mirror;
    let (width, height) = config
        .capture
        .resolution
        .dimensions()
        .unwrap_or((640, 480));
    drop(config);

    let mut shutdown_rx = state.subscribe_shutdown();
    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_rendered_ts: Option<i64> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(update) = state.bus(TrackingChannel::Face).latest() else {
                    continue;
                };
                if last_rendered_ts == Some(update.timestamp_ms) {
                    continue;
                }
                last_rendered_ts = Some(update.timestamp_ms);

                let Some(landmarks) = update.smoothed else {
                    continue;
                };

                let mut surface = image::RgbaImage::new(width, height);
                hud::render(&mut surface, &landmarks, mode, mirrored, options);

                let mut slot = state.hud_frame.lock().expect("hud frame lock poisoned");
                *slot = Some(surface);
            }
            _ = shutdown_rx.recv() => {
                info!("HUD renderer shutting down");
                return;
            }
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
