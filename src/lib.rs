//! Kagami - Headless Camera-to-Puppet Motion Capture Service
//!
//! A modular Rust service that:
//! - Ingests a live camera stream and extracts face/body/hand landmarks
//!   at interactive frame rates
//! - Solves raw geometry into semantic rig signals (head rotation, eye
//!   aperture, pupil offset, mouth shape, brow lift)
//! - Drives a parametric 2D puppet through a flat rig-parameter table
//! - Renders a diagnostic HUD overlay of the raw detection

pub mod bus;
pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod hud;
pub mod landmark;
pub mod pipeline;
pub mod rig;
pub mod solver;
pub mod topology;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use error::{KagamiError, Result};

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use bus::ResultBus;
use landmark::TrackingChannel;
use pipeline::TrackingUpdate;

/// Application state shared across all components
#[derive(Debug)]
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Per-channel tracking result buses
    face_bus: ResultBus<TrackingUpdate>,
    pose_bus: ResultBus<TrackingUpdate>,
    hand_bus: ResultBus<TrackingUpdate>,
    /// Latest rendered HUD frame, for embedders to blit
    pub hud_frame: std::sync::Mutex<Option<image::RgbaImage>>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state with the given configuration
    pub fn new(config: Config) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            config: RwLock::new(config),
            face_bus: ResultBus::new(),
            pose_bus: ResultBus::new(),
            hand_bus: ResultBus::new(),
            hud_frame: std::sync::Mutex::new(None),
            shutdown_tx,
        })
    }

    /// The result bus for one tracking channel
    pub fn bus(&self, channel: TrackingChannel) -> &ResultBus<TrackingUpdate> {
        match channel {
            TrackingChannel::Face => &self.face_bus,
            TrackingChannel::Pose => &self.pose_bus,
            TrackingChannel::Hand => &self.hand_bus,
        }
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_buses_are_independent() {
        let state = AppState::new(Config::default());
        let update = TrackingUpdate {
            channel: TrackingChannel::Face,
            timestamp_ms: 0,
            raw: None,
            smoothed: None,
            solved: None,
        };
        state.bus(TrackingChannel::Face).publish(update);
        assert!(state.bus(TrackingChannel::Face).latest().is_some());
        assert!(state.bus(TrackingChannel::Pose).latest().is_none());
        assert!(state.bus(TrackingChannel::Hand).latest().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe_shutdown();
        state.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
