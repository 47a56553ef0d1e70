//! Error types for Kagami

use thiserror::Error;

/// Main error type for Kagami
#[derive(Error, Debug)]
pub enum KagamiError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture device and stream errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No capture device found")]
    NoDeviceFound,

    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("Requested constraints rejected: {0}")]
    ConstraintsRejected(String),

    #[error("Failed to open stream: {0}")]
    StreamOpen(String),

    #[error("Stream has been released")]
    StreamReleased,

    #[error("Frame read failed: {0}")]
    FrameRead(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Model asset resolution and inference-engine errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model asset not found: {0}")]
    AssetNotFound(String),

    #[error("Model asset fetch failed: {0}")]
    AssetFetch(String),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected model output: {0}")]
    OutputShape(String),
}

/// Landmark and solver errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Landmark set cardinality mismatch for {channel}: expected {expected}, got {actual}")]
    CardinalityMismatch {
        channel: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Pipeline lifecycle errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline already destroyed")]
    Destroyed,

    #[error("First frame wait timed out after {0} ms")]
    FirstFrameTimeout(u64),
}

/// Result type alias for Kagami operations
pub type Result<T> = std::result::Result<T, KagamiError>;
