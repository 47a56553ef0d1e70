//! Landmark inference adapter.
//!
//! Wraps an ONNX landmark model behind the uniform [`Detector`] contract:
//! `detect(frame, timestamp) -> Option<LandmarkSet>`. Construction walks a
//! three-tier acquisition chain (local bundled asset, then remote fallback
//! asset, then stub) and never returns an error to the caller: the rest of
//! the pipeline may assume a detector always exists and is always callable.
//! Per-frame inference failures are caught and logged, never propagated.

use std::path::PathBuf;

use image::{imageops, ImageBuffer, Rgba};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

use crate::capture::VideoFrame;
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::landmark::{Landmark, LandmarkSet, TrackingChannel, FACE_POINTS, IRIS_POINTS};

/// Minimum presence score for a detection to count as a subject
const PRESENCE_THRESHOLD: f32 = 0.5;

/// Uniform detection contract. Implementations absorb their own failures.
pub trait Detector: Send {
    /// Run detection on one frame. `None` means "no subject", whether
    /// because nothing was detected or because this is a stub.
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Option<LandmarkSet>;

    fn channel(&self) -> TrackingChannel;

    /// Whether this detector is the terminal stub tier.
    fn is_stub(&self) -> bool {
        false
    }
}

/// Acquisition tiers, tried in order. Only total exhaustion of the chain
/// yields the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetTier {
    Local,
    Remote,
}

impl AssetTier {
    const CHAIN: [AssetTier; 2] = [AssetTier::Local, AssetTier::Remote];
}

fn local_asset_path(channel: TrackingChannel, config: &ModelConfig) -> PathBuf {
    config.dir.join(&config.version).join(channel.asset_name())
}

fn remote_asset_url(channel: TrackingChannel, config: &ModelConfig) -> String {
    format!(
        "{}/{}/{}",
        config.base_url.trim_end_matches('/'),
        config.version,
        channel.asset_name()
    )
}

/// Construct a detector for `channel`, walking the acquisition chain.
///
/// Each tier's failure is logged and swallowed; this function cannot fail.
pub async fn create_detector(channel: TrackingChannel, config: &ModelConfig) -> Box<dyn Detector> {
    for tier in AssetTier::CHAIN {
        match acquire_tier(tier, channel, config).await {
            Ok(detector) => {
                tracing::info!(channel = %channel, ?tier, "landmark detector ready");
                return Box::new(detector);
            }
            Err(e) => {
                tracing::warn!(channel = %channel, ?tier, error = %e, "detector tier failed");
            }
        }
    }

    tracing::warn!(channel = %channel, "all asset tiers exhausted, using stub detector");
    Box::new(StubDetector::new(channel))
}

async fn acquire_tier(
    tier: AssetTier,
    channel: TrackingChannel,
    config: &ModelConfig,
) -> Result<OnnxDetector, ModelError> {
    let path = local_asset_path(channel, config);

    match tier {
        AssetTier::Local => {
            if !path.exists() {
                return Err(ModelError::AssetNotFound(path.display().to_string()));
            }
            OnnxDetector::from_file(channel, &path)
        }
        AssetTier::Remote => {
            let url = remote_asset_url(channel, config);
            let bytes = fetch_asset(&url).await?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ModelError::AssetFetch(format!("{}: {e}", parent.display())))?;
            }
            std::fs::write(&path, &bytes)
                .map_err(|e| ModelError::AssetFetch(format!("{}: {e}", path.display())))?;
            tracing::info!(channel = %channel, %url, "cached remote model asset");
            OnnxDetector::from_file(channel, &path)
        }
    }
}

async fn fetch_asset(url: &str) -> Result<Vec<u8>, ModelError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ModelError::AssetFetch(format!("{url}: {e}")))?
        .error_for_status()
        .map_err(|e| ModelError::AssetFetch(format!("{url}: {e}")))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ModelError::AssetFetch(format!("{url}: {e}")))?;

    Ok(bytes.to_vec())
}

/// ONNX Runtime landmark detector.
pub struct OnnxDetector {
    channel: TrackingChannel,
    session: Session,
    input_size: u32,
}

impl OnnxDetector {
    /// Square model input edge per channel
    fn input_size_for(channel: TrackingChannel) -> u32 {
        match channel {
            TrackingChannel::Face => 192,
            TrackingChannel::Pose => 256,
            TrackingChannel::Hand => 224,
        }
    }

    pub fn from_file(
        channel: TrackingChannel,
        path: &std::path::Path,
    ) -> Result<Self, ModelError> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("kagami_landmarks")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()
                .map_err(|e| ModelError::Load(e.to_string()))?,
        );

        let session = SessionBuilder::new(&environment)
            .map_err(|e| ModelError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Load(e.to_string()))?
            .with_model_from_file(path)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;

        Ok(Self {
            channel,
            session,
            input_size: Self::input_size_for(channel),
        })
    }

    /// Resize + normalize one RGBA frame into an NHWC float tensor.
    fn preprocess(&self, frame: &VideoFrame) -> Result<Array4<f32>, ModelError> {
        let size = self.input_size;
        let image: ImageBuffer<Rgba<u8>, _> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_slice())
                .ok_or_else(|| {
                    ModelError::Inference(format!(
                        "frame buffer size mismatch: {}x{} with {} bytes",
                        frame.width,
                        frame.height,
                        frame.len_bytes()
                    ))
                })?;

        let resized = imageops::resize(&image, size, size, imageops::FilterType::Triangle);

        let mut data = vec![0.0f32; (size * size * 3) as usize];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let base = ((y * size + x) * 3) as usize;
            data[base] = f32::from(pixel[0]) / 255.0;
            data[base + 1] = f32::from(pixel[1]) / 255.0;
            data[base + 2] = f32::from(pixel[2]) / 255.0;
        }

        Array4::from_shape_vec((1, size as usize, size as usize, 3), data)
            .map_err(|e| ModelError::Inference(format!("failed to shape input tensor: {e}")))
    }

    fn infer(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Result<Option<LandmarkSet>, ModelError> {
        let input = self.preprocess(frame)?;

        let cow = CowArray::from(input.into_dyn());
        let tensor = Value::from_array(self.session.allocator(), &cow)
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(vec![tensor])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let mut outputs = outputs.into_iter();

        let coords = outputs
            .next()
            .ok_or_else(|| ModelError::OutputShape("model produced no outputs".to_string()))?;
        let coords = coords
            .try_extract::<f32>()
            .map_err(|e| ModelError::OutputShape(e.to_string()))?;
        let view = coords.view();
        let flat = view
            .as_slice()
            .ok_or_else(|| ModelError::OutputShape("non-contiguous output".to_string()))?;

        // Second output, when present, is a subject-presence score.
        if let Some(score_out) = outputs.next() {
            if let Ok(tensor) = score_out.try_extract::<f32>() {
                let view = tensor.view();
                let score = view.as_slice().and_then(|s| s.first().copied());
                if let Some(score) = score {
                    if score < PRESENCE_THRESHOLD {
                        return Ok(None);
                    }
                }
            }
        }

        self.decode(flat, timestamp_ms).map(Some)
    }

    /// Interpret the flat coordinate tensor as (x, y, z) triples in model
    /// input space, normalized back to [0, 1].
    fn decode(&self, flat: &[f32], timestamp_ms: i64) -> Result<LandmarkSet, ModelError> {
        if flat.len() % 3 != 0 {
            return Err(ModelError::OutputShape(format!(
                "output length {} is not a multiple of 3",
                flat.len()
            )));
        }

        let count = flat.len() / 3;
        let expected = self.channel.cardinality();
        let refined = self.channel == TrackingChannel::Face && count == FACE_POINTS + IRIS_POINTS;
        if count != expected && !refined {
            return Err(ModelError::OutputShape(format!(
                "expected {expected} landmarks for {}, model produced {count}",
                self.channel
            )));
        }

        let scale = 1.0 / self.input_size as f32;
        let points = flat
            .chunks_exact(3)
            .map(|c| Landmark::new(c[0] * scale, c[1] * scale, c[2] * scale))
            .collect();

        LandmarkSet::new(self.channel, points, timestamp_ms).ok_or_else(|| {
            ModelError::OutputShape(format!("landmark set rejected for {}", self.channel))
        })
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: i64) -> Option<LandmarkSet> {
        match self.infer(frame, timestamp_ms) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "detection failed for frame");
                None
            }
        }
    }

    fn channel(&self) -> TrackingChannel {
        self.channel
    }
}

/// Terminal acquisition tier: always constructible, always callable,
/// never detects anything.
pub struct StubDetector {
    channel: TrackingChannel,
}

impl StubDetector {
    pub fn new(channel: TrackingChannel) -> Self {
        Self { channel }
    }
}

impl Detector for StubDetector {
    fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: i64) -> Option<LandmarkSet> {
        None
    }

    fn channel(&self) -> TrackingChannel {
        self.channel
    }

    fn is_stub(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameSource, SyntheticSource};

    fn unreachable_config(dir: &std::path::Path) -> ModelConfig {
        ModelConfig {
            dir: dir.to_path_buf(),
            // Discard port: connection refused immediately, no real fetch
            base_url: "http://127.0.0.1:9/models".to_string(),
            version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_exhausted_tiers_yield_stub() {
        let dir = tempfile::tempdir().unwrap();
        let config = unreachable_config(dir.path());

        let mut detector = create_detector(TrackingChannel::Face, &config).await;
        assert!(detector.is_stub());
        assert_eq!(detector.channel(), TrackingChannel::Face);

        // The stub is callable and quietly reports "no subject"
        let mut source = SyntheticSource::new(64, 64);
        let frame = source.grab().unwrap().unwrap();
        assert!(detector.detect(&frame, 0).is_none());
    }

    #[tokio::test]
    async fn test_local_tier_rejects_garbage_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = unreachable_config(dir.path());

        // A present-but-unparseable local asset falls through to the stub
        let path = local_asset_path(TrackingChannel::Hand, &config);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not an onnx model").unwrap();

        let detector = create_detector(TrackingChannel::Hand, &config).await;
        assert!(detector.is_stub());
    }

    #[test]
    fn test_asset_paths() {
        let config = ModelConfig {
            dir: PathBuf::from("/opt/kagami/models"),
            base_url: "https://assets.example.com/models/".to_string(),
            version: "v2".to_string(),
        };
        assert_eq!(
            local_asset_path(TrackingChannel::Pose, &config),
            PathBuf::from("/opt/kagami/models/v2/pose_landmarker.onnx")
        );
        assert_eq!(
            remote_asset_url(TrackingChannel::Pose, &config),
            "https://assets.example.com/models/v2/pose_landmarker.onnx"
        );
    }

    #[test]
    fn test_stub_detect_is_null_for_any_frame() {
        let mut stub = StubDetector::new(TrackingChannel::Pose);
        let mut source = SyntheticSource::new(16, 16);
        let frame = source.grab().unwrap().unwrap();
        for ts in [0, 100, 2000] {
            assert!(stub.detect(&frame, ts).is_none());
        }
    }
}
