//! Capture source abstraction.
//!
//! The camera itself is an external collaborator: this module only defines
//! the boundary, a [`CaptureDevice`] that opens a [`FrameSource`] for a
//! [`CaptureRequest`], plus the acquisition policy (retry with minimal
//! constraints when the preferred request is rejected) and a shareable
//! stream wrapper so several pipelines can read one camera feed.
//!
//! A synthetic test-pattern device is provided for tests and for running
//! the service without any camera attached.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::ResolutionTier;
use crate::error::CaptureError;

/// One RGBA frame from a capture source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data, row-major
    pub data: Arc<Vec<u8>>,
    /// Milliseconds since the stream was opened
    pub timestamp_ms: i64,
}

impl VideoFrame {
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Front,
    Rear,
}

/// A stream request handed to a capture device.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub resolution: ResolutionTier,
    pub facing: Facing,
    pub device: u32,
}

impl CaptureRequest {
    pub fn new(resolution: ResolutionTier, device: u32) -> Self {
        Self {
            resolution,
            facing: Facing::Front,
            device,
        }
    }

    /// The least-constrained form of this request, used as the retry tier.
    pub fn minimal(&self) -> Self {
        Self {
            resolution: ResolutionTier::Auto,
            facing: self.facing,
            device: self.device,
        }
    }
}

/// A live stream of frames. `grab` returns `Ok(None)` when no new frame is
/// available yet; pacing is the source's concern.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Option<VideoFrame>, CaptureError>;

    /// Actual stream dimensions
    fn resolution(&self) -> (u32, u32);
}

/// Opens frame sources. Implementations wrap a platform camera backend.
pub trait CaptureDevice: Send + Sync {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Acquire a stream, falling back to minimal constraints when the
/// preferred request is rejected by the platform.
pub fn acquire_stream(
    device: &dyn CaptureDevice,
    request: &CaptureRequest,
) -> Result<SharedStream, CaptureError> {
    match device.open(request) {
        Ok(source) => Ok(SharedStream::new(source)),
        Err(CaptureError::ConstraintsRejected(reason))
            if request.resolution != ResolutionTier::Auto =>
        {
            tracing::warn!(
                %reason,
                "preferred capture constraints rejected, retrying with minimal constraints"
            );
            let source = device.open(&request.minimal())?;
            Ok(SharedStream::new(source))
        }
        Err(e) => Err(e),
    }
}

/// A frame source shareable read-only between pipelines.
///
/// Cloning shares the underlying stream. `release` drops the source and is
/// permanent: a released stream only ever reports [`CaptureError::
/// StreamReleased`], and a new stream must be acquired to recover.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Option<Box<dyn FrameSource>>>>,
}

impl SharedStream {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(source))),
        }
    }

    /// Grab the next frame, if one is available.
    pub fn grab(&self) -> Result<Option<VideoFrame>, CaptureError> {
        let mut guard = self.inner.lock().expect("capture stream lock poisoned");
        match guard.as_mut() {
            Some(source) => source.grab(),
            None => Err(CaptureError::StreamReleased),
        }
    }

    /// Drop the underlying source, releasing the device synchronously.
    /// Safe to call more than once.
    pub fn release(&self) {
        let mut guard = self.inner.lock().expect("capture stream lock poisoned");
        if guard.take().is_some() {
            tracing::info!("capture stream released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().expect("capture stream lock poisoned").is_none()
    }
}

impl std::fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStream")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Synthetic test-pattern source: a neutral gradient at the requested
/// resolution with wall-clock timestamps. Stands in for a camera in tests
/// and detector-less runs.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    opened_at: Instant,
    frame: Arc<Vec<u8>>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for y in 0..height {
            for x in 0..width {
                let i = ((y * width + x) * 4) as usize;
                let shade = (128 + (x * 64 / width.max(1)) as i32 - 32) as u8;
                data[i] = shade;
                data[i + 1] = shade;
                data[i + 2] = shade;
                data[i + 3] = 255;
            }
        }
        Self {
            width,
            height,
            opened_at: Instant::now(),
            frame: Arc::new(data),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn grab(&mut self) -> Result<Option<VideoFrame>, CaptureError> {
        Ok(Some(VideoFrame {
            width: self.width,
            height: self.height,
            data: Arc::clone(&self.frame),
            timestamp_ms: self.opened_at.elapsed().as_millis() as i64,
        }))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Capture device producing [`SyntheticSource`] streams.
pub struct SyntheticDevice;

impl CaptureDevice for SyntheticDevice {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn FrameSource>, CaptureError> {
        let (w, h) = request.resolution.dimensions().unwrap_or((640, 480));
        Ok(Box::new(SyntheticSource::new(w, h)))
    }
}
