//! Per-channel tracking pipeline: capture → detect → smooth → solve →
//! publish.
//!
//! Each [`Pipeline`] is a handle over one tracking channel with the
//! lifecycle `Idle → Starting → Running → Stopping → Idle`. `start()` is
//! idempotent; `stop()` is safe from any state, releases the capture
//! stream synchronously, and discards the result of any detection still
//! in flight. Frames arriving faster than the channel's maximum FPS are
//! skipped, never queued, so load sheds frames instead of building lag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bus::ResultBus;
use crate::capture::{acquire_stream, CaptureDevice, CaptureRequest, SharedStream};
use crate::config::Config;
use crate::detector::create_detector;
use crate::error::{CaptureError, PipelineError, Result};
use crate::landmark::{smooth, LandmarkSet, TrackingChannel};
use crate::solver::{solve, SolvedPose, SolverContext};

/// Lifecycle states of a pipeline handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// One processed frame's worth of output, published on the channel's bus.
/// All payload fields are `None` when the frame held no subject.
#[derive(Debug, Clone)]
pub struct TrackingUpdate {
    pub channel: TrackingChannel,
    pub timestamp_ms: i64,
    pub raw: Option<LandmarkSet>,
    pub smoothed: Option<LandmarkSet>,
    pub solved: Option<SolvedPose>,
}

/// Frame-rate limiter: admits a frame only when at least `1000 / max_fps`
/// milliseconds have passed since the last admitted one. Rejected frames
/// are dropped, not queued.
#[derive(Debug)]
pub struct FrameThrottle {
    min_interval_ms: f64,
    last_admitted_ms: Option<i64>,
}

impl FrameThrottle {
    pub fn new(max_fps: f32) -> Self {
        Self {
            min_interval_ms: f64::from(1000.0 / max_fps.max(f32::EPSILON)),
            last_admitted_ms: None,
        }
    }

    pub fn admit(&mut self, timestamp_ms: i64) -> bool {
        if let Some(last) = self.last_admitted_ms {
            if ((timestamp_ms - last) as f64) < self.min_interval_ms {
                return false;
            }
        }
        self.last_admitted_ms = Some(timestamp_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last_admitted_ms = None;
    }
}

/// Options fixed at pipeline creation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub channel: TrackingChannel,
    pub capture: CaptureRequest,
    pub max_fps: f32,
    pub smoothing_alpha: f32,
    pub first_frame_timeout: Duration,
    pub solver: SolverContext,
}

impl PipelineOptions {
    pub fn from_config(channel: TrackingChannel, config: &Config) -> Self {
        let channel_cfg = match channel {
            TrackingChannel::Face => &config.face,
            TrackingChannel::Pose => &config.pose,
            TrackingChannel::Hand => &config.hand,
        };
        Self {
            channel,
            capture: CaptureRequest::new(config.capture.resolution, config.capture.device),
            max_fps: channel_cfg.max_fps,
            smoothing_alpha: channel_cfg.smoothing_alpha,
            first_frame_timeout: Duration::from_millis(config.capture.first_frame_timeout_ms),
            solver: SolverContext {
                max_head_angle_deg: config.mapper.max_head_angle_deg,
            },
        }
    }
}

/// Handle over one channel's capture stream, detector, smoothing state,
/// and frame loop. No state is shared between handles of different
/// channels; a [`SharedStream`] may be attached to feed several handles
/// from one camera.
pub struct Pipeline {
    options: PipelineOptions,
    state: Arc<Mutex<PipelineState>>,
    stop_flag: Arc<AtomicBool>,
    stream: Option<SharedStream>,
    /// Whether this handle acquired (and therefore releases) its stream
    owns_stream: bool,
    prev: Arc<Mutex<Option<LandmarkSet>>>,
    bus: ResultBus<TrackingUpdate>,
    loop_task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl Pipeline {
    pub fn new(options: PipelineOptions, bus: ResultBus<TrackingUpdate>) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            stream: None,
            owns_stream: false,
            prev: Arc::new(Mutex::new(None)),
            bus,
            loop_task: None,
            destroyed: false,
        }
    }

    pub fn channel(&self) -> TrackingChannel {
        self.options.channel
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("pipeline state lock poisoned")
    }

    /// Subscribe to this pipeline's frame notifications.
    pub fn bus(&self) -> &ResultBus<TrackingUpdate> {
        &self.bus
    }

    /// Start the pipeline, acquiring a stream from `device`.
    ///
    /// Idempotent: calling while already starting or running is a no-op,
    /// so concurrent triggers cannot double-acquire the device or spawn a
    /// second frame loop.
    pub async fn start(
        &mut self,
        device: &dyn CaptureDevice,
        models: &crate::config::ModelConfig,
    ) -> Result<()> {
        if self.destroyed {
            return Err(PipelineError::Destroyed.into());
        }
        if !self.enter_starting() {
            return Ok(());
        }

        // Device-unavailable is a soft state: continue detector-less
        // rather than failing the session.
        let stream = match acquire_stream(device, &self.options.capture) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(
                    channel = %self.options.channel,
                    error = %e,
                    "capture unavailable, pipeline will produce no landmarks"
                );
                None
            }
        };
        self.owns_stream = stream.is_some();
        self.finish_start(stream, models).await
    }

    /// Start the pipeline against an already-acquired stream shared with
    /// other handles. The stream's owner is responsible for releasing it.
    pub async fn start_with_stream(
        &mut self,
        stream: SharedStream,
        models: &crate::config::ModelConfig,
    ) -> Result<()> {
        if self.destroyed {
            return Err(PipelineError::Destroyed.into());
        }
        if !self.enter_starting() {
            return Ok(());
        }
        self.owns_stream = false;
        self.finish_start(Some(stream), models).await
    }

    /// Transition Idle → Starting. Returns false when already started.
    fn enter_starting(&self) -> bool {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        match *state {
            PipelineState::Idle => {
                *state = PipelineState::Starting;
                true
            }
            current => {
                tracing::debug!(
                    channel = %self.options.channel,
                    %current,
                    "start() ignored, pipeline already active"
                );
                false
            }
        }
    }

    async fn finish_start(
        &mut self,
        stream: Option<SharedStream>,
        models: &crate::config::ModelConfig,
    ) -> Result<()> {
        if let Some(stream) = &stream {
            self.wait_first_frame(stream).await;
        }

        // Detector construction is lazy and infallible: the adapter falls
        // back to a stub when every asset tier is out of reach.
        let detector = create_detector(self.options.channel, models).await;

        self.stop_flag.store(false, Ordering::SeqCst);
        self.stream = stream.clone();
        *self.prev.lock().expect("smoothing state lock poisoned") = None;

        let task = FrameLoop {
            channel: self.options.channel,
            stream,
            detector,
            throttle: FrameThrottle::new(self.options.max_fps),
            smoothing_alpha: self.options.smoothing_alpha,
            solver: self.options.solver,
            prev: Arc::clone(&self.prev),
            bus: self.bus.clone(),
            stop_flag: Arc::clone(&self.stop_flag),
            max_fps: self.options.max_fps,
        };
        self.loop_task = Some(tokio::spawn(task.run()));

        *self.state.lock().expect("pipeline state lock poisoned") = PipelineState::Running;
        tracing::info!(channel = %self.options.channel, "pipeline running");
        Ok(())
    }

    /// Block (bounded) until the stream yields its first playable frame.
    /// On timeout the pipeline proceeds anyway instead of hanging.
    async fn wait_first_frame(&self, stream: &SharedStream) {
        let deadline = tokio::time::Instant::now() + self.options.first_frame_timeout;
        loop {
            match stream.grab() {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(channel = %self.options.channel, error = %e, "first frame wait aborted");
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    channel = %self.options.channel,
                    timeout_ms = self.options.first_frame_timeout.as_millis() as u64,
                    "no playable frame yet, proceeding anyway"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the pipeline. Safe to call from any state, including on an
    /// already-stopped handle; the second call is a no-op. The capture
    /// stream this handle owns is released before returning, and an
    /// in-flight detection's result is discarded rather than applied.
    pub fn stop(&mut self) {
        if self.destroyed {
            return;
        }
        {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            if *state == PipelineState::Idle && self.stream.is_none() && self.loop_task.is_none() {
                return;
            }
            *state = PipelineState::Stopping;
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(stream) = self.stream.take() {
            if self.owns_stream {
                stream.release();
            }
        }
        self.owns_stream = false;

        // The loop observes the stop flag and exits on its own; dropping
        // the handle here must not wait on it.
        self.loop_task = None;

        *self.prev.lock().expect("smoothing state lock poisoned") = None;
        *self.state.lock().expect("pipeline state lock poisoned") = PipelineState::Idle;
        tracing::info!(channel = %self.options.channel, "pipeline stopped");
    }

    /// Tear the handle down for good. A destroyed handle's stream
    /// ownership is non-recoverable; create a new pipeline to restart.
    pub fn destroy(mut self) {
        self.stop();
        self.destroyed = true;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.destroyed {
            self.stop();
        }
    }
}

/// State moved into the spawned frame loop task.
struct FrameLoop {
    channel: TrackingChannel,
    stream: Option<SharedStream>,
    detector: Box<dyn crate::detector::Detector>,
    throttle: FrameThrottle,
    smoothing_alpha: f32,
    solver: SolverContext,
    prev: Arc<Mutex<Option<LandmarkSet>>>,
    bus: ResultBus<TrackingUpdate>,
    stop_flag: Arc<AtomicBool>,
    max_fps: f32,
}

impl FrameLoop {
    async fn run(mut self) {
        // Poll a few times per frame interval so throttling, not polling
        // cadence, bounds the processed rate.
        let poll = Duration::from_secs_f32(0.25 / self.max_fps.max(1.0));
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }

            let frame = match &self.stream {
                Some(stream) => match stream.grab() {
                    Ok(frame) => frame,
                    Err(CaptureError::StreamReleased) => break,
                    Err(e) => {
                        tracing::warn!(channel = %self.channel, error = %e, "frame grab failed");
                        None
                    }
                },
                None => None,
            };

            let Some(frame) = frame else { continue };

            // Too soon since the last processed frame: skip, don't queue
            if !self.throttle.admit(frame.timestamp_ms) {
                continue;
            }

            let raw = self.detector.detect(&frame, frame.timestamp_ms);

            let update = match raw {
                Some(raw_set) => {
                    let smoothed = {
                        let mut prev = self.prev.lock().expect("smoothing state lock poisoned");
                        let smoothed = smooth(prev.as_ref(), &raw_set, self.smoothing_alpha);
                        *prev = Some(smoothed.clone());
                        smoothed
                    };
                    let solved = solve(&smoothed, &self.solver);
                    TrackingUpdate {
                        channel: self.channel,
                        timestamp_ms: frame.timestamp_ms,
                        raw: Some(raw_set),
                        smoothed: Some(smoothed),
                        solved: Some(solved),
                    }
                }
                None => TrackingUpdate {
                    channel: self.channel,
                    timestamp_ms: frame.timestamp_ms,
                    raw: None,
                    smoothed: None,
                    solved: None,
                },
            };

            // A stop that raced the in-flight detection discards its
            // result rather than applying it.
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }

            self.bus.publish(update);
        }

        tracing::debug!(channel = %self.channel, "frame loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameSource, SyntheticSource, VideoFrame};
    use crate::config::ModelConfig;
    use std::sync::atomic::AtomicUsize;

    fn test_models(dir: &std::path::Path) -> ModelConfig {
        ModelConfig {
            dir: dir.to_path_buf(),
            base_url: "http://127.0.0.1:9/models".to_string(),
            version: "v1".to_string(),
        }
    }

    fn test_options(channel: TrackingChannel) -> PipelineOptions {
        PipelineOptions {
            channel,
            capture: CaptureRequest::new(crate::config::ResolutionTier::Low, 0),
            max_fps: 120.0,
            smoothing_alpha: 0.5,
            first_frame_timeout: Duration::from_millis(250),
            solver: SolverContext::default(),
        }
    }

    struct CountingDevice {
        opens: Arc<AtomicUsize>,
    }

    impl CaptureDevice for CountingDevice {
        fn open(
            &self,
            _request: &CaptureRequest,
        ) -> std::result::Result<Box<dyn FrameSource>, CaptureError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SyntheticSource::new(64, 64)))
        }
    }

    #[test]
    fn test_throttle_enforces_min_spacing() {
        let max_fps = 30.0;
        let mut throttle = FrameThrottle::new(max_fps);
        let min_interval = 1000.0 / f64::from(max_fps);

        let mut admitted = Vec::new();
        // 5 ms callback cadence, far faster than the 30 fps budget
        for ts in (0..2000).step_by(5) {
            if throttle.admit(ts) {
                admitted.push(ts);
            }
        }

        assert!(admitted.len() > 10);
        for pair in admitted.windows(2) {
            assert!(
                ((pair[1] - pair[0]) as f64) >= min_interval,
                "frames {} and {} too close",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_throttle_reset() {
        let mut throttle = FrameThrottle::new(10.0);
        assert!(throttle.admit(0));
        assert!(!throttle.admit(10));
        throttle.reset();
        assert!(throttle.admit(10));
    }

    #[tokio::test]
    async fn test_start_twice_acquires_once() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());
        let opens = Arc::new(AtomicUsize::new(0));
        let device = CountingDevice {
            opens: Arc::clone(&opens),
        };

        let mut pipeline = Pipeline::new(
            test_options(TrackingChannel::Face),
            ResultBus::new(),
        );

        pipeline.start(&device, &models).await.unwrap();
        pipeline.start(&device, &models).await.unwrap();

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Running);

        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_stop_twice_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());
        let opens = Arc::new(AtomicUsize::new(0));
        let device = CountingDevice {
            opens: Arc::clone(&opens),
        };

        let mut pipeline = Pipeline::new(
            test_options(TrackingChannel::Face),
            ResultBus::new(),
        );
        pipeline.start(&device, &models).await.unwrap();

        pipeline.stop();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Idle);

        // Stop on a never-started handle is also a no-op
        let mut idle = Pipeline::new(test_options(TrackingChannel::Pose), ResultBus::new());
        idle.stop();
        assert_eq!(idle.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_stub_pipeline_publishes_empty_updates() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());
        let device = CountingDevice {
            opens: Arc::new(AtomicUsize::new(0)),
        };

        let bus: ResultBus<TrackingUpdate> = ResultBus::new();
        let mut pipeline = Pipeline::new(test_options(TrackingChannel::Face), bus.clone());
        pipeline.start(&device, &models).await.unwrap();

        // Give the frame loop a few ticks
        for _ in 0..50 {
            if bus.latest().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let update = bus.latest().expect("loop published at least one update");
        assert_eq!(update.channel, TrackingChannel::Face);
        // Stub detector: frame processed, no subject
        assert!(update.raw.is_none());
        assert!(update.solved.is_none());

        pipeline.stop();
    }

    #[tokio::test]
    async fn test_stop_releases_owned_stream() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());
        let device = CountingDevice {
            opens: Arc::new(AtomicUsize::new(0)),
        };

        let mut pipeline = Pipeline::new(test_options(TrackingChannel::Face), ResultBus::new());
        pipeline.start(&device, &models).await.unwrap();
        let stream = pipeline.stream.clone().expect("stream acquired");
        assert!(!stream.is_released());

        pipeline.stop();
        assert!(stream.is_released());
    }

    #[tokio::test]
    async fn test_shared_stream_not_released_by_borrower() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());

        let stream = SharedStream::new(Box::new(SyntheticSource::new(64, 64)));
        let mut pipeline = Pipeline::new(test_options(TrackingChannel::Pose), ResultBus::new());
        pipeline
            .start_with_stream(stream.clone(), &models)
            .await
            .unwrap();

        pipeline.stop();
        // The owner of the shared camera feed decides when it closes
        assert!(!stream.is_released());
        stream.release();
    }

    #[tokio::test]
    async fn test_destroyed_pipeline_rejects_start() {
        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());
        let device = CountingDevice {
            opens: Arc::new(AtomicUsize::new(0)),
        };

        let mut pipeline = Pipeline::new(test_options(TrackingChannel::Face), ResultBus::new());
        pipeline.start(&device, &models).await.unwrap();
        pipeline.stop();

        // Simulate the handle having been torn down
        pipeline.destroyed = true;
        assert!(pipeline.start(&device, &models).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_device_is_soft_failure() {
        struct NoCamera;
        impl CaptureDevice for NoCamera {
            fn open(
                &self,
                _request: &CaptureRequest,
            ) -> std::result::Result<Box<dyn FrameSource>, CaptureError> {
                Err(CaptureError::NoDeviceFound)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let models = test_models(dir.path());

        let mut pipeline = Pipeline::new(test_options(TrackingChannel::Face), ResultBus::new());
        // No device: start still succeeds, detector-less
        pipeline.start(&NoCamera, &models).await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop();
    }

    #[allow(dead_code)]
    fn assert_send<T: Send>() {}

    #[test]
    fn test_update_is_send() {
        assert_send::<TrackingUpdate>();
        assert_send::<VideoFrame>();
    }
}
