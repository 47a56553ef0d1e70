//! Landmark containers and the temporal smoother.
//!
//! A `LandmarkSet` is the fixed-cardinality, order-significant output of one
//! detector invocation. Cardinality is a per-channel invariant: the face
//! mesh is 468 points (478 when the refined iris ring is appended), the
//! body skeleton 33, a hand 21. Smoothing only ever blends sets of matching
//! cardinality; mismatches are rejected rather than truncated.

use kagami_filters::ema;
use serde::{Deserialize, Serialize};

/// Number of points in the dense face mesh
pub const FACE_POINTS: usize = 468;

/// Number of iris points appended by the refined face model (5 per eye)
pub const IRIS_POINTS: usize = 10;

/// Number of points in the body skeleton
pub const POSE_POINTS: usize = 33;

/// Number of joints per hand
pub const HAND_POINTS: usize = 21;

/// Which detector produced a landmark set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingChannel {
    Face,
    Pose,
    Hand,
}

impl TrackingChannel {
    /// Base cardinality of this channel's landmark set
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Face => FACE_POINTS,
            Self::Pose => POSE_POINTS,
            Self::Hand => HAND_POINTS,
        }
    }

    /// Whether `len` is an acceptable point count for this channel.
    ///
    /// The face channel also accepts the refined mesh with iris points.
    pub fn accepts_len(&self, len: usize) -> bool {
        len == self.cardinality()
            || (*self == Self::Face && len == FACE_POINTS + IRIS_POINTS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Pose => "pose",
            Self::Hand => "hand",
        }
    }

    /// Model asset filename for this channel
    pub fn asset_name(&self) -> &'static str {
        match self {
            Self::Face => "face_landmarker.onnx",
            Self::Pose => "pose_landmarker.onnx",
            Self::Hand => "hand_landmarker.onnx",
        }
    }
}

impl std::fmt::Display for TrackingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tracked point. x/y are normalized [0,1] or pixel-scaled
/// depending on the producer; z is a relative depth estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered, fixed-cardinality landmark collection from one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    channel: TrackingChannel,
    points: Vec<Landmark>,
    timestamp_ms: i64,
}

impl LandmarkSet {
    /// Build a set, validating cardinality for the channel.
    ///
    /// Returns `None` when the point count does not match the channel;
    /// callers treat that as malformed input, not a partial result.
    pub fn new(
        channel: TrackingChannel,
        points: Vec<Landmark>,
        timestamp_ms: i64,
    ) -> Option<Self> {
        if !channel.accepts_len(points.len()) {
            tracing::debug!(
                channel = channel.as_str(),
                expected = channel.cardinality(),
                actual = points.len(),
                "rejecting landmark set with unexpected cardinality"
            );
            return None;
        }
        Some(Self {
            channel,
            points,
            timestamp_ms,
        })
    }

    pub fn channel(&self) -> TrackingChannel {
        self.channel
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Point at a topological index, if present in this set.
    pub fn point(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }
}

/// First-order IIR smoothing of `cur` against `prev`.
///
/// Each coordinate is updated as `p += (c - p) * alpha` independently per
/// axis. A `None` previous set is a cold start and returns `cur` unchanged.
/// A cardinality mismatch between `prev` and `cur` also returns `cur`
/// unchanged; stale history is never blended across topologies.
pub fn smooth(prev: Option<&LandmarkSet>, cur: &LandmarkSet, alpha: f32) -> LandmarkSet {
    let prev = match prev {
        Some(p) if p.len() == cur.len() && p.channel() == cur.channel() => p,
        Some(p) => {
            tracing::debug!(
                channel = cur.channel().as_str(),
                prev_len = p.len(),
                cur_len = cur.len(),
                "smoothing state cardinality mismatch, restarting from current frame"
            );
            return cur.clone();
        }
        None => return cur.clone(),
    };

    let points = prev
        .points
        .iter()
        .zip(cur.points.iter())
        .map(|(p, c)| Landmark {
            x: ema(p.x, c.x, alpha),
            y: ema(p.y, c.y, alpha),
            z: ema(p.z, c.z, alpha),
        })
        .collect();

    LandmarkSet {
        channel: cur.channel,
        points,
        timestamp_ms: cur.timestamp_ms,
    }
}
