//! Face solver: dense mesh geometry → head rotation, eye aperture, pupil
//! offset, mouth shape, brow lift, and a coarse expression score.
//!
//! All ratios are normalized by the inter-ocular distance so the solve is
//! invariant to face size and camera distance. Rotation is estimated from
//! landmark geometry directly (eye-line roll, nose-offset yaw/pitch); a 2D
//! puppet does not need a full perspective pose fit.

use crate::landmark::{Landmark, LandmarkSet};
use crate::topology::face as idx;

use super::{dist2d, midpoint, SolverContext, MIN_REFERENCE_LEN};

/// Lid gap over eye width at a fully open eye
const EYE_OPEN_RATIO: f32 = 0.30;

/// Inner lip gap over inter-ocular distance at a fully open mouth
const MOUTH_OPEN_RATIO: f32 = 0.35;

/// Mouth width over inter-ocular distance at rest, and the spread that
/// maps to the full [-1, 1] form range
const MOUTH_WIDTH_NEUTRAL: f32 = 0.60;
const MOUTH_WIDTH_RANGE: f32 = 0.15;

/// Brow-to-lid distance over inter-ocular distance at rest, and its range
const BROW_NEUTRAL: f32 = 0.175;
const BROW_RANGE: f32 = 0.10;

/// Nose tip's resting position between the eye line and the chin
const NOSE_NEUTRAL_T: f32 = 0.45;
const PITCH_SCALE_DEG: f32 = 120.0;

/// Degrees of yaw per one inter-ocular distance of nose offset
const YAW_SCALE_DEG: f32 = 90.0;

/// Corner elevation bias and range for the smile classifier
const SMILE_BIAS: f32 = 0.02;
const SMILE_RANGE: f32 = 0.08;

/// Solved face channels. A `None` channel means its input landmarks were
/// missing or degenerate, not that the signal is centered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceSolve {
    /// Head rotation in degrees: [pitch, yaw, roll]
    pub head_rotation: Option<[f32; 3]>,
    /// Eye openness, 0.0 closed .. 1.0 open
    pub eye_open_left: Option<f32>,
    pub eye_open_right: Option<f32>,
    /// Pupil offset from eye center, [-1, 1] per axis
    pub pupil_offset: Option<[f32; 2]>,
    /// Mouth openness, 0.0 .. 1.0
    pub mouth_open: Option<f32>,
    /// Mouth form: -1.0 narrow/pursed .. 1.0 wide
    pub mouth_form: Option<f32>,
    /// Brow lift, -1.0 lowered .. 1.0 raised
    pub brow_left_y: Option<f32>,
    pub brow_right_y: Option<f32>,
    /// Coarse smile classifier score, 0.0 .. 1.0. Derived from mouth
    /// corner elevation, independently of the width-based mouth form.
    pub smile_score: Option<f32>,
}

pub fn solve(landmarks: &LandmarkSet, context: &SolverContext) -> FaceSolve {
    let mut out = FaceSolve::default();

    let Some(frame) = FaceFrame::measure(landmarks) else {
        return out;
    };

    out.head_rotation = solve_rotation(landmarks, &frame, context);
    out.eye_open_left = eye_openness(landmarks, idx::LEFT_EYE_OUTER, idx::LEFT_EYE_INNER, idx::LEFT_EYE_UPPER, idx::LEFT_EYE_LOWER);
    out.eye_open_right = eye_openness(landmarks, idx::RIGHT_EYE_OUTER, idx::RIGHT_EYE_INNER, idx::RIGHT_EYE_UPPER, idx::RIGHT_EYE_LOWER);
    out.pupil_offset = pupil_offset(landmarks);
    out.mouth_open = mouth_openness(landmarks, &frame);
    out.mouth_form = mouth_form(landmarks, &frame);
    out.brow_left_y = brow_lift(landmarks, idx::LEFT_BROW_ARCH, idx::LEFT_EYE_UPPER, &frame);
    out.brow_right_y = brow_lift(landmarks, idx::RIGHT_BROW_ARCH, idx::RIGHT_EYE_UPPER, &frame);
    out.smile_score = smile_score(landmarks, &frame);

    out
}

/// Scale references measured once per solve: eye centers, their midpoint,
/// and the inter-ocular distance everything is normalized by.
struct FaceFrame {
    eye_center_left: Landmark,
    eye_center_right: Landmark,
    eye_mid: Landmark,
    inter_ocular: f32,
}

impl FaceFrame {
    fn measure(landmarks: &LandmarkSet) -> Option<Self> {
        let lo = landmarks.point(idx::LEFT_EYE_OUTER)?;
        let li = landmarks.point(idx::LEFT_EYE_INNER)?;
        let ri = landmarks.point(idx::RIGHT_EYE_INNER)?;
        let ro = landmarks.point(idx::RIGHT_EYE_OUTER)?;

        let eye_center_left = midpoint(lo, li);
        let eye_center_right = midpoint(ri, ro);
        let inter_ocular = dist2d(eye_center_left, eye_center_right);
        if inter_ocular < MIN_REFERENCE_LEN {
            return None;
        }

        Some(Self {
            eye_mid: midpoint(eye_center_left, eye_center_right),
            eye_center_left,
            eye_center_right,
            inter_ocular,
        })
    }
}

fn solve_rotation(
    landmarks: &LandmarkSet,
    frame: &FaceFrame,
    context: &SolverContext,
) -> Option<[f32; 3]> {
    let nose = landmarks.point(idx::NOSE_TIP)?;
    let chin = landmarks.point(idx::CHIN)?;

    let max = context.max_head_angle_deg;

    // Roll: angle of the eye line. Image y grows downward, so a positive
    // dy means the right eye sits lower (head tilted right).
    let dx = frame.eye_center_right.x - frame.eye_center_left.x;
    let dy = frame.eye_center_right.y - frame.eye_center_left.y;
    let roll = dy.atan2(dx).to_degrees();

    // Yaw: horizontal nose offset from the eye midpoint, in inter-ocular
    // units. Positive = nose toward image right = head turned left-ish in
    // a mirrored selfie view; consumers only need consistency.
    let yaw = (nose.x - frame.eye_mid.x) / frame.inter_ocular * YAW_SCALE_DEG;

    // Pitch: where the nose tip sits between the eye line and the chin.
    let face_height = dist2d(frame.eye_mid, chin);
    if face_height < MIN_REFERENCE_LEN {
        return None;
    }
    let t = (nose.y - frame.eye_mid.y) / face_height;
    let pitch = (t - NOSE_NEUTRAL_T) * PITCH_SCALE_DEG;

    Some([
        pitch.clamp(-max, max),
        yaw.clamp(-max, max),
        roll.clamp(-max, max),
    ])
}

fn eye_openness(
    landmarks: &LandmarkSet,
    outer: usize,
    inner: usize,
    upper: usize,
    lower: usize,
) -> Option<f32> {
    let outer = landmarks.point(outer)?;
    let inner = landmarks.point(inner)?;
    let upper = landmarks.point(upper)?;
    let lower = landmarks.point(lower)?;

    let width = dist2d(outer, inner);
    if width < MIN_REFERENCE_LEN {
        return None;
    }

    let gap = dist2d(upper, lower);
    Some((gap / width / EYE_OPEN_RATIO).clamp(0.0, 1.0))
}

/// Pupil offset from the iris ring of the refined mesh. Omitted entirely
/// for the 468-point base mesh, so downstream can tell "centered" from
/// "not measured".
fn pupil_offset(landmarks: &LandmarkSet) -> Option<[f32; 2]> {
    let iris_l = landmarks.point(idx::LEFT_IRIS_CENTER)?;
    let iris_r = landmarks.point(idx::RIGHT_IRIS_CENTER)?;

    let offset_for = |iris: Landmark, outer: usize, inner: usize| -> Option<[f32; 2]> {
        let outer = landmarks.point(outer)?;
        let inner = landmarks.point(inner)?;
        let half_width = dist2d(outer, inner) * 0.5;
        if half_width < MIN_REFERENCE_LEN {
            return None;
        }
        let center = midpoint(outer, inner);
        Some([
            (iris.x - center.x) / half_width,
            // Vertical travel is a fraction of the horizontal
            (iris.y - center.y) / (half_width * 0.6),
        ])
    };

    let l = offset_for(iris_l, idx::LEFT_EYE_OUTER, idx::LEFT_EYE_INNER)?;
    let r = offset_for(iris_r, idx::RIGHT_EYE_OUTER, idx::RIGHT_EYE_INNER)?;

    Some([
        ((l[0] + r[0]) * 0.5).clamp(-1.0, 1.0),
        ((l[1] + r[1]) * 0.5).clamp(-1.0, 1.0),
    ])
}

fn mouth_openness(landmarks: &LandmarkSet, frame: &FaceFrame) -> Option<f32> {
    let upper = landmarks.point(idx::UPPER_LIP_INNER)?;
    let lower = landmarks.point(idx::LOWER_LIP_INNER)?;

    let gap = dist2d(upper, lower) / frame.inter_ocular;
    Some((gap / MOUTH_OPEN_RATIO).clamp(0.0, 1.0))
}

fn mouth_form(landmarks: &LandmarkSet, frame: &FaceFrame) -> Option<f32> {
    let left = landmarks.point(idx::LEFT_MOUTH_CORNER)?;
    let right = landmarks.point(idx::RIGHT_MOUTH_CORNER)?;

    let width = dist2d(left, right) / frame.inter_ocular;
    Some(((width - MOUTH_WIDTH_NEUTRAL) / MOUTH_WIDTH_RANGE).clamp(-1.0, 1.0))
}

fn brow_lift(
    landmarks: &LandmarkSet,
    arch: usize,
    eye_upper: usize,
    frame: &FaceFrame,
) -> Option<f32> {
    let arch = landmarks.point(arch)?;
    let lid = landmarks.point(eye_upper)?;

    let lift = dist2d(arch, lid) / frame.inter_ocular;
    Some(((lift - BROW_NEUTRAL) / BROW_RANGE).clamp(-1.0, 1.0))
}

/// Coarse expression classifier: smile from mouth-corner elevation above
/// the lip centerline.
fn smile_score(landmarks: &LandmarkSet, frame: &FaceFrame) -> Option<f32> {
    let left = landmarks.point(idx::LEFT_MOUTH_CORNER)?;
    let right = landmarks.point(idx::RIGHT_MOUTH_CORNER)?;
    let upper = landmarks.point(idx::UPPER_LIP)?;
    let lower = landmarks.point(idx::LOWER_LIP)?;

    let lip_mid_y = (upper.y + lower.y) * 0.5;
    let corner_y = (left.y + right.y) * 0.5;

    // Corners above the lip centerline (smaller y) read as a smile
    let elevation = (lip_mid_y - corner_y) / frame.inter_ocular;
    Some(((elevation - SMILE_BIAS) / SMILE_RANGE).clamp(0.0, 1.0))
}
