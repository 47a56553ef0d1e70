//! Hand solver: joint geometry → per-finger extension and overall
//! openness. Consumed by the HUD; the standard puppet parameter set has
//! no hand channels.

use crate::landmark::LandmarkSet;
use crate::topology::hand as idx;

use super::{dist2d, MIN_REFERENCE_LEN};

/// Tip-to-wrist over knuckle-to-wrist at full extension minus rest
const EXTENSION_RANGE: f32 = 1.2;

/// Solved hand channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandSolve {
    /// Per-finger extension (thumb..pinky), 0.0 curled .. 1.0 extended
    pub finger_extension: Option<[f32; 5]>,
    /// Mean extension across all fingers
    pub openness: Option<f32>,
}

pub fn solve(landmarks: &LandmarkSet) -> HandSolve {
    let Some(fingers) = finger_extension(landmarks) else {
        return HandSolve::default();
    };

    let openness = fingers.iter().sum::<f32>() / fingers.len() as f32;

    HandSolve {
        finger_extension: Some(fingers),
        openness: Some(openness),
    }
}

fn finger_extension(landmarks: &LandmarkSet) -> Option<[f32; 5]> {
    let wrist = landmarks.point(idx::WRIST)?;

    let mut out = [0.0f32; 5];
    for i in 0..5 {
        let knuckle = landmarks.point(idx::KNUCKLES[i])?;
        let tip = landmarks.point(idx::FINGERTIPS[i])?;

        let base = dist2d(wrist, knuckle);
        if base < MIN_REFERENCE_LEN {
            return None;
        }

        let reach = dist2d(wrist, tip) / base;
        out[i] = ((reach - 1.0) / EXTENSION_RANGE).clamp(0.0, 1.0);
    }
    Some(out)
}
